use std::path::PathBuf;

use anyhow::Result;
use clap::error::Error as ClapError;
use clap::Parser;
use log::info;

use crate::auth::Token;
use crate::config::{base_url_for, ArtifactRequest, Config, Schedule};
use crate::error::PipewaitError;
use crate::settings::Settings;
use crate::waiter::{self, Outcome};

const EXIT_STATUS: &str = "Exit status: 0 success, 1 pipeline failed, 2 spawn timeout, \
3 completion timeout, 4 GitLab API error";

/// Exit status for rejected arguments. Kept apart from the timeout and API
/// error statuses so a caller never mistakes a usage error for them.
pub const USAGE_ERROR_STATUS: u8 = 1;

/// Waits for the GitLab pipeline of a commit and optionally saves one of its artifacts
#[derive(Parser)]
#[command(name = "pipewait")]
#[command(author, version, long_about = None, after_help = EXIT_STATUS)]
pub struct Cli {
    /// Commit SHA whose pipeline to wait for
    sha: String,

    /// GitLab access token with `read_api` scope
    token: String,

    /// GitLab domain, e.g. gitlab.com
    domain: String,

    /// Project path or numeric ID, e.g. group/project
    repo: String,

    /// REST API version, e.g. v4
    api_version: String,

    /// Fetches while waiting for the pipeline to appear
    retry_count: u64,

    /// Seconds between spawn fetches
    retry_period: u64,

    /// Fetches while waiting for the pipeline to finish
    poll_count: u64,

    /// Seconds between completion fetches
    poll_period: u64,

    /// Path of the artifact file inside the job's artifacts
    artifact_in: Option<String>,

    /// Local path to save the artifact to
    artifact_out: Option<String>,

    /// Settings file (TOML, JSON or YAML)
    #[arg(short, long, env = "PIPEWAIT_CONFIG")]
    config: Option<PathBuf>,

    /// Job providing the artifact [default: testset]
    #[arg(long)]
    artifact_job: Option<String>,
}

impl Cli {
    pub async fn execute(&self) -> Result<Outcome> {
        let settings = Settings::load(self.config.as_deref())?;
        let config = self.to_config(&settings)?;

        info!(
            "Following {} on {} ({})",
            config.repo, config.base_url, config.api_version
        );

        let outcome = waiter::run(&config).await?;
        info!("Finished with {outcome:?} (exit code {})", outcome.code());

        Ok(outcome)
    }

    fn to_config(&self, settings: &Settings) -> Result<Config, PipewaitError> {
        let artifact = self.artifact_request(settings)?;

        Config::new(
            self.sha.clone(),
            Token::from(self.token.as_str()),
            &base_url_for(&settings.gitlab.scheme, &self.domain),
            self.repo.clone(),
            self.api_version.clone(),
            Schedule::new(self.retry_count, self.retry_period),
            Schedule::new(self.poll_count, self.poll_period),
            artifact,
            settings.gitlab.user_agent.clone(),
        )
    }

    /// Empty artifact arguments count as absent.
    fn artifact_request(&self, settings: &Settings) -> Result<Option<ArtifactRequest>, PipewaitError> {
        let source = self.artifact_in.as_deref().filter(|s| !s.is_empty());
        let destination = self.artifact_out.as_deref().filter(|p| !p.is_empty());

        match (source, destination) {
            (None, _) => Ok(None),
            (Some(_), None) => Err(PipewaitError::Config(
                "artifact_out is required when artifact_in is given".to_string(),
            )),
            (Some(source), Some(destination)) => Ok(Some(ArtifactRequest {
                source: source.to_owned(),
                destination: PathBuf::from(destination),
                job_name: self
                    .artifact_job
                    .clone()
                    .unwrap_or_else(|| settings.gitlab.artifact_job.clone()),
            })),
        }
    }
}

/// Exit status for an argument parsing failure.
///
/// `--help` and `--version` also surface as errors from `try_parse` and
/// succeed.
pub fn usage_status(err: &ClapError) -> u8 {
    if err.use_stderr() {
        USAGE_ERROR_STATUS
    } else {
        0
    }
}
