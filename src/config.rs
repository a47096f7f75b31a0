use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::auth::Token;
use crate::error::{PipewaitError, Result};
use crate::providers::gitlab::encode_artifact_path;

/// How often and how long a wait phase polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    /// Number of fetches before giving up
    pub count: u64,
    /// Seconds to sleep after each unsuccessful fetch
    pub period: u64,
}

impl Schedule {
    pub fn new(count: u64, period: u64) -> Self {
        Self { count, period }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.period)
    }

    /// Seconds reported as elapsed once `attempt` fetches have been made.
    pub fn elapsed(&self, attempt: u64) -> u64 {
        attempt.saturating_mul(self.period)
    }

    /// Seconds reported as elapsed once the whole schedule is used up.
    pub fn budget(&self) -> u64 {
        self.elapsed(self.count)
    }
}

/// Which artifact to download once the pipeline succeeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRequest {
    /// Path of the file inside the job's artifact archive
    pub source: String,
    /// Local file the payload is written to
    pub destination: PathBuf,
    /// Name of the job that produces the artifact
    pub job_name: String,
}

/// Everything one run needs, fixed for its whole duration.
#[derive(Debug, Clone)]
pub struct Config {
    pub sha: String,
    pub token: Token,
    /// Instance root, e.g. `https://gitlab.com/`
    pub base_url: Url,
    pub repo: String,
    pub api_version: String,
    /// Spawn phase
    pub spawn: Schedule,
    /// Completion phase
    pub completion: Schedule,
    pub artifact: Option<ArtifactRequest>,
    pub user_agent: String,
}

impl Config {
    /// Builds and validates a configuration.
    ///
    /// # Errors
    ///
    /// Returns a `Config` error if a required string is empty, the base URL
    /// is invalid, or the artifact source has `.` or `..` segments.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sha: String,
        token: Token,
        base_url: &str,
        repo: String,
        api_version: String,
        spawn: Schedule,
        completion: Schedule,
        artifact: Option<ArtifactRequest>,
        user_agent: String,
    ) -> Result<Self> {
        require("sha", &sha)?;
        require("token", token.as_str())?;
        require("repo", &repo)?;
        require("api_version", &api_version)?;

        let base_url = Url::parse(base_url)
            .map_err(|e| PipewaitError::Config(format!("Invalid base URL {base_url}: {e}")))?;
        if base_url.host_str().is_none() {
            return Err(PipewaitError::Config(format!("Base URL {base_url} has no host")));
        }

        if let Some(artifact) = &artifact {
            require("artifact source", &artifact.source)?;
            encode_artifact_path(&artifact.source)?;
            require("artifact job name", &artifact.job_name)?;
            if artifact.destination.as_os_str().is_empty() {
                return Err(PipewaitError::Config(
                    "artifact destination must not be empty".to_string(),
                ));
            }
        }

        Ok(Self {
            sha,
            token,
            base_url,
            repo,
            api_version,
            spawn,
            completion,
            artifact,
            user_agent,
        })
    }

    /// Instance root without a trailing slash, for building web links.
    pub fn web_root(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }
}

/// Builds an instance root from a bare domain such as `gitlab.com`.
pub fn base_url_for(scheme: &str, domain: &str) -> String {
    format!("{scheme}://{}", domain.trim_end_matches('/'))
}

fn require(name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(PipewaitError::Config(format!("{name} must not be empty")));
    }
    Ok(())
}
