use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use log::info;
use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use serde_json::Value;

use crate::config::ArtifactRequest;
use crate::error::{PipewaitError, Result};
use crate::output::PhaseProgress;
use crate::providers::gitlab::links;
use crate::providers::gitlab::types::{find_job, ApiResponse};
use crate::providers::gitlab::GitLabClient;
use crate::waiter::{report_api_error, Outcome};

const INDENT: &[u8] = b"    ";

/// Downloads the requested artifact of a finished pipeline and saves it.
///
/// Breaks with `Outcome::ApiError` if listing the pipeline's jobs returns an
/// error object; otherwise continues with the absolute path of the saved file.
///
/// # Errors
///
/// Returns `JobNotFound` if no job carries the requested name, plus any
/// error from fetching or writing the artifact.
pub async fn retrieve(
    client: &GitLabClient,
    pipeline_id: u64,
    request: &ArtifactRequest,
    web_root: &str,
    repo: &str,
    progress: &PhaseProgress,
) -> Result<ControlFlow<Outcome, PathBuf>> {
    let jobs = match client.list_pipeline_jobs(pipeline_id).await? {
        ApiResponse::Data(jobs) => jobs,
        ApiResponse::Error(error) => {
            report_api_error(progress, &error);
            return Ok(ControlFlow::Break(Outcome::ApiError));
        }
    };

    let job = find_job(&jobs, &request.job_name).ok_or_else(|| PipewaitError::JobNotFound {
        name: request.job_name.clone(),
        pipeline_id,
    })?;

    info!(
        "Fetching '{}' from job {} ({})",
        request.source,
        job.id,
        links::job_url(web_root, repo, job.id)
    );

    let payload = client.fetch_artifact(job.id, &request.source).await?;
    let saved = write_json(&payload, &request.destination)?;

    progress.note(format!("Saved artifact in {}!", saved.display()));

    Ok(ControlFlow::Continue(saved))
}

/// Writes `payload` to `destination` as JSON indented by four spaces,
/// creating missing parent directories.
///
/// Key order and non-ASCII characters are kept as received. Returns the
/// absolute path of the written file.
pub fn write_json(payload: &Value, destination: &Path) -> Result<PathBuf> {
    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let mut buffer = Vec::new();
    let mut serializer = Serializer::with_formatter(&mut buffer, PrettyFormatter::with_indent(INDENT));
    payload.serialize(&mut serializer)?;

    std::fs::write(destination, buffer)?;

    Ok(std::fs::canonicalize(destination)?)
}
