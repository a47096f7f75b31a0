use serde_json::Value;

use super::core::GitLabClient;
use crate::error::{PipewaitError, Result};

/// Percent-encodes each segment of a path inside a job's artifact archive,
/// keeping the `/` separators.
///
/// # Errors
///
/// Returns a `Config` error for `.` or `..` segments, which would make the
/// request leave the artifact endpoint.
pub fn encode_artifact_path(artifact_path: &str) -> Result<String> {
    let segments: Vec<&str> = artifact_path.trim_start_matches('/').split('/').collect();

    if let Some(segment) = segments.iter().find(|s| **s == "." || **s == "..") {
        return Err(PipewaitError::Config(format!(
            "artifact path {artifact_path} must not contain '{segment}' segments"
        )));
    }

    Ok(segments
        .into_iter()
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/"))
}

impl GitLabClient {
    /// Downloads a single JSON file from a job's artifact archive.
    ///
    /// # Errors
    ///
    /// Returns `ArtifactUnavailable` on a non-2xx status and
    /// `MalformedResponse` if the file is not JSON.
    pub async fn fetch_artifact(&self, job_id: u64, artifact_path: &str) -> Result<Value> {
        let url = self.project_endpoint(&format!(
            "jobs/{job_id}/artifacts/{}",
            encode_artifact_path(artifact_path)?
        ))?;
        let endpoint = url.to_string();

        let response = self.send_get(url).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PipewaitError::ArtifactUnavailable {
                path: artifact_path.to_owned(),
                job_id,
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| PipewaitError::MalformedResponse {
            endpoint,
            reason: e.to_string(),
        })
    }
}
