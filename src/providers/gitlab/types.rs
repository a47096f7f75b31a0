use std::fmt;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{PipewaitError, Result};

/// A pipeline as listed by `GET /projects/:id/pipelines`.
///
/// Only the fields needed to follow a pipeline are kept; the record is
/// re-fetched on every poll and never stored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PipelineRecord {
    /// Numeric pipeline ID
    pub id: u64,
    /// Commit the pipeline runs for
    pub sha: String,
    /// Current pipeline status
    pub status: PipelineStatus,
    /// Link to the pipeline page, absent on some self-hosted instances
    #[serde(default)]
    pub web_url: Option<String>,
}

/// A job as listed by `GET /projects/:id/pipelines/:pipeline_id/jobs`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JobRecord {
    pub id: u64,
    pub name: String,
}

/// Error object GitLab returns instead of data, e.g. for a token lacking
/// the `read_api` scope.
///
/// Fields are read leniently: a non-string value is kept in its JSON form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
    pub error_description: Option<String>,
    pub scope: Option<String>,
}

impl ErrorBody {
    /// Builds the error body from an object known to carry an `error` key.
    fn from_value(value: &Value) -> Self {
        let field = |key: &str| match value.get(key) {
            None | Some(Value::Null) => None,
            Some(Value::String(text)) => Some(text.clone()),
            Some(other) => Some(other.to_string()),
        };

        Self {
            error: field("error").unwrap_or_else(|| "null".to_string()),
            error_description: field("error_description"),
            scope: field("scope"),
        }
    }
}

impl fmt::Display for ErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' error response received to GitLab API request. {} GitLab API scope: '{}'",
            self.error,
            self.error_description.as_deref().unwrap_or("No description given."),
            self.scope.as_deref().unwrap_or("unknown"),
        )
    }
}

/// Status of a GitLab pipeline.
///
/// Statuses GitLab may add later are kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum PipelineStatus {
    Created,
    WaitingForResource,
    Preparing,
    Pending,
    Running,
    Success,
    Failed,
    Canceled,
    Skipped,
    Manual,
    Scheduled,
    Other(String),
}

impl PipelineStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Created => "created",
            Self::WaitingForResource => "waiting_for_resource",
            Self::Preparing => "preparing",
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
            Self::Skipped => "skipped",
            Self::Manual => "manual",
            Self::Scheduled => "scheduled",
            Self::Other(status) => status,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Terminal statuses that mean the pipeline did not succeed.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::Canceled | Self::Skipped)
    }
}

impl From<String> for PipelineStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "created" => Self::Created,
            "waiting_for_resource" => Self::WaitingForResource,
            "preparing" => Self::Preparing,
            "pending" => Self::Pending,
            "running" => Self::Running,
            "success" => Self::Success,
            "failed" => Self::Failed,
            "canceled" => Self::Canceled,
            "skipped" => Self::Skipped,
            "manual" => Self::Manual,
            "scheduled" => Self::Scheduled,
            _ => Self::Other(value),
        }
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of a GitLab API response: either the requested data or an error object.
#[derive(Debug, PartialEq)]
pub enum ApiResponse<T> {
    Data(T),
    Error(ErrorBody),
}

impl<T: DeserializeOwned> ApiResponse<T> {
    /// Parses a response body.
    ///
    /// Any JSON object carrying an `error` key is an error object, whatever
    /// the types of its fields.
    ///
    /// # Errors
    ///
    /// Returns `MalformedResponse` if the body is not JSON or does not match
    /// the expected schema.
    pub fn parse(endpoint: &str, body: &str) -> Result<Self> {
        let malformed = |e: serde_json::Error| PipewaitError::MalformedResponse {
            endpoint: endpoint.to_owned(),
            reason: e.to_string(),
        };

        let value: Value = serde_json::from_str(body).map_err(malformed)?;

        if value.get("error").is_some() {
            return Ok(Self::Error(ErrorBody::from_value(&value)));
        }

        serde_json::from_value(value).map(Self::Data).map_err(malformed)
    }
}

/// Returns the first pipeline built for `sha`.
pub fn find_pipeline<'a>(pipelines: &'a [PipelineRecord], sha: &str) -> Option<&'a PipelineRecord> {
    pipelines.iter().find(|p| p.sha == sha)
}

/// Returns the first job called `name`.
pub fn find_job<'a>(jobs: &'a [JobRecord], name: &str) -> Option<&'a JobRecord> {
    jobs.iter().find(|j| j.name == name)
}
