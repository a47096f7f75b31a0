use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipewaitError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Malformed response from {endpoint}: {reason}")]
    MalformedResponse { endpoint: String, reason: String },

    #[error("No job named '{name}' in pipeline {pipeline_id}")]
    JobNotFound { name: String, pipeline_id: u64 },

    #[error("Artifact '{path}' of job {job_id} is unavailable (HTTP {status})")]
    ArtifactUnavailable {
        path: String,
        job_id: u64,
        status: u16,
    },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PipewaitError>;
