mod client;
pub mod links;
pub mod types;

pub use client::{encode_artifact_path, GitLabClient};
