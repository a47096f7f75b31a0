mod artifacts;
mod core;
mod pipelines;

pub use self::artifacts::encode_artifact_path;
pub use self::core::GitLabClient;
