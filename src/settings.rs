use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};

const CANDIDATES: [&str; 4] = ["pipewait.toml", "pipewait.json", "pipewait.yaml", "pipewait.yml"];

/// Settings file for pipewait.
///
/// Holds defaults that are not part of the positional command line, such as
/// the URL scheme for self-hosted instances without TLS or the name of the
/// job whose artifact is downloaded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Settings {
    #[serde(default)]
    pub gitlab: GitLabSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GitLabSettings {
    /// URL scheme used to reach the instance
    #[serde(default = "default_scheme")]
    pub scheme: String,

    /// User agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Job whose artifact is downloaded after a successful pipeline
    #[serde(default = "default_artifact_job")]
    pub artifact_job: String,
}

impl Default for GitLabSettings {
    fn default() -> Self {
        Self {
            scheme: default_scheme(),
            user_agent: default_user_agent(),
            artifact_job: default_artifact_job(),
        }
    }
}

fn default_scheme() -> String {
    "https".to_string()
}

fn default_user_agent() -> String {
    format!("pipewait/{}", env!("CARGO_PKG_VERSION"))
}

fn default_artifact_job() -> String {
    "testset".to_string()
}

impl Settings {
    /// Load settings.
    ///
    /// Searches in this order:
    /// 1. Specified path (must exist)
    /// 2. ./pipewait.toml, ./pipewait.json, ./pipewait.yaml, ./pipewait.yml
    /// 3. `<config dir>/pipewait/config.toml`
    ///
    /// Returns default settings if no file is found.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_path(path);
        }

        let found = CANDIDATES
            .iter()
            .map(PathBuf::from)
            .chain(user_settings_path())
            .find(|path| path.exists());

        match found {
            Some(path) => Self::load_from_path(&path),
            None => {
                debug!("No settings file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    fn load_from_path(path: &Path) -> Result<Self> {
        debug!("Loading settings from {}", path.display());

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML settings: {}", path.display())),
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON settings: {}", path.display())),
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML settings: {}", path.display())),
            _ => toml::from_str(&contents)
                .or_else(|_| serde_json::from_str(&contents))
                .or_else(|_| serde_yaml::from_str(&contents))
                .with_context(|| format!("Failed to parse settings file: {}", path.display())),
        }
    }
}

fn user_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("pipewait").join("config.toml"))
}
