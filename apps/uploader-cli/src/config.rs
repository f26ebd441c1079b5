//! CLI configuration management.
//!
//! Configuration is stored as TOML:
//! - Linux/macOS: `~/.config/chunkup/config.toml`
//! - Windows: `%APPDATA%/chunkup/config.toml`

use std::path::{Path, PathBuf};

use anyhow::Context;
use chunkup_uploader::UploaderConfig;
use serde::{Deserialize, Serialize};

/// CLI configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    /// Base URL of the upload endpoint.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Engine and scheduler tuning.
    #[serde(default)]
    pub uploader: UploaderConfig,
}

fn default_endpoint() -> String {
    "http://127.0.0.1:8080".into()
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            request_timeout_secs: default_request_timeout(),
            uploader: UploaderConfig::default(),
        }
    }
}

impl CliConfig {
    /// Loads `explicit` if given (it must exist). Otherwise loads the
    /// platform file, creating it with defaults when absent.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(path) = explicit {
            return Self::read(path);
        }

        let path = config_path()?;
        if path.exists() {
            Self::read(&path)
        } else {
            let config = Self::default();
            config.save(&path)?;
            Ok(config)
        }
    }

    fn read(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: CliConfig =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// Writes the configuration as TOML to `path`.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }
}

/// Returns the platform-specific configuration file path.
fn config_path() -> anyhow::Result<PathBuf> {
    #[cfg(windows)]
    {
        let appdata = std::env::var("APPDATA").context("APPDATA not set")?;
        Ok(PathBuf::from(appdata).join("chunkup").join("config.toml"))
    }

    #[cfg(not(windows))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home)
            .join(".config")
            .join("chunkup")
            .join("config.toml"))
    }
}
