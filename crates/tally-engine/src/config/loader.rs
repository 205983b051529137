use super::schema::TallyConfig;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Where an implicit config is looked up, in priority order:
    /// `./tally.yaml`, then `~/.tally/config.yaml`.
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("tally.yaml")];
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".tally").join("config.yaml"));
        }
        paths
    }

    /// First existing file of [`Self::search_paths`], or built-in defaults.
    pub async fn load_default() -> Result<TallyConfig, ConfigError> {
        Self::load_first(&Self::search_paths()).await
    }

    /// Load the first of `paths` that exists. A file that exists but does not
    /// parse is an error rather than a reason to keep looking.
    pub async fn load_first(paths: &[PathBuf]) -> Result<TallyConfig, ConfigError> {
        for path in paths {
            if tokio::fs::try_exists(path).await.unwrap_or(false) {
                return Self::load_from(path).await;
            }
            debug!("No config at {}", path.display());
        }
        debug!("Using built-in configuration");
        Ok(TallyConfig::default())
    }

    pub async fn load_from(path: &Path) -> Result<TallyConfig, ConfigError> {
        debug!("Loading config from {}", path.display());
        Self::parse(&tokio::fs::read_to_string(path).await?)
    }

    pub fn parse(content: &str) -> Result<TallyConfig, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }
}
