use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "http://localhost:8000/graphql/";

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join("hej")
        .join("config.toml")
}

fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("~/.local/share"))
        .join("hej")
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub endpoint: String,
    pub session_key: Option<String>,
    pub debounce_ms: u64,
    pub refetch_secs: u64,
    pub log_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            session_key: None,
            debounce_ms: 500,
            refetch_secs: 60,
            log_dir: default_log_dir(),
        }
    }
}

impl Config {
    /// Load from `path`, or the default location when `None`.
    ///
    /// A missing file yields the defaults; a malformed one is an error.
    /// `HEJ_ENDPOINT` and `HEJ_SESSION_KEY` override the file.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
        let mut config = Self::from_file(&path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(endpoint) = var("HEJ_ENDPOINT") {
            self.endpoint = endpoint;
        }
        if let Some(key) = var("HEJ_SESSION_KEY") {
            self.session_key = Some(key);
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn refetch_interval(&self) -> Duration {
        Duration::from_secs(self.refetch_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn missing_file_gives_defaults() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let config = Config::from_file(&dir.path().join("nope.toml"))?;
        assert_eq!(config, Config::default());
        assert_eq!(config.debounce(), Duration::from_millis(500));
        Ok(())
    }

    #[test]
    fn partial_file_keeps_other_defaults() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "endpoint = \"https://notes.example/graphql/\"\ndebounce_ms = 250\n")?;

        let config = Config::from_file(&path)?;
        assert_eq!(config.endpoint, "https://notes.example/graphql/");
        assert_eq!(config.debounce_ms, 250);
        assert_eq!(config.refetch_secs, 60);
        assert!(config.session_key.is_none());
        Ok(())
    }

    #[test]
    fn malformed_file_is_an_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "debounce_ms = \"soon\"")?;
        assert!(Config::from_file(&path).is_err());
        Ok(())
    }

    #[test]
    fn env_overrides_file() {
        let vars: HashMap<&str, &str> =
            [("HEJ_ENDPOINT", "http://other/graphql/"), ("HEJ_SESSION_KEY", "s3cret")].into();
        let mut config = Config::default();
        config.apply_env(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.endpoint, "http://other/graphql/");
        assert_eq!(config.session_key.as_deref(), Some("s3cret"));
    }
}
