use std::path::{Path, PathBuf};

use connect4::{ConfigError, EngineConfig};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const DEFAULT_CONFIG_PATH: &str = "Connect4.toml";
pub const CONFIG_PATH_ENV: &str = "CONNECT4_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read config file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error(transparent)]
    Engine(#[from] ConfigError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
    /// Used when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3000".into(),
            log_filter: "info,tower_http=debug".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub engine: EngineConfig,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, SettingsError> {
        let settings: Settings = toml::from_str(content)?;
        settings.engine.validate()?;
        Ok(settings)
    }

    /// Falls back to defaults when `path` does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, SettingsError> {
        if path.exists() {
            Self::load(path)
        } else {
            warn!(path = %path.display(), "config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Reads the file named by `CONNECT4_CONFIG`, or `Connect4.toml`.
    pub fn from_env() -> Result<Self, SettingsError> {
        let path = std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load_or_default(&path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let settings = Settings::parse("").unwrap();
        assert_eq!(settings.server.bind, "0.0.0.0:3000");
        assert_eq!(settings.engine, EngineConfig::default());
    }

    #[test]
    fn sections_override_fields() {
        let settings = Settings::parse(
            r#"
            [server]
            bind = "127.0.0.1:8080"

            [engine]
            rows = 5
            alpha_beta_depth = 8
            tie_break = { policy = "random-seed", seed = 42 }
            "#,
        )
        .unwrap();
        assert_eq!(settings.server.bind, "127.0.0.1:8080");
        assert_eq!(settings.server.log_filter, "info,tower_http=debug");
        assert_eq!(settings.engine.rows, 5);
        assert_eq!(settings.engine.columns, 7);
        assert_eq!(settings.engine.alpha_beta_depth, 8);
    }

    #[test]
    fn invalid_engine_is_rejected() {
        let err = Settings::parse("[engine]\nminimax_depth = 0\n").unwrap_err();
        assert!(matches!(err, SettingsError::Engine(_)));
        assert!(matches!(
            Settings::parse("[engine\n"),
            Err(SettingsError::TomlParse(_))
        ));
    }

    #[test]
    fn missing_file_falls_back() {
        let settings = Settings::load_or_default(Path::new("does/not/exist.toml")).unwrap();
        assert_eq!(settings.engine, EngineConfig::default());
        assert!(matches!(
            Settings::load(Path::new("does/not/exist.toml")),
            Err(SettingsError::FileRead { .. })
        ));
    }
}
