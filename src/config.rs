//! Settings of the `banquito` binary.
//!
//! Values come from an optional `banquito.toml` and from `BANQUITO__*`
//! environment variables (`BANQUITO__DATABASE__PATH`, `BANQUITO__OWNER_ID`,
//! `BANQUITO__LOG__LEVEL`). Command-line flags override both.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use uuid::Uuid;

/// Default settings file, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "banquito";

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    /// `tracing` filter directive, e.g. `info` or `banquito=debug`
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub database: DatabaseSettings,
    /// Owner every command acts on
    pub owner_id: Option<Uuid>,
    #[serde(default)]
    pub log: LogSettings,
}

fn default_database_path() -> String {
    "banquito.db".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Settings {
    /// Load settings from `path` (or `banquito.toml` when absent, in which
    /// case a missing file is fine) and the environment.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::with_name(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix("BANQUITO")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.database.path, "banquito.db");
        assert_eq!(settings.log.level, "info");
        assert!(settings.owner_id.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        let owner = Uuid::new_v4();
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "owner_id = \"{}\"\n\n[database]\npath = \"ledger.db\"",
            owner
        )
        .unwrap();

        let settings = Settings::load(path.to_str()).unwrap();
        assert_eq!(settings.database.path, "ledger.db");
        assert_eq!(settings.owner_id, Some(owner));
        assert_eq!(settings.log.level, "info");
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        assert!(Settings::load(Some("/nonexistent/banquito-settings.toml")).is_err());
    }
}
