//! Settings file for the reqdb binary
//!
//! Resolution order: `--config` / `REQDB_CONFIG`, then
//! `~/.reqdb/reqdb.toml` when present, then built-in defaults.
//! `REQDB_DATABASE_*` variables override the database section.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use reqdb_core::DatabaseConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3030
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

fn default_database() -> DatabaseConfig {
    let mut config = DatabaseConfig::new("db/sample.db", "sqlite");
    config.autocommit = false;
    config
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default = "default_database")]
    pub database: DatabaseConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            database: default_database(),
        }
    }
}

impl Settings {
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".reqdb").join("reqdb.toml"))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("Invalid reqdb settings")
    }

    pub fn load_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("Failed to load {}", path.display()))
    }

    /// Load settings, applying environment overrides.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let settings = match explicit {
            Some(path) => Self::load_file(path)?,
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => {
                    tracing::debug!(path = %path.display(), "using default settings file");
                    Self::load_file(&path)?
                }
                None => Self::default(),
            },
        };

        let database = settings.database.with_env_overrides()?;
        Ok(Self { database, ..settings })
    }
}
