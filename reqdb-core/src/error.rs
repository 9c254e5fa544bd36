//! Error types for reqdb-core

use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigError>;
pub type DbResult<T> = Result<T, DbError>;

/// The database could not be configured.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("improperly configured: please specify a \"{field}\" for your database")]
    Missing { field: &'static str },

    #[error("improperly configured: database engine not found: \"{engine}\"")]
    UnknownEngine { engine: String },

    #[error("improperly configured: option \"{option}\" is not understood by engine \"{engine}\"")]
    UnknownOption { engine: &'static str, option: String },

    #[error("improperly configured: option \"{option}\" {reason}")]
    InvalidOption { option: String, reason: &'static str },

    #[error("improperly configured: driver rejected connection settings: {0}")]
    Driver(#[source] sqlx::Error),

    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Runtime failures while talking to the database.
#[derive(Error, Debug)]
pub enum DbError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error("database session is closed")]
    Closed,
}
