//! reqdb-core: database configuration and request sessions
//!
//! Resolves a database engine by name, validates its options and hands
//! out per-request [`Session`]s. Framework integration lives in
//! `reqdb-server`.

pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod session;

pub use config::{Database, DatabaseConfig, OptionValue};
pub use engine::{Engine, EngineRegistry, PostgresEngine, SqliteEngine};
pub use error::{ConfigError, ConfigResult, DbError, DbResult};
pub use model::{BaseModel, Column, Model};
pub use session::Session;
