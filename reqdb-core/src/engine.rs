//! Database engines resolvable by name
//!
//! An engine turns the configured database name into a driver URL and
//! declares which extra options it understands. Engines live in an
//! [`EngineRegistry`]; configuration refers to them by name.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

use crate::error::{ConfigError, ConfigResult};

/// Bytes escaped in a file path placed after `sqlite://`. The driver
/// percent-decodes the path, so `%`, `?` and `#` must not pass through raw.
const PATH: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// A single path segment, such as a bare Postgres database name.
const SEGMENT: &AsciiSet = &PATH.add(b'/');

/// A database backend that sqlx can drive through the `Any` driver.
pub trait Engine: Send + Sync + Debug {
    /// Canonical registry name, lowercase.
    fn name(&self) -> &'static str;

    /// Additional names that resolve to this engine.
    fn aliases(&self) -> &'static [&'static str] {
        &[]
    }

    /// Options forwarded to the driver as URL query parameters.
    fn url_params(&self) -> &'static [&'static str];

    /// Build the connection URL for `db_name` with the given driver params.
    fn url(&self, db_name: &str, params: &BTreeMap<String, String>) -> String;

    /// Column definition for the implicit model primary key.
    fn primary_key_ddl(&self) -> &'static str;
}

/// SQLite database files (or `:memory:`).
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteEngine;

impl Engine for SqliteEngine {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["sqlite3"]
    }

    fn url_params(&self) -> &'static [&'static str] {
        &["mode", "cache", "immutable", "vfs"]
    }

    fn url(&self, db_name: &str, params: &BTreeMap<String, String>) -> String {
        let mut params = params.clone();
        let base = if db_name == ":memory:" {
            "sqlite::memory:".to_string()
        } else if db_name.starts_with("sqlite:") {
            db_name.to_string()
        } else {
            // Create the file on first connect unless told otherwise
            params.entry("mode".into()).or_insert_with(|| "rwc".into());
            format!("sqlite://{}", utf8_percent_encode(db_name, PATH))
        };
        append_params(base, &params)
    }

    fn primary_key_ddl(&self) -> &'static str {
        "id INTEGER PRIMARY KEY AUTOINCREMENT"
    }
}

/// PostgreSQL, by full URL or by bare database name on localhost.
#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresEngine;

impl Engine for PostgresEngine {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["postgresql"]
    }

    fn url_params(&self) -> &'static [&'static str] {
        &["sslmode", "application_name", "options", "statement-cache-capacity"]
    }

    fn url(&self, db_name: &str, params: &BTreeMap<String, String>) -> String {
        let base = if db_name.starts_with("postgres://") || db_name.starts_with("postgresql://") {
            db_name.to_string()
        } else {
            format!("postgres://localhost/{}", utf8_percent_encode(db_name, SEGMENT))
        };
        append_params(base, params)
    }

    fn primary_key_ddl(&self) -> &'static str {
        "id BIGSERIAL PRIMARY KEY"
    }
}

fn append_params(base: String, params: &BTreeMap<String, String>) -> String {
    if params.is_empty() {
        return base;
    }
    let query = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params)
        .finish();
    let sep = if base.contains('?') { '&' } else { '?' };
    format!("{}{}{}", base, sep, query)
}

/// Name → engine lookup table.
#[derive(Debug, Clone)]
pub struct EngineRegistry {
    engines: Vec<Arc<dyn Engine>>,
}

impl EngineRegistry {
    /// Registry with the built-in engines.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(SqliteEngine);
        registry.register(PostgresEngine);
        registry
    }

    /// Registry with nothing registered.
    pub fn empty() -> Self {
        Self { engines: Vec::new() }
    }

    /// Register an engine. Later registrations shadow earlier ones
    /// with the same name.
    pub fn register(&mut self, engine: impl Engine + 'static) -> &mut Self {
        self.engines.insert(0, Arc::new(engine));
        self
    }

    pub fn resolve(&self, name: &str) -> ConfigResult<Arc<dyn Engine>> {
        let wanted = name.trim().to_ascii_lowercase();
        self.engines
            .iter()
            .find(|e| e.name() == wanted || e.aliases().contains(&wanted.as_str()))
            .cloned()
            .ok_or_else(|| ConfigError::UnknownEngine {
                engine: name.to_string(),
            })
    }

    /// Canonical names of everything registered, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.engines.iter().map(|e| e.name()).collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self::new()
    }
}
