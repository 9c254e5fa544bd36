//! Database configuration wrapper
//!
//! [`Database`] validates a name/engine/options triple, resolves the engine
//! by name and instantiates a lazily connecting pool. Nothing touches the
//! network until a request session is opened.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;

use crate::engine::{Engine, EngineRegistry};
use crate::error::{ConfigError, ConfigResult, DbResult};
use crate::model::{BaseModel, Model};
use crate::session::Session;

/// Options handled by the pool rather than by the engine.
const POOL_OPTIONS: &[&str] = &["max_connections", "min_connections", "acquire_timeout"];

/// A single extra option value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Integer(i64),
    Text(String),
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Integer(i) => write!(f, "{}", i),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for OptionValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<i64> for OptionValue {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<bool> for OptionValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

fn default_autocommit() -> bool {
    true
}

/// On-disk / environment form of a database definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub engine: String,
    #[serde(default = "default_autocommit")]
    pub autocommit: bool,
    #[serde(default)]
    pub options: BTreeMap<String, OptionValue>,
}

impl DatabaseConfig {
    pub fn new(name: impl Into<String>, engine: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            engine: engine.into(),
            autocommit: true,
            options: BTreeMap::new(),
        }
    }

    /// Read a `[database]`-less TOML document describing one database.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&raw, &path.display().to_string())
    }

    pub fn parse(raw: &str, origin: &str) -> ConfigResult<Self> {
        toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: origin.to_string(),
            source,
        })
    }

    /// Override fields from `REQDB_DATABASE_NAME`, `REQDB_DATABASE_ENGINE`
    /// and `REQDB_AUTOCOMMIT` when set.
    pub fn with_env_overrides(mut self) -> ConfigResult<Self> {
        if let Ok(name) = std::env::var("REQDB_DATABASE_NAME") {
            self.name = name;
        }
        if let Ok(engine) = std::env::var("REQDB_DATABASE_ENGINE") {
            self.engine = engine;
        }
        if let Ok(raw) = std::env::var("REQDB_AUTOCOMMIT") {
            self.autocommit = parse_bool(&raw).ok_or_else(|| ConfigError::InvalidOption {
                option: "REQDB_AUTOCOMMIT".into(),
                reason: "must be true or false",
            })?;
        }
        Ok(self)
    }

    /// Configuration built from the environment alone.
    pub fn from_env() -> ConfigResult<Self> {
        Self::new("", "").with_env_overrides()
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// A configured database: engine, autocommit policy and pool.
#[derive(Debug, Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

#[derive(Debug)]
struct DatabaseInner {
    name: String,
    engine: Arc<dyn Engine>,
    autocommit: bool,
    options: BTreeMap<String, OptionValue>,
    pool: AnyPool,
}

impl Database {
    /// Configure a database using the built-in engines.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the name or engine is missing, the engine
    /// is not registered, or an option is unknown or malformed.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let db = Database::new("db/sample.db", "sqlite", false, BTreeMap::new())?;
    /// ```
    pub fn new(
        name: impl Into<String>,
        engine: impl AsRef<str>,
        autocommit: bool,
        options: BTreeMap<String, OptionValue>,
    ) -> ConfigResult<Self> {
        let config = DatabaseConfig {
            name: name.into(),
            engine: engine.as_ref().to_string(),
            autocommit,
            options,
        };
        Self::with_registry(&config, &EngineRegistry::new())
    }

    pub fn from_config(config: &DatabaseConfig) -> ConfigResult<Self> {
        Self::with_registry(config, &EngineRegistry::new())
    }

    /// Configure a database resolving the engine from `registry`.
    pub fn with_registry(config: &DatabaseConfig, registry: &EngineRegistry) -> ConfigResult<Self> {
        if config.name.trim().is_empty() {
            return Err(ConfigError::Missing { field: "name" });
        }
        if config.engine.trim().is_empty() {
            return Err(ConfigError::Missing { field: "engine" });
        }

        let engine = registry.resolve(&config.engine)?;

        let mut pool_options = AnyPoolOptions::new();
        let mut url_params = BTreeMap::new();
        for (key, value) in &config.options {
            if POOL_OPTIONS.contains(&key.as_str()) {
                pool_options = apply_pool_option(pool_options, key, value)?;
            } else if engine.url_params().contains(&key.as_str()) {
                url_params.insert(key.clone(), url_param_value(key, value)?);
            } else {
                return Err(ConfigError::UnknownOption {
                    engine: engine.name(),
                    option: key.clone(),
                });
            }
        }

        let url = engine.url(&config.name, &url_params);

        sqlx::any::install_default_drivers();
        let pool = pool_options.connect_lazy(&url).map_err(ConfigError::Driver)?;

        tracing::debug!(
            engine = engine.name(),
            name = %config.name,
            autocommit = config.autocommit,
            "database configured"
        );

        Ok(Self {
            inner: Arc::new(DatabaseInner {
                name: config.name.clone(),
                engine,
                autocommit: config.autocommit,
                options: config.options.clone(),
                pool,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn engine(&self) -> &dyn Engine {
        self.inner.engine.as_ref()
    }

    pub fn autocommit(&self) -> bool {
        self.inner.autocommit
    }

    pub fn options(&self) -> &BTreeMap<String, OptionValue> {
        &self.inner.options
    }

    pub fn pool(&self) -> &AnyPool {
        &self.inner.pool
    }

    /// Base model for `M`, bound to this database.
    pub fn model<M: Model>(&self) -> BaseModel<M> {
        BaseModel::new(self.clone())
    }

    /// Open a request session (acquire a connection and begin).
    pub async fn connect(&self) -> DbResult<Session> {
        Session::open(self).await
    }

    /// Close every pooled connection. Sessions opened afterwards fail.
    pub async fn close(&self) {
        self.inner.pool.close().await;
    }
}

fn apply_pool_option(
    options: AnyPoolOptions,
    key: &str,
    value: &OptionValue,
) -> ConfigResult<AnyPoolOptions> {
    let OptionValue::Integer(n) = value else {
        return Err(ConfigError::InvalidOption {
            option: key.to_string(),
            reason: "must be an integer",
        });
    };
    let n = *n;
    let invalid = |reason| ConfigError::InvalidOption {
        option: key.to_string(),
        reason,
    };
    let count = || to_u32(n).ok_or_else(|| invalid("is too large"));
    match key {
        "max_connections" if n >= 1 => Ok(options.max_connections(count()?)),
        "max_connections" => Err(invalid("must be at least 1")),
        "min_connections" if n >= 0 => Ok(options.min_connections(count()?)),
        "min_connections" => Err(invalid("must not be negative")),
        "acquire_timeout" if n >= 1 => Ok(options.acquire_timeout(Duration::from_secs(n as u64))),
        _ => Err(invalid("must be at least 1 second")),
    }
}

fn to_u32(n: i64) -> Option<u32> {
    u32::try_from(n).ok()
}

/// Engine params are escaped when the URL is built, so any non-empty
/// value is passed through.
fn url_param_value(key: &str, value: &OptionValue) -> ConfigResult<String> {
    let rendered = value.to_string();
    if rendered.is_empty() {
        return Err(ConfigError::InvalidOption {
            option: key.to_string(),
            reason: "must not be empty",
        });
    }
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(pairs: &[(&str, OptionValue)]) -> BTreeMap<String, OptionValue> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn missing_name_or_engine() {
        let err = Database::new("", "sqlite", true, BTreeMap::new()).unwrap_err();
        assert!(matches!(err, ConfigError::Missing { field: "name" }));

        let err = Database::new("x.db", "  ", true, BTreeMap::new()).unwrap_err();
        assert!(matches!(err, ConfigError::Missing { field: "engine" }));
    }

    #[test]
    fn unknown_engine() {
        let err = Database::new("x.db", "mongo", true, BTreeMap::new()).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownEngine { .. }));
    }

    #[tokio::test]
    async fn options_are_validated() {
        let err = Database::new("x.db", "sqlite", true, opts(&[("sslmode", "disable".into())]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownOption { engine: "sqlite", .. }));

        let err = Database::new("x.db", "sqlite", true, opts(&[("max_connections", 0.into())]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOption { .. }));

        let err = Database::new("x.db", "sqlite", true, opts(&[("max_connections", "ten".into())]))
            .unwrap_err();
        assert!(err.to_string().contains("must be an integer"));

        let err = Database::new("x.db", "sqlite", true, opts(&[("mode", "".into())]))
            .unwrap_err();
        assert!(err.to_string().contains("must not be empty"));
    }

    #[tokio::test]
    async fn postgres_options_keep_spaces_and_equals() {
        let options = opts(&[("options", "-c statement_timeout=5000".into())]);
        let db = Database::new("app", "postgres", true, options).unwrap();
        assert_eq!(db.engine().name(), "postgres");
        assert_eq!(db.pool().size(), 0);
    }

    #[tokio::test]
    async fn sqlite_path_with_percent_opens_that_file() {
        let dir = tempfile::tempdir().unwrap();
        let literal = dir.path().join("pct%41dir");
        std::fs::create_dir(&literal).unwrap();
        let path = literal.join("app.db");

        let db = Database::new(path.display().to_string(), "sqlite", true, BTreeMap::new())
            .unwrap();
        sqlx::query("CREATE TABLE marker (id INTEGER)")
            .execute(db.pool())
            .await
            .unwrap();
        db.close().await;

        assert!(path.exists());
        // %41 would decode to "A" if the path went through unescaped
        assert!(!dir.path().join("pctAdir").exists());
    }

    #[tokio::test]
    async fn configures_lazily() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lazy.db");
        let db = Database::new(
            path.display().to_string(),
            "sqlite",
            false,
            opts(&[("max_connections", 2.into()), ("cache", "shared".into())]),
        )
        .unwrap();

        assert_eq!(db.engine().name(), "sqlite");
        assert!(!db.autocommit());
        assert_eq!(db.options().len(), 2);
        assert_eq!(db.pool().size(), 0);
        assert!(!path.exists());
    }

    #[test]
    fn parses_toml() {
        let config = DatabaseConfig::parse(
            r#"
            name = "db/sample.db"
            engine = "sqlite"
            autocommit = false

            [options]
            max_connections = 4
            mode = "rwc"
            "#,
            "inline",
        )
        .unwrap();

        assert_eq!(config.name, "db/sample.db");
        assert!(!config.autocommit);
        assert_eq!(config.options["max_connections"], OptionValue::Integer(4));
        assert_eq!(config.options["mode"], OptionValue::Text("rwc".into()));
    }

    #[test]
    fn autocommit_defaults_on() {
        let raw = "name = \"a.db\"\nengine = \"sqlite\"\n";
        let config = DatabaseConfig::parse(raw, "inline").unwrap();
        assert!(config.autocommit);
    }

    #[test]
    fn parse_error_names_origin() {
        let err = DatabaseConfig::parse("name = ", "reqdb.toml").unwrap_err();
        assert!(err.to_string().contains("reqdb.toml"));
    }

    #[test]
    fn bool_parsing() {
        assert_eq!(parse_bool("Yes"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
