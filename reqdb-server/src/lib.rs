//! reqdb-server: request-scoped database sessions for axum
//!
//! Install a [`Plugin`] and declare [`Db`] in the handlers that need the
//! database. For those requests a session is opened before the handler
//! runs and resolved afterwards: committed on a 2xx/3xx response when the
//! database autocommits, rolled back otherwise, then closed. Handlers that
//! do not declare `Db` never open a connection.
//!
//! ```ignore
//! let db = Database::new("db/sample.db", "sqlite", true, BTreeMap::new())?;
//!
//! async fn index(mut db: Db) -> Result<String, DatabaseError> {
//!     let users = db.model::<User>().select_all(db.conn().await?).await?;
//!     Ok(users.len().to_string())
//! }
//!
//! let app = Plugins::new()
//!     .install(Plugin::new(db))?
//!     .apply(Router::new().route("/", get(index)));
//! ```

pub mod error;
pub mod extractors;
pub mod layer;
pub mod plugin;

pub use error::{DatabaseError, PluginError};
pub use extractors::Db;
pub use layer::{PluginLayer, PluginService};
pub use plugin::{DefaultKeyword, Keyword, Plugin, Plugins};
