//! The reqdb plugin and its installer
//!
//! A [`Plugin`] pairs a [`Database`] with a [`Keyword`]. Handlers that
//! declare a [`Db`](crate::Db) parameter for that keyword get a session;
//! every other handler runs without touching the database.

use std::fmt;
use std::marker::PhantomData;

use axum::Router;
use reqdb_core::Database;

use crate::error::PluginError;
use crate::layer::PluginLayer;

/// Names the parameter a plugin injects.
///
/// Declare new keywords with [`keyword!`](crate::keyword).
pub trait Keyword: Send + Sync + 'static {
    const NAME: &'static str;
}

/// The `db` keyword.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultKeyword;

impl Keyword for DefaultKeyword {
    const NAME: &'static str = "db";
}

/// Declare a keyword type.
///
/// ```ignore
/// reqdb_server::keyword!(pub Analytics = "analytics");
/// ```
#[macro_export]
macro_rules! keyword {
    ($(#[$meta:meta])* $vis:vis $ty:ident = $name:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default)]
        $vis struct $ty;

        impl $crate::Keyword for $ty {
            const NAME: &'static str = $name;
        }
    };
}

pub struct Plugin<K = DefaultKeyword> {
    db: Database,
    _keyword: PhantomData<fn() -> K>,
}

impl Plugin<DefaultKeyword> {
    /// Plugin injecting `db` under the default keyword.
    pub fn new(db: Database) -> Self {
        Self {
            db,
            _keyword: PhantomData,
        }
    }
}

impl<K: Keyword> Plugin<K> {
    pub const NAME: &'static str = "reqdb";

    /// Same database, injected under another keyword.
    pub fn with_keyword<K2: Keyword>(self) -> Plugin<K2> {
        Plugin {
            db: self.db,
            _keyword: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        Self::NAME
    }

    pub fn keyword(&self) -> &'static str {
        K::NAME
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Middleware performing the request lifecycle.
    ///
    /// Apply it to a whole `Router` (usually via [`Plugins`]) or to a
    /// single route to override the database for that route.
    pub fn layer(&self) -> PluginLayer<K> {
        PluginLayer::new(self.db.clone())
    }
}

impl<K> Clone for Plugin<K> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            _keyword: PhantomData,
        }
    }
}

impl<K: Keyword> fmt::Debug for Plugin<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin")
            .field("keyword", &K::NAME)
            .field("engine", &self.db.engine().name())
            .field("autocommit", &self.db.autocommit())
            .finish()
    }
}

type Apply<S> = Box<dyn FnOnce(Router<S>) -> Router<S> + Send>;

/// Installs plugins on a router, refusing duplicate keywords.
pub struct Plugins<S = ()> {
    installed: Vec<(&'static str, Apply<S>)>,
}

impl<S> Plugins<S>
where
    S: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            installed: Vec::new(),
        }
    }

    /// # Errors
    ///
    /// [`PluginError::ConflictingKeyword`] when a plugin with the same
    /// keyword name is already installed.
    pub fn install<K: Keyword>(mut self, plugin: Plugin<K>) -> Result<Self, PluginError> {
        if self.installed.iter().any(|(keyword, _)| *keyword == K::NAME) {
            return Err(PluginError::ConflictingKeyword { keyword: K::NAME });
        }
        tracing::debug!(
            keyword = K::NAME,
            engine = plugin.db.engine().name(),
            "plugin installed"
        );
        let layer = plugin.layer();
        self.installed
            .push((K::NAME, Box::new(move |router: Router<S>| router.layer(layer))));
        Ok(self)
    }

    /// Keyword names in installation order.
    pub fn keywords(&self) -> Vec<&'static str> {
        self.installed.iter().map(|(keyword, _)| *keyword).collect()
    }

    /// Wrap every route of `router`. Call after all routes are added.
    pub fn apply(self, router: Router<S>) -> Router<S> {
        self.installed
            .into_iter()
            .fold(router, |router, (_, apply)| apply(router))
    }
}

impl<S> Default for Plugins<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    crate::keyword!(Analytics = "analytics");
    crate::keyword!(Shadow = "db");

    fn memory_db() -> Database {
        Database::new(":memory:", "sqlite", true, BTreeMap::new()).unwrap()
    }

    #[tokio::test]
    async fn describes_itself() {
        let plugin = Plugin::new(memory_db());
        assert_eq!(plugin.name(), "reqdb");
        assert_eq!(plugin.keyword(), "db");
        assert_eq!(plugin.with_keyword::<Analytics>().keyword(), "analytics");
    }

    #[tokio::test]
    async fn distinct_keywords_install() {
        let plugins = Plugins::<()>::new()
            .install(Plugin::new(memory_db()))
            .unwrap()
            .install(Plugin::new(memory_db()).with_keyword::<Analytics>())
            .unwrap();
        assert_eq!(plugins.keywords(), vec!["db", "analytics"]);
    }

    #[tokio::test]
    async fn duplicate_keyword_is_rejected() {
        let err = Plugins::<()>::new()
            .install(Plugin::new(memory_db()))
            .unwrap()
            .install(Plugin::new(memory_db()).with_keyword::<Shadow>())
            .err()
            .unwrap();
        assert!(matches!(err, PluginError::ConflictingKeyword { keyword: "db" }));
    }
}
