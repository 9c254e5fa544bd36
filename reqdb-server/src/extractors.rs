//! The injected database handle

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use reqdb_core::{BaseModel, Database, DbError, DbResult, Model, Session};
use sqlx::AnyConnection;

use crate::error::PluginError;
use crate::layer::Slot;
use crate::plugin::{DefaultKeyword, Keyword};

/// Database handle for the current request.
///
/// Declaring `Db<K>` as a handler parameter is what makes the plugin for
/// keyword `K` connect for that request. The handle owns the request
/// session while it lives and hands it back to the layer when dropped, so
/// only one `Db<K>` can be extracted at a time. A connection borrowed from
/// [`Db::conn`] must be released before [`Db::commit`] or [`Db::rollback`]
/// can be called.
pub struct Db<K: Keyword = DefaultKeyword> {
    slot: Slot<K>,
    session: Option<Session>,
}

impl<S, K> FromRequestParts<S> for Db<K>
where
    S: Send + Sync,
    K: Keyword,
{
    type Rejection = PluginError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let slot = parts
            .extensions
            .get::<Slot<K>>()
            .cloned()
            .ok_or(PluginError::NotInstalled { keyword: K::NAME })?;
        let session = slot.lend().await?;
        Ok(Self {
            slot,
            session: Some(session),
        })
    }
}

impl<K: Keyword> Db<K> {
    pub fn database(&self) -> &Database {
        &self.slot.db
    }

    pub fn keyword(&self) -> &'static str {
        K::NAME
    }

    pub fn autocommit(&self) -> bool {
        self.slot.db.autocommit()
    }

    /// Base model for `M` on the injected database.
    pub fn model<M: Model>(&self) -> BaseModel<M> {
        self.slot.db.model()
    }

    fn session(&mut self) -> DbResult<&mut Session> {
        self.session.as_mut().ok_or(DbError::Closed)
    }

    /// The request connection.
    ///
    /// Begins a new transaction if the previous one was resolved with
    /// [`Db::commit`] or [`Db::rollback`].
    pub async fn conn(&mut self) -> DbResult<&mut AnyConnection> {
        self.session()?.connection().await
    }

    /// Commit now. Needed to persist anything when autocommit is off.
    pub async fn commit(&mut self) -> DbResult<()> {
        self.session()?.commit().await
    }

    pub async fn rollback(&mut self) -> DbResult<()> {
        self.session()?.rollback().await
    }
}

impl<K: Keyword> Drop for Db<K> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            self.slot.give_back(session);
        }
    }
}
