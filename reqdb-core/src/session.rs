//! Request-scoped database session
//!
//! A session is one pooled connection inside a transaction. Resolving the
//! transaction (commit or rollback) keeps the session usable: the next call
//! to [`Session::connection`] begins a fresh one.

use std::fmt;

use sqlx::{Any, AnyConnection, AnyPool, Transaction};

use crate::config::Database;
use crate::error::{DbError, DbResult};

pub struct Session {
    pool: AnyPool,
    tx: Option<Transaction<'static, Any>>,
    closed: bool,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("in_transaction", &self.tx.is_some())
            .field("closed", &self.closed)
            .finish()
    }
}

impl Session {
    /// Acquire a connection from the database pool and begin.
    pub async fn open(db: &Database) -> DbResult<Self> {
        let pool = db.pool().clone();
        let tx = pool.begin().await?;
        tracing::debug!(engine = db.engine().name(), "database session opened");
        Ok(Self {
            pool,
            tx: Some(tx),
            closed: false,
        })
    }

    pub fn is_open(&self) -> bool {
        !self.closed
    }

    /// True while a transaction is in progress.
    pub fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    /// The connection of the current transaction, beginning one if needed.
    pub async fn connection(&mut self) -> DbResult<&mut AnyConnection> {
        if self.closed {
            return Err(DbError::Closed);
        }
        let tx = match self.tx.take() {
            Some(tx) => tx,
            None => self.pool.begin().await?,
        };
        Ok(&mut **self.tx.insert(tx))
    }

    /// Commit the current transaction, if any.
    pub async fn commit(&mut self) -> DbResult<()> {
        if let Some(tx) = self.tx.take() {
            tx.commit().await?;
            tracing::debug!("transaction committed");
        }
        Ok(())
    }

    /// Roll back the current transaction, if any.
    pub async fn rollback(&mut self) -> DbResult<()> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
            tracing::debug!("transaction rolled back");
        }
        Ok(())
    }

    /// Roll back anything uncommitted and release the connection.
    pub async fn close(&mut self) -> DbResult<()> {
        if self.closed {
            return Ok(());
        }
        let result = self.rollback().await;
        self.closed = true;
        tracing::debug!("database session closed");
        result
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    async fn scratch_db(dir: &tempfile::TempDir) -> Database {
        let path = dir.path().join("session.db");
        let db = Database::new(path.display().to_string(), "sqlite", true, BTreeMap::new())
            .unwrap();
        let mut conn = db.pool().acquire().await.unwrap();
        sqlx::query("CREATE TABLE notes (body TEXT NOT NULL)")
            .execute(&mut *conn)
            .await
            .unwrap();
        db
    }

    async fn count(db: &Database) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM notes")
            .fetch_one(db.pool())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn commit_persists() {
        let dir = tempfile::tempdir().unwrap();
        let db = scratch_db(&dir).await;

        let mut session = db.connect().await.unwrap();
        sqlx::query("INSERT INTO notes (body) VALUES ('a')")
            .execute(session.connection().await.unwrap())
            .await
            .unwrap();
        session.commit().await.unwrap();
        assert!(!session.in_transaction());
        session.close().await.unwrap();

        assert_eq!(count(&db).await, 1);
    }

    #[tokio::test]
    async fn close_discards_uncommitted_work() {
        let dir = tempfile::tempdir().unwrap();
        let db = scratch_db(&dir).await;

        let mut session = db.connect().await.unwrap();
        sqlx::query("INSERT INTO notes (body) VALUES ('a')")
            .execute(session.connection().await.unwrap())
            .await
            .unwrap();
        session.close().await.unwrap();
        assert!(!session.is_open());

        assert_eq!(count(&db).await, 0);
    }

    #[tokio::test]
    async fn connection_begins_again_after_commit() {
        let dir = tempfile::tempdir().unwrap();
        let db = scratch_db(&dir).await;

        let mut session = db.connect().await.unwrap();
        session.commit().await.unwrap();
        sqlx::query("INSERT INTO notes (body) VALUES ('b')")
            .execute(session.connection().await.unwrap())
            .await
            .unwrap();
        assert!(session.in_transaction());
        session.rollback().await.unwrap();
        session.close().await.unwrap();

        assert_eq!(count(&db).await, 0);
    }

    #[tokio::test]
    async fn closed_session_refuses_work() {
        let dir = tempfile::tempdir().unwrap();
        let db = scratch_db(&dir).await;

        let mut session = db.connect().await.unwrap();
        session.close().await.unwrap();
        assert!(matches!(session.connection().await, Err(DbError::Closed)));
        // closing twice is harmless
        session.close().await.unwrap();
    }
}
