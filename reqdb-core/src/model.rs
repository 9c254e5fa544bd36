//! Base model bound to a configured database
//!
//! Models describe their table; [`BaseModel`] knows which engine the table
//! lives in and issues the few statements every model needs. Anything
//! richer is written with sqlx directly against the session connection.

use std::marker::PhantomData;

use sqlx::any::AnyRow;
use sqlx::{AnyConnection, FromRow};

use crate::config::Database;
use crate::error::DbResult;

/// One non-key column of a model table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub sql_type: &'static str,
    pub nullable: bool,
}

impl Column {
    pub const fn new(name: &'static str, sql_type: &'static str) -> Self {
        Self {
            name,
            sql_type,
            nullable: false,
        }
    }

    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
}

/// A table-backed record. Every model has an implicit integer `id` key.
pub trait Model: for<'r> FromRow<'r, AnyRow> + Send + Unpin {
    const TABLE: &'static str;
    const COLUMNS: &'static [Column];
}

/// Model operations bound to one [`Database`].
#[derive(Debug)]
pub struct BaseModel<M> {
    db: Database,
    _model: PhantomData<fn() -> M>,
}

impl<M> Clone for BaseModel<M> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            _model: PhantomData,
        }
    }
}

impl<M: Model> BaseModel<M> {
    pub(crate) fn new(db: Database) -> Self {
        Self {
            db,
            _model: PhantomData,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn table(&self) -> &'static str {
        M::TABLE
    }

    /// `CREATE TABLE` statement in the bound engine's dialect.
    pub fn create_table_sql(&self, fail_silently: bool) -> String {
        let mut defs = vec![self.db.engine().primary_key_ddl().to_string()];
        defs.extend(M::COLUMNS.iter().map(|c| {
            let null = if c.nullable { "" } else { " NOT NULL" };
            format!("{} {}{}", c.name, c.sql_type, null)
        }));
        let guard = if fail_silently { "IF NOT EXISTS " } else { "" };
        format!("CREATE TABLE {}{} ({})", guard, M::TABLE, defs.join(", "))
    }

    /// Create the table. With `fail_silently` an existing table is not an error.
    pub async fn create_table(
        &self,
        conn: &mut AnyConnection,
        fail_silently: bool,
    ) -> DbResult<()> {
        sqlx::query(&self.create_table_sql(fail_silently))
            .execute(conn)
            .await?;
        Ok(())
    }

    pub async fn drop_table(&self, conn: &mut AnyConnection, fail_silently: bool) -> DbResult<()> {
        let guard = if fail_silently { "IF EXISTS " } else { "" };
        sqlx::query(&format!("DROP TABLE {}{}", guard, M::TABLE))
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Every row, ordered by id.
    pub async fn select_all(&self, conn: &mut AnyConnection) -> DbResult<Vec<M>> {
        let columns = std::iter::once("id")
            .chain(M::COLUMNS.iter().map(|c| c.name))
            .collect::<Vec<_>>()
            .join(", ");
        let rows = sqlx::query_as::<_, M>(&format!(
            "SELECT {} FROM {} ORDER BY id",
            columns,
            M::TABLE
        ))
        .fetch_all(conn)
        .await?;
        Ok(rows)
    }

    pub async fn count(&self, conn: &mut AnyConnection) -> DbResult<i64> {
        let n = sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {}", M::TABLE))
            .fetch_one(conn)
            .await?;
        Ok(n)
    }
}
