//! Plugin and handler error types with IntoResponse
//!
//! Handler failures are reported the same way regardless of their source:
//! the request transaction is rolled back and the client gets a 500 with a
//! `Database Error: ...` body.

use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use reqdb_core::DbError;
use serde_json::json;

/// Any failure raised by a route handler that uses the database.
///
/// `?` converts every `std::error::Error` into it, so handlers can use it
/// as their error type directly.
#[derive(Debug)]
pub struct DatabaseError(anyhow::Error);

impl DatabaseError {
    /// Build an error from a plain message.
    pub fn msg<M>(message: M) -> Self
    where
        M: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        Self(anyhow::Error::msg(message))
    }

    pub fn inner(&self) -> &anyhow::Error {
        &self.0
    }
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Database Error: {}", self.0)
    }
}

impl<E> From<E> for DatabaseError
where
    E: Into<anyhow::Error>,
{
    fn from(e: E) -> Self {
        Self(e.into())
    }
}

impl IntoResponse for DatabaseError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self.0, "route failed, transaction rolled back");
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
    }
}

/// Plugin setup and extraction failures.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// Two plugins were installed for the same keyword.
    #[error(
        "found another reqdb plugin with conflicting settings (non-unique keyword \"{keyword}\")"
    )]
    ConflictingKeyword { keyword: &'static str },

    /// A handler asked for a keyword no plugin layer provides.
    #[error("no reqdb plugin installed for keyword \"{keyword}\"")]
    NotInstalled { keyword: &'static str },

    /// A second `Db` for the same keyword was extracted while the first
    /// was still alive.
    #[error("reqdb keyword \"{keyword}\" extracted more than once at the same time")]
    OverlappingExtractors { keyword: &'static str },

    /// Connecting for the request failed.
    #[error(transparent)]
    Database(#[from] DbError),
}

impl IntoResponse for PluginError {
    fn into_response(self) -> Response {
        match self {
            Self::Database(e) => DatabaseError::from(e).into_response(),
            other => {
                tracing::error!("Plugin error: {}", other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": "plugin_error",
                        "message": other.to_string()
                    })),
                )
                    .into_response()
            }
        }
    }
}
