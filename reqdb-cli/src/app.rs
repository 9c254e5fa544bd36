//! Sample application: a user list backed by the request database

use axum::extract::Json;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use reqdb_core::{Column, Database, DbResult, Model};
use reqdb_server::{DatabaseError, Db, Plugin, PluginError, Plugins};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tower_http::trace::TraceLayer;

/// Names inserted by `serve --seed` into an empty table.
pub const SEED_NAMES: &[&str] = &["A", "B", "C", "D", "E", "F"];

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: i64,
    pub name: String,
}

impl Model for User {
    const TABLE: &'static str = "users";
    const COLUMNS: &'static [Column] = &[Column::new("name", "TEXT")];
}

#[derive(Debug, Deserialize)]
pub struct CreateUser {
    pub name: String,
}

/// Create the users table if needed and optionally seed it.
pub async fn prepare(db: &Database, seed: bool) -> DbResult<()> {
    let users = db.model::<User>();
    let mut session = db.connect().await?;
    let conn = session.connection().await?;
    users.create_table(conn, true).await?;

    if seed && users.count(conn).await? == 0 {
        for name in SEED_NAMES {
            sqlx::query("INSERT INTO users (name) VALUES ($1)")
                .bind(*name)
                .execute(&mut *conn)
                .await?;
        }
        tracing::info!(count = SEED_NAMES.len(), "seeded users");
    }

    session.commit().await?;
    session.close().await
}

/// GET / - list users as HTML
async fn index(mut db: Db) -> Result<Html<String>, DatabaseError> {
    let users = db.model::<User>().select_all(db.conn().await?).await?;
    let items: String = users
        .iter()
        .map(|u| format!("<li>{}</li>", escape(&u.name)))
        .collect();
    Ok(Html(format!("Here is:<br><ul>{}</ul>", items)))
}

/// POST /users - create a user
async fn create_user(mut db: Db, Json(req): Json<CreateUser>) -> Result<Response, DatabaseError> {
    let name = req.name.trim();
    if name.is_empty() {
        return Ok((StatusCode::BAD_REQUEST, "name must not be empty").into_response());
    }

    let id: i64 = sqlx::query_scalar("INSERT INTO users (name) VALUES ($1) RETURNING id")
        .bind(name)
        .fetch_one(db.conn().await?)
        .await?;

    if !db.autocommit() {
        db.commit().await?;
    }

    let user = User {
        id,
        name: name.to_string(),
    };
    Ok((StatusCode::CREATED, axum::Json(user)).into_response())
}

/// GET /health - never touches the database
async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub fn build_router(db: Database) -> Result<Router, PluginError> {
    let routes = Router::new()
        .route("/", get(index))
        .route("/users", post(create_user))
        .route("/health", get(health));

    let app = Plugins::new().install(Plugin::new(db))?.apply(routes);
    Ok(app.layer(TraceLayer::new_for_http()))
}

fn escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
