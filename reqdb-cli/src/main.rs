//! reqdb - sample server and configuration checker
//!
//! - `serve`: run the sample user-list app with the request database plugin
//! - `check`: validate the database configuration without connecting
//! - `engines`: list the engines a configuration may name

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reqdb_core::{Database, EngineRegistry};
use tokio::net::TcpListener;
use tracing::{info, warn};

mod app;
mod config;
mod tracing_setup;

use config::Settings;

#[derive(Parser, Debug)]
#[command(
    name = "reqdb",
    author,
    version,
    about = "Request-scoped database sessions for axum - sample server and config checker"
)]
struct Cli {
    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(long, global = true)]
    debug: bool,

    /// Settings file (default: ~/.reqdb/reqdb.toml when present)
    #[arg(long, short, global = true, env = "REQDB_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the sample user-list application
    Serve(ServeArgs),
    /// Validate the database configuration
    Check,
    /// List registered database engines
    Engines,
}

#[derive(Parser, Debug)]
struct ServeArgs {
    /// Bind address (overrides settings file)
    #[arg(short, long)]
    bind: Option<String>,

    /// Port to listen on (overrides settings file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Insert sample users when the table is empty
    #[arg(long)]
    seed: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    tracing_setup::init(&tracing_setup::TracingConfig { debug: cli.debug })?;

    match cli.command {
        Commands::Serve(args) => run_serve(cli.config, args).await,
        Commands::Check => run_check(cli.config),
        Commands::Engines => {
            for name in EngineRegistry::new().names() {
                println!("{}", name);
            }
            Ok(())
        }
    }
}

fn run_check(config: Option<PathBuf>) -> Result<()> {
    let settings = Settings::load(config.as_deref())?;
    // Building the pool needs a runtime but never connects
    let db = Database::from_config(&settings.database).context("Invalid database configuration")?;
    println!(
        "ok: engine={} name={} autocommit={}",
        db.engine().name(),
        db.name(),
        db.autocommit()
    );
    Ok(())
}

async fn run_serve(config: Option<PathBuf>, args: ServeArgs) -> Result<()> {
    let settings = Settings::load(config.as_deref())?;
    let db = Database::from_config(&settings.database).context("Invalid database configuration")?;

    if db.engine().name() == "sqlite" {
        let path = PathBuf::from(db.name());
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }

    app::prepare(&db, args.seed)
        .await
        .context("Failed to prepare the users table")?;

    let router = app::build_router(db.clone())?;

    let bind = args.bind.unwrap_or(settings.server.bind);
    let port = args.port.unwrap_or(settings.server.port);
    let addr: SocketAddr = format!("{}:{}", bind, port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", bind, port))?;

    let listener = TcpListener::bind(addr).await?;
    info!(
        engine = db.engine().name(),
        autocommit = db.autocommit(),
        "Server listening on {}",
        addr
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db.close().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, starting shutdown");
        }
    }
}
