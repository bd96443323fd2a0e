// Copyright 2023 Remi Bernotavicius

use clap::Parser;
use clap::Subcommand;
use std::path::PathBuf;
use std::sync::Arc;

mod api;
mod auth;
mod config;
mod cookable;
mod database;
mod error;
mod import;
mod query;
mod routes;
mod social;
mod storage;

type Error = Box<dyn std::error::Error + Send + Sync + 'static>;
type Result<T> = std::result::Result<T, Error>;

#[derive(Parser, Debug)]
struct Args {
    /// Defaults to `~/.config/gohandoki/config.toml` on Linux.
    #[arg(long, env = "GOHANDOKI_CONFIG")]
    config: Option<PathBuf>,

    /// Overridden by `RUST_LOG`.
    #[arg(long, default_value = "info")]
    log_level: log::LevelFilter,

    #[command(subcommand)]
    commands: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the HTTP server.
    Serve,
    /// Load ingredient and recipe categories from a TOML catalog.
    Import { path: PathBuf },
    /// Apply pending database migrations and exit.
    Migrate,
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
        log::info!("received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
                log::info!("received terminate signal, shutting down");
            }
            Err(e) => {
                log::error!("failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn serve(config: config::Config) -> Result<()> {
    let pool = database::establish_pool(&config.database, config.pool_size)?;
    let keys = auth::Keys::new(&config.session_secret());
    let storage = storage::Storage::new(&config.storage)?;
    let social = social::providers_from_config(&config.social)?;

    let listen = config.listen;
    let state = api::AppState {
        pool,
        keys,
        storage,
        social,
        config: Arc::new(config),
    };
    let app = routes::router(state)?;

    let listener = tokio::net::TcpListener::bind(listen).await?;
    log::info!("listening on {listen}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    log::info!("server stopped");
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    simple_logger::SimpleLogger::new()
        .with_level(args.log_level)
        .env()
        .init()?;

    let config = config::Config::load(args.config.as_deref())?;
    match args.commands {
        Commands::Serve => tokio::runtime::Runtime::new()?.block_on(serve(config))?,
        Commands::Import { path } => {
            let conn = database::establish_connection(&config.database)?;
            import::import_catalog(conn, path)?
        }
        Commands::Migrate => {
            database::establish_pool(&config.database, 1)?;
        }
    }
    Ok(())
}
