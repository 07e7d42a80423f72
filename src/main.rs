use clap::Parser;
use dotenv::dotenv;
use sqlx::SqlitePool;
use tokio::{net::TcpListener, signal};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

mod api;
mod cli;
mod config;
mod db;
mod discovery;
mod error;
mod export;
mod models;
mod utils;

use cli::{Cli, Command};
use config::AppConfig;
use discovery::GeoLocator;
use error::AppError;
use models::AppState;

#[tokio::main]
async fn main() {
    // Initialize environment
    dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse command-line arguments
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let config = AppConfig::from_cli(&cli)?;
    let pool = db::create_pool(&config.database_path).await?;

    // Cancel running work on Ctrl-C
    let cancel = CancellationToken::new();
    let cancel_on_signal = cancel.clone();
    tokio::spawn(async move {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!("Error handling shutdown signal: {}", err);
            return;
        }
        tracing::info!("Received shutdown signal, stopping...");
        cancel_on_signal.cancel();
    });

    match cli.command {
        Command::Discover => {
            discovery::run_discovery(&pool, &config.crawler, &cancel).await?;
        }
        Command::Geolocate => {
            geolocate(&pool, &config).await?;
        }
        Command::Full => {
            discovery::run_discovery(&pool, &config.crawler, &cancel).await?;
            if cancel.is_cancelled() {
                tracing::info!("Skipping geolocation after shutdown signal");
                return Ok(());
            }
            geolocate(&pool, &config).await?;
            print_stats(&pool).await?;
        }
        Command::Stats => {
            print_stats(&pool).await?;
        }
        Command::Export { output } => {
            let relays = db::get_all_relays(&pool).await?;
            export::export_relays(&relays, &output).await?;
        }
        Command::Serve { port } => {
            serve(pool, port, cancel).await?;
        }
    }

    Ok(())
}

async fn geolocate(pool: &SqlitePool, config: &AppConfig) -> Result<(), AppError> {
    let locator = GeoLocator::new(&config.geo)?;
    let located = discovery::run_geolocation(pool, &locator, config.geo.concurrency).await?;

    let geo_stats = locator.stats().await;
    tracing::info!(
        "Geolocation finished: {} relays located using {} ranges",
        located,
        geo_stats.ranges
    );
    Ok(())
}

async fn print_stats(pool: &SqlitePool) -> Result<(), AppError> {
    let stats = db::get_relay_stats(pool).await?;

    println!("Relay database statistics");
    println!("  Total relays:       {}", stats.total_relays);
    println!("  Functioning relays: {}", stats.functioning_relays);
    println!("  Geolocated relays:  {}", stats.geolocated_relays);
    println!("  Unique hosts:       {}", stats.unique_hosts);
    println!("  Unique countries:   {}", stats.unique_countries);
    Ok(())
}

async fn serve(pool: SqlitePool, port: u16, cancel: CancellationToken) -> Result<(), AppError> {
    let app = api::router(AppState { db_pool: pool });

    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .map_err(|e| AppError::ServerError(format!("cannot bind port {}: {}", port, e)))?;

    tracing::info!("Server started at http://0.0.0.0:{}", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .map_err(|e| AppError::ServerError(e.to_string()))?;

    tracing::info!("Shutdown complete");
    Ok(())
}
