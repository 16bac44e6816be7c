mod backoff;
mod config;
mod delivery;
mod http;
mod models;
mod ordering;
mod pg;
mod signer;
mod store;
mod worker;

use std::sync::Arc;
use std::time::Duration;

use actix_web::{App, HttpServer, web};
use tokio::time;
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::delivery::HttpDeliveryClient;
use crate::http::AppState;
use crate::pg::{PgStore, setup_db_pool};
use crate::store::RecordStore;
use crate::worker::{WorkerConfig, run_tick};

// Graceful shutdown signal future
async fn shutdown_signal() {
    use tokio::signal;
    let ctrl_c = signal::ctrl_c();
    #[cfg(unix)]
    let mut term_signal = signal::unix::signal(signal::unix::SignalKind::terminate())
        .expect("Failed to install SIGTERM handler");
    #[cfg(unix)]
    let terminate = term_signal.recv();
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();
    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received. Exiting worker loop.");
}

async fn run_worker_loop(config: Config, store: Arc<dyn RecordStore>) {
    let worker_config = WorkerConfig::from_config(&config);
    let client = Arc::new(
        HttpDeliveryClient::new(Duration::from_millis(config.request_timeout_ms))
            .expect("Failed to build the delivery client"),
    );

    info!(interval_ms = config.sweep_interval_ms, "Starting outbox worker timer...");
    let mut interval = time::interval(Duration::from_millis(config.sweep_interval_ms));

    loop {
        tokio::select! {
            _ = interval.tick() => {
                // We clone the collaborators for the async task.
                let store = store.clone();
                let client = client.clone();
                let worker_config = worker_config.clone();

                tokio::spawn(async move {
                    match run_tick(&*store, &*client, &worker_config).await {
                        Ok(report) if report.selected > 0 => {
                            info!(
                                selected = report.selected,
                                delivered = report.delivered,
                                retried = report.retried,
                                dead = report.dead,
                                blocked = report.blocked,
                                raced = report.raced,
                                "Tick complete."
                            );
                        }
                        Ok(_) => {}
                        Err(e) => error!("Error during outbox tick: {e}"),
                    }
                });
            },
            _ = shutdown_signal() => {
                break;
            }
        }
    }
    info!("Worker shutting down.");
}

/// The main function sets up our application's state and runs the timer.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Setup logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    // --- Configuration ---
    info!("Loading configuration...");
    let config = Config::load().expect("Failed to load configuration");
    info!("Configuration loaded.");
    // --- End Configuration ---

    // 1. Connect to the Database
    info!("Connecting to database...");
    let db_pool = setup_db_pool(&config)
        .await
        .expect("failed to create database connection.");
    info!("Database connection established.");

    let store: Arc<dyn RecordStore> = Arc::new(PgStore::new(db_pool));

    // 2. The delivery worker on its timer
    let worker_store = store.clone();
    let worker_config = config.clone();
    let worker_handle = tokio::spawn(async move {
        run_worker_loop(worker_config, worker_store).await;
    });

    // 3. The enqueue/inspect/replay API plus the health check
    let state = web::Data::new(AppState { store });
    let api_server = HttpServer::new(move || {
        App::new().app_data(state.clone()).configure(http::configure)
    })
    .bind(("0.0.0.0", 8080))? // Binds to all interfaces on port 8080
    .run();

    info!("API server running on http://0.0.0.0:8080");

    // Keep both tasks running
    // This will error out if either the server or the worker task fails
    let _ = tokio::try_join!(
        async { api_server.await },
        async {
            worker_handle
                .await
                .map_err(|e| std::io::Error::other(e))
        }
    )?;

    Ok(())
}
