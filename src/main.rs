//! SAR Recommendation Service
//!
//! Fits a SAR model from an interactions file, stores top-K lists and serves
//! them over HTTP.
//!
//! # Architecture
//!
//! - **Batch Job**: Fit the model and store recommendations, once at startup
//!   and optionally on an interval
//! - **Repository**: PostgreSQL when `DATABASE_URL` is set, in-memory otherwise
//! - **API Server**: REST endpoints for stored and live recommendations
//!
//! # Graceful Shutdown
//!
//! SIGTERM and SIGINT stop the refresher and the API server, then close the
//! database pool.

use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use sar::api::{self, AppState};
use sar::config::Config;
use sar::database::{self, Database, InMemoryRepository, RecommendationRepository};
use sar::error::Result;
use sar::recommendation::updater;
use sar::Sar;

/// Components shared by the background tasks
struct Services {
    config: Arc<Config>,
    app: Arc<AppState>,
    shutdown: broadcast::Sender<()>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("SAR Recommendation Service v{}", env!("CARGO_PKG_VERSION"));

    let config = Arc::new(Config::from_env()?);
    let model = Arc::new(Sar::new(config.sar_config()?));
    info!("Configuration loaded and validated");

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // Pick the repository
    let db = match &config.database {
        Some(db_config) => {
            let db = Database::new(db_config).await?;
            database::run_migrations(db.pool()).await?;
            info!("Database connection pool established");
            Some(db)
        }
        None => None,
    };
    let repository: Arc<dyn RecommendationRepository> = match &db {
        Some(db) => Arc::new(db.clone()),
        None => {
            info!("DATABASE_URL not set, serving recommendations from memory");
            Arc::new(InMemoryRepository::new())
        }
    };

    let services = Arc::new(Services {
        config: config.clone(),
        app: Arc::new(AppState {
            repository,
            model,
        }),
        shutdown: shutdown_tx.clone(),
    });

    // Initial batch run, so the API starts with data
    if config.batch.interactions_path.is_some() {
        run_batch(&services).await;
    } else {
        info!("No interactions file configured, skipping batch job");
    }

    let mut handles = Vec::new();

    if config.batch.interactions_path.is_some() {
        if let Some(interval) = config.batch.refresh_interval {
            info!("Refreshing recommendations every {:?}", interval);
            handles.push(spawn_refresher(services.clone(), interval));
        }
    }

    handles.push(spawn_api_server(services.clone()));
    info!(
        "Health: http://{}:{}/health",
        config.api.host, config.api.port
    );

    // Wait for shutdown signal or service failure
    tokio::select! {
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
        }
        _ = wait_for_any_failure(&mut handles) => {
            warn!("A service failed, initiating shutdown");
        }
    }

    info!("Initiating graceful shutdown...");
    let _ = shutdown_tx.send(());

    let shutdown_timeout = Duration::from_secs(30);
    if tokio::time::timeout(shutdown_timeout, shutdown_services(handles))
        .await
        .is_err()
    {
        warn!("Shutdown timeout exceeded, forcing exit");
    }

    if let Some(db) = db {
        db.close().await;
    }

    info!("SAR service stopped gracefully");
    Ok(())
}

/// Initialize structured logging with tracing
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("sar=debug,sar_engine=debug,tower_http=debug,sqlx=warn,info")
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .with_ansi(std::env::var("NO_COLOR").is_err()),
        )
        .init();
}

/// Fit and store once, logging failures
///
/// A failed run keeps the previously fitted model and stored rows.
async fn run_batch(services: &Services) {
    match updater::update_all_recommendations(
        services.app.model.clone(),
        services.app.repository.as_ref(),
        &services.config.batch,
    )
    .await
    {
        Ok(report) => info!(
            "Batch run stored {} users, pruned {} stale, in {}ms fit",
            report.rows_written, report.rows_pruned, report.fit.fit_duration_ms
        ),
        Err(e) => error!("Batch recommendation run failed: {:?}", e),
    }
}

/// Spawn the periodic refit task
fn spawn_refresher(services: Arc<Services>, every: Duration) -> tokio::task::JoinHandle<()> {
    let mut shutdown_rx = services.shutdown.subscribe();

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);

        // Skip first tick, the startup run already happened
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    info!("Running scheduled recommendation refresh...");
                    run_batch(&services).await;
                }
                _ = shutdown_rx.recv() => {
                    info!("Recommendation refresher shutting down");
                    break;
                }
            }
        }
    })
}

/// Spawn the API server
fn spawn_api_server(services: Arc<Services>) -> tokio::task::JoinHandle<()> {
    let mut shutdown_rx = services.shutdown.subscribe();

    tokio::spawn(async move {
        tokio::select! {
            result = api::start_server(services.app.clone(), &services.config.api) => {
                if let Err(e) = result {
                    error!("API server error: {:?}", e);
                }
            }
            _ = shutdown_rx.recv() => {
                info!("API server shutting down");
            }
        }
    })
}

/// Wait for any task to fail
async fn wait_for_any_failure(handles: &mut [tokio::task::JoinHandle<()>]) {
    loop {
        if handles.iter().any(|handle| handle.is_finished()) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// Wait for all services to complete shutdown
async fn shutdown_services(handles: Vec<tokio::task::JoinHandle<()>>) {
    for handle in handles {
        let _ = handle.await;
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
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
