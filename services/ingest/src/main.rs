use anyhow::{Context, Result};
use portrait_ingest::api::{start_api_server, AppState};
use portrait_ingest::config::Config;
use portrait_ingest::face_detection::RekognitionFaceDetector;
use portrait_ingest::listing::ListingService;
use portrait_ingest::object_store::S3ObjectStore;
use portrait_ingest::pipeline::IngestionPipeline;
use portrait_ingest::record_store::PgRecordStore;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        "Starting Portrait ingest service"
    );

    // Initialize metrics
    init_metrics(config.service.metrics_port)?;

    // Initialize collaborators
    let record_store = Arc::new(
        PgRecordStore::new(&config.database)
            .await
            .context("Failed to initialize record store")?,
    );

    // Run migrations if enabled
    if config.database.run_migrations {
        record_store
            .run_migrations()
            .await
            .context("Failed to run database migrations")?;
    }

    let object_store = Arc::new(
        S3ObjectStore::new(&config.s3)
            .await
            .context("Failed to initialize object store")?,
    );

    let face_detector = Arc::new(
        RekognitionFaceDetector::new(&config.rekognition)
            .await
            .context("Failed to initialize face detector")?,
    );

    let pipeline = Arc::new(IngestionPipeline::new(
        record_store.clone(),
        object_store.clone(),
        face_detector,
        config.validation.clone(),
    ));

    let listing = Arc::new(ListingService::new(record_store, object_store));

    let state = AppState {
        pipeline,
        listing,
        max_upload_files: config.validation.max_upload_files,
        max_file_size_bytes: config.validation.max_file_size_bytes,
        url_expiry_secs: config.s3.presigned_url_expiry_secs,
    };

    // Serve until shutdown
    tokio::select! {
        result = start_api_server(state, &config.api) => {
            result.context("API server error")?;
        }
        _ = shutdown_signal() => {
            info!("Shutting down ingest service");
        }
    }

    info!("Ingest service stopped");

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();

    builder
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
