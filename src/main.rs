//! Churn Risk Service - Main Entry Point
//!
//! Loads the model artifact once, then serves predictions and feedback
//! over HTTP until interrupted.

use anyhow::{Context, Result};
use churn_risk_service::{
    api::{build_router, AppState},
    config::{AppConfig, LoggingConfig},
    feedback::FeedbackLog,
    metrics::{MetricsReporter, ServiceMetrics},
    models::inference::InferenceEngine,
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    init_tracing(&config.logging)?;

    info!("Starting Churn Risk Service");
    info!(
        manifest = %config.model.manifest_path.display(),
        feedback = %config.feedback.path.display(),
        feedback_auth = config.auth.require_key_for_feedback,
        "Configuration loaded successfully"
    );

    // Any artifact problem is fatal: the service never starts without a model.
    let engine = match InferenceEngine::new(&config) {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            error!(error = %format!("{:#}", e), "Failed to load model artifact");
            return Err(e);
        }
    };
    info!(
        "Inference engine ready: {} ({}), {} features, schema {}",
        engine.model_name(),
        engine.model_type(),
        engine.feature_count(),
        engine.schema()
    );

    let metrics = Arc::new(ServiceMetrics::new());
    let feedback = Arc::new(FeedbackLog::from_config(&config.feedback));

    if config.metrics.report_interval_secs > 0 {
        let reporter = MetricsReporter::new(metrics.clone(), config.metrics.report_interval_secs);
        tokio::spawn(reporter.start());
    }

    let state = AppState::new(engine, feedback, metrics.clone(), config.auth.clone());
    let router = build_router(state);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Service shutting down...");
    metrics.print_summary();

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&logging.level)
            .with_context(|| format!("Invalid log level `{}`", logging.level))?,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
