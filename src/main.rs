use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};

use perf_observer::audit::LighthouseEngine;
use perf_observer::config::{CliArgs, ObserverConfig};
use perf_observer::server;
use perf_observer::state::ObserverState;
use perf_observer::store::SqliteJobStore;
use perf_observer::webhook::WebhookDispatcher;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "perf_observer=info,tower_http=info".into()),
        )
        .init();

    let args = CliArgs::parse();
    let config = ObserverConfig::from_args(args);
    let port = config.port;

    info!("Starting perf-observer v{}", env!("CARGO_PKG_VERSION"));
    info!("Database: {:?}", config.db_path);
    info!(
        "Runs per job: {}, cooldown: {}ms, run timeout: {}s",
        config.runs.run_count,
        config.runs.cooldown.as_millis(),
        config.engine.run_timeout.as_secs()
    );
    info!(
        "Webhook retries: {} attempts, base delay {}ms",
        config.webhook.max_attempts,
        config.webhook.base_delay.as_millis()
    );
    match &config.webhook.allowed_hosts {
        Some(hosts) => info!("Webhook allow-list: {} host(s)", hosts.len()),
        None => warn!("No webhook allow-list configured; any public host is accepted"),
    }

    let store = Arc::new(SqliteJobStore::open(&config.db_path)?);
    let engine = Arc::new(LighthouseEngine::new(config.engine.clone()));
    let webhooks = WebhookDispatcher::new(config.webhook.clone());
    let state = Arc::new(ObserverState::new(config, engine, store, webhooks));

    let router = server::build_router(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    info!("Observer listening on http://0.0.0.0:{}", port);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Observer shutting down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}
