use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use salebot_core::{
    load_config, validate_config, DryRunPublisher, HttpFeedSource, PostingGate, PostingPipeline,
    QuotaHandle, QuotaPostingPipeline, SettingsHandle, SqliteStateStore, StateStore,
    SyncOrchestrator, WebhookPublisher,
};
use salebot_server::{api::create_router, state::AppState};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    let json = std::env::var("SALEBOT_LOG_JSON").is_ok_and(|v| v == "1" || v == "true");

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn run() -> Result<()> {
    init_tracing();

    // Determine config path
    let config_path = std::env::var("SALEBOT_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Database path: {:?}", config.database.path);

    // Create SQLite state store
    let store: Arc<dyn StateStore> = Arc::new(
        SqliteStateStore::new(&config.database.path).context("Failed to create state store")?,
    );
    info!("State store initialized");

    // Posting gate and runtime-editable settings
    let gate = PostingGate::new(config.posting.auto_posting_enabled);
    let settings = SettingsHandle::new(config.posting.settings.clone());
    info!(
        auto_posting_enabled = config.posting.auto_posting_enabled,
        "Posting gate initialized"
    );

    // Create posting pipeline with the configured publisher
    let (pipeline, quota): (Arc<dyn PostingPipeline>, QuotaHandle) = match &config.posting.webhook
    {
        Some(webhook_config) => {
            info!("Initializing webhook publisher at {}", webhook_config.url);
            let publisher = WebhookPublisher::new(webhook_config.clone())
                .context("Failed to create webhook publisher")?;
            let pipeline =
                QuotaPostingPipeline::new(publisher, settings.clone(), &config.posting.quota)
                    .with_store(Arc::clone(&store));
            let quota = pipeline.quota_handle();
            (Arc::new(pipeline), quota)
        }
        None => {
            warn!("No webhook configured; posts will only be logged");
            let pipeline =
                QuotaPostingPipeline::new(DryRunPublisher, settings.clone(), &config.posting.quota)
                    .with_store(Arc::clone(&store));
            let quota = pipeline.quota_handle();
            (Arc::new(pipeline), quota)
        }
    };

    // Create orchestrator if a feed is configured
    let orchestrator = match &config.feed {
        Some(feed_config) => {
            info!("Initializing feed source at {}", feed_config.sales_url);
            let source = HttpFeedSource::new(feed_config.clone(), Arc::clone(&store))
                .context("Failed to create feed source")?;

            let orch = SyncOrchestrator::new(
                config.orchestrator.clone(),
                Arc::new(source),
                Arc::clone(&pipeline),
                Arc::clone(&store),
                gate.clone(),
            );

            // Resume whatever state the previous process left behind
            orch.initialize_from_store().await;
            Some(orch)
        }
        None => {
            info!("No feed configured; orchestrator unavailable");
            None
        }
    };

    // Create app state
    let state = Arc::new(AppState::new(
        config.clone(),
        orchestrator,
        gate,
        settings,
        quota,
    ));

    // Create router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // The persisted enabled flag is left untouched so the next process
    // resumes in the same state.
    info!("Server shut down");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
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
    info!("Shutdown signal received");
}
