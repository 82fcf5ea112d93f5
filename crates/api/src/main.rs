use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sdgate_core::offload::OffloadCodec;
use sdgate_core::task::HTTP_TIMEOUT;
use sdgate_pipeline::{
    BackendModelLoader, Dispatcher, GenerationBackend, ModelManager, ProxyPipeline, SdBackend,
    TaskTracker,
};
use sdgate_sdapi::SdApi;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sdgate_api::background::task_retention;
use sdgate_api::config::ServerConfig;
use sdgate_api::router::build_app_router;
use sdgate_api::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Configuration ---
    let config = ServerConfig::from_env().context("Invalid server configuration")?;

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.default_log_filter().into());
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    let subscriber = tracing_subscriber::registry().with(filter);
    if json_logs {
        subscriber.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        subscriber.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!(
        host = %config.host,
        port = config.port,
        mode = %config.mode,
        flex_mode = config.flex_mode.as_str(),
        function = %config.function_name,
        "Loaded server configuration"
    );

    // --- Function registry ---
    let registry = sdgate_db::connect(config.db_type, &config.database_url)
        .await
        .context("Failed to open function registry")?;
    registry
        .health_check()
        .await
        .context("Function registry health check failed")?;

    // --- Object storage ---
    let store = sdgate_cloud::build_store(&config.storage)
        .await
        .context("Failed to initialise object storage")?;

    // --- Models ---
    let models_dir = config.models_dir();
    let loader = Arc::new(BackendModelLoader::new(
        Arc::clone(&store),
        SdApi::new(config.downstream.clone()),
        models_dir.clone(),
    ));
    let models = Arc::new(ModelManager::new(loader, config.load_policy, models_dir.clone()));
    if let Err(e) = models.discover().await {
        tracing::warn!(error = %e, dir = %models_dir.display(), "Model discovery failed");
    }

    // --- Pipeline ---
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&registry),
        Arc::clone(&models) as _,
        config.flex_mode,
        config.function_name.clone(),
        config.downstream.clone(),
    ));
    let backend: Arc<dyn GenerationBackend> =
        Arc::new(SdBackend::new(HTTP_TIMEOUT).context("Failed to build backend client")?);
    let tracker = Arc::new(TaskTracker::new());
    let pipeline = Arc::new(ProxyPipeline::new(
        Arc::clone(&tracker),
        Arc::clone(&dispatcher),
        Arc::clone(&backend),
        OffloadCodec::new(Arc::clone(&store)),
    ));

    // --- Background jobs ---
    let cancel = CancellationToken::new();
    let retention_handle = tokio::spawn(task_retention::run(
        Arc::clone(&tracker),
        Duration::from_secs(config.task_retention_secs),
        task_retention::SWEEP_INTERVAL,
        cancel.clone(),
    ));

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        registry,
        tracker,
        models,
        dispatcher,
        pipeline,
        backend,
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let host = config
        .host
        .parse()
        .with_context(|| format!("Invalid HOST address {:?}", config.host))?;
    let addr = SocketAddr::new(host, config.port);
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    cancel.cancel();
    let drain = Duration::from_secs(config.shutdown_timeout_secs);
    if tokio::time::timeout(drain, retention_handle).await.is_err() {
        tracing::warn!(timeout_secs = drain.as_secs(), "Task retention job did not stop in time");
    }

    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix). If a handler cannot
/// be installed that signal source is ignored.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
