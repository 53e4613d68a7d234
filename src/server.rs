//! Logging setup, runtime assembly and the foreground server.

use std::sync::Arc;

use tracing::{info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use flowhands_api::{ApiServer, AppState, ServerConfig};
use flowhands_config::{Config, ConfigLoader, ConfigValidator, LoggingConfig};
use flowhands_flows::{StoryWorkers, builtin_registry};
use flowhands_runtime::{FlowRuntime, InMemoryMemoryProvider};
use flowhands_store::open_store;

/// Console logging on stderr plus an optional daily-rolling log file.
pub(crate) fn init_tracing(logging: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let file_layer = if logging.file {
        let log_dir = logging.resolved_dir();
        std::fs::create_dir_all(&log_dir)?;

        let file_appender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix("flowhands")
            .filename_suffix("log")
            .max_log_files(30)
            .build(&log_dir)?;

        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        // Dropping the guard stops the background writer.
        static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
            std::sync::OnceLock::new();
        let _ = GUARD.set(guard);

        Some(fmt::layer().with_writer(non_blocking).with_ansi(false))
    } else {
        None
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true),
        )
        .with(file_layer)
        .try_init()?;

    Ok(())
}

/// Load and validate configuration. Warnings are logged once tracing is up.
pub(crate) fn load_config(
    path: Option<&std::path::Path>,
) -> Result<(Config, Vec<String>), Box<dyn std::error::Error>> {
    let config = ConfigLoader::load_or_default(path)?;
    let warnings = ConfigValidator::validate(&config)
        .into_result()?
        .into_iter()
        .map(|w| format!("{}: {}", w.path, w.message))
        .collect();
    Ok((config, warnings))
}

/// Assemble the runtime: store, built-in flows and session memory.
pub(crate) async fn build_runtime(config: &Config) -> Result<Arc<FlowRuntime>, Box<dyn std::error::Error>> {
    let db_path = config.database.resolved_path();
    let store = open_store(db_path.as_deref()).await;
    if db_path.is_none() {
        warn!("Runs are kept in memory and lost on exit; set database.path to keep them");
    }

    let registry = builtin_registry(&StoryWorkers::offline())?;
    let runtime = FlowRuntime::new(
        Arc::new(registry),
        store,
        Arc::new(InMemoryMemoryProvider::new()),
        config,
    );
    Ok(Arc::new(runtime))
}

/// Serve the HTTP API in the foreground.
pub(crate) async fn run_server(
    config: Config,
    host: Option<String>,
    port: Option<u16>,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting FlowHands v{}", env!("CARGO_PKG_VERSION"));

    let runtime = build_runtime(&config).await?;
    for flow in runtime.list_flows() {
        info!(flow_id = %flow.id, "Registered flow: {}", flow.description);
    }

    let server_config = ServerConfig::new(
        host.unwrap_or(config.server.host),
        port.unwrap_or(config.server.port),
    );
    let server = ApiServer::new(server_config, Arc::new(AppState::new(runtime)));
    server.run().await
}
