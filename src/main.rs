use anyhow::{Context, Result};
use devserver_manager::config::Config;
use devserver_manager::dev_server::{DevServerSupervisor, SupervisorConfig};
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::{filter::EnvFilter, fmt::format::FmtSpan, FmtSubscriber};

fn setup_logging(log_level_str: &str) {
    let level = match log_level_str.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("devserver_manager={},tower_http={}", level, level))
    });

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .with_level(true)
        .with_span_events(FmtSpan::CLOSE)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

#[cfg(feature = "http")]
async fn serve(config: &Config, supervisor: Arc<DevServerSupervisor>) -> Result<()> {
    use devserver_manager::http::{router, AppState};
    use devserver_manager::projects::JsonProjectRepository;

    let projects = JsonProjectRepository::load(&config.projects_file)
        .await
        .with_context(|| format!("Failed to load projects from {}", config.projects_file.display()))?;
    let state = Arc::new(AppState::new(supervisor.clone(), Arc::new(projects)));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(%addr, "Listening for dev server requests");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;
    Ok(())
}

#[cfg(not(feature = "http"))]
async fn serve(_config: &Config, _supervisor: Arc<DevServerSupervisor>) -> Result<()> {
    tracing::error!("Built without the `http` feature; no transport available.");
    anyhow::bail!("No transport compiled in. Rebuild with `--features http`.");
}

#[cfg(feature = "http")]
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    setup_logging(&config.log_level);

    tracing::info!(version = %env!("CARGO_PKG_VERSION"), "Starting devserver-manager");
    tracing::debug!("Loaded configuration: {:?}", config);

    let supervisor = Arc::new(DevServerSupervisor::new(SupervisorConfig::from(&config)));
    let result = serve(&config, supervisor.clone()).await;

    supervisor.shutdown_all().await;
    tracing::info!("Server shutdown.");
    result
}
