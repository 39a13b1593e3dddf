use crate::balancer::HealthChecker;
use crate::config::Config;
use crate::server::{self, AppState};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// CLI arguments forwarded from `main()`.
pub struct BootstrapArgs {
    pub config_path: std::path::PathBuf,
    /// Explicit listen address; defaults to `0.0.0.0:{config.port}`.
    pub listen: Option<String>,
    pub admin_listen: String,
}

/// Process lifecycle: init → build state → spawn loops → serve → shutdown.
pub async fn run(args: BootstrapArgs) -> Result<()> {
    init_tracing();

    let config = Config::load(&args.config_path)?;
    let state = AppState::new(config).await?;

    let shutdown = Arc::new(Notify::new());
    start_health_check_loop(&state, &shutdown);
    start_refill_loop(&state, &shutdown);
    start_admin_server(&state, &args.admin_listen);

    let listen = args
        .listen
        .unwrap_or_else(|| format!("0.0.0.0:{}", state.config.port));
    let listener = TcpListener::bind(&listen).await?;

    tracing::info!(
        listen = %listen,
        strategy = %state.config.strategy,
        backends = state.config.backends.len(),
        "server: starting load balancer"
    );

    let proxy_handle = tokio::spawn({
        let state = state.clone();
        let shutdown = shutdown.clone();
        async move { server::run_proxy_server(listener, state, shutdown).await }
    });

    wait_for_shutdown(&shutdown).await;

    // Wait for the proxy to finish draining.
    match proxy_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!("server: proxy error: {}", e),
        Err(e) => tracing::error!("server: proxy task error: {}", e),
    }

    tracing::info!("server: shutdown complete");
    Ok(())
}

fn init_tracing() {
    let (non_blocking, _guard) = tracing_appender::non_blocking::NonBlockingBuilder::default()
        .buffered_lines_limit(128_000)
        .lossy(true)
        .finish(std::io::stdout());

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(false)
                .json(),
        )
        .init();

    std::mem::forget(_guard);
}

fn start_health_check_loop(state: &AppState, shutdown: &Arc<Notify>) {
    let checker = HealthChecker::new(
        state.pool.all_backends(),
        Duration::from_secs(state.config.health_check.interval_secs),
        Duration::from_secs(state.config.health_check.timeout_secs),
    );
    let shutdown = shutdown.clone();
    tokio::spawn(checker.run(shutdown));
}

fn start_refill_loop(state: &AppState, shutdown: &Arc<Notify>) {
    let limiter = state.limiter.clone();
    let shutdown = shutdown.clone();
    tokio::spawn(limiter.run_refill(shutdown));
}

fn start_admin_server(state: &AppState, admin_listen: &str) {
    let state = state.clone();
    let admin_listen = admin_listen.to_string();
    tokio::spawn(async move {
        if let Err(e) = server::run_admin_server(&admin_listen, state).await {
            tracing::error!("server: admin failed, error={}", e);
        }
    });
}

async fn wait_for_shutdown(shutdown: &Arc<Notify>) {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("server: received SIGINT, shutting down"),
        _ = terminate => tracing::info!("server: received SIGTERM, shutting down"),
    }

    // Signal all background loops to stop.
    shutdown.notify_waiters();
}
