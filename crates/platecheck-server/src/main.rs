use anyhow::Context;
use platecheck_captcha::OcrChainSolver;
use platecheck_core::AppConfig;
use platecheck_scanner::{ClientRateLimiter, HttpSessionFactory, LookupOrchestrator, TokenBucket};
use platecheck_server::{app, init_tracing, load_dotenv, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_file = load_dotenv();
    init_tracing();

    info!("Starting platecheck v{}", env!("CARGO_PKG_VERSION"));
    match env_file {
        Some(path) => info!("Loaded environment from {}", path.display()),
        None => warn!(".env file not found, using process environment and defaults"),
    }

    let config = AppConfig::load_with_env().context("failed to load configuration")?;
    let limits = &config.rate_limit;

    let sessions = Arc::new(HttpSessionFactory::new(&config.site)?);
    let solver = Arc::new(OcrChainSolver::from_config(&config.ocr)?);
    let global_limiter = Arc::new(TokenBucket::new(
        limits.global_capacity,
        Duration::from_millis(limits.global_refill_ms),
    ));
    let orchestrator = LookupOrchestrator::from_config(sessions, solver, &config.lookup)?
        .with_rate_limiter(global_limiter);

    let client_limiter = Arc::new(ClientRateLimiter::from_config(limits));
    let _sweeper =
        client_limiter.spawn_sweeper(Duration::from_secs(limits.client_sweep_interval_secs));

    let state = AppState::new(Arc::new(orchestrator), client_limiter);

    let addr = format!("{}:{}", config.server.bind_address, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!("Listening on {addr}");
    info!(
        capacity = limits.global_capacity,
        refill_ms = limits.global_refill_ms,
        "Global rate limit"
    );
    info!(
        capacity = limits.client_capacity,
        refill_ms = limits.client_refill_ms,
        idle_ttl_secs = limits.client_idle_ttl_secs,
        max_clients = limits.max_tracked_clients,
        "Per-client rate limit"
    );

    axum::serve(
        listener,
        app(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
