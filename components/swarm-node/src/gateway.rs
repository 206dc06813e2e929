use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use corpus_swarm::gateway::{router, AppState};
use corpus_swarm::SwarmConfig;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::worker::start_local;

pub async fn run_gateway(config: Arc<SwarmConfig>, port: Option<u16>) -> Result<()> {
    let port = port.unwrap_or(config.server.listen_port);
    let addr: SocketAddr = format!("{}:{}", config.server.listen_address, port)
        .parse()
        .with_context(|| format!("invalid listen address '{}'", config.server.listen_address))?;

    let (executor, pool) = start_local(&config, CancellationToken::new());
    let app = router(Arc::new(AppState::new(config.clone(), executor)));

    info!(%addr, workers = pool.len(), "gateway listening");
    axum::Server::try_bind(&addr)
        .with_context(|| format!("failed to bind {}", addr))?
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server failed")?;

    pool.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c, serving until killed");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
