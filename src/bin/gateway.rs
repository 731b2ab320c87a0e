use anyhow::{Context, Result};

use authgate::config::GatewayConfig;
use authgate::gateway::build_gateway;
use authgate::logging::setup_logging;

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();
    tracing::info!("Starting authgate gateway...");

    let config = GatewayConfig::from_env()?;
    let app = build_gateway(&config)?;

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("Gateway listening on http://{addr}");
    axum::serve(listener, app).await?;

    Ok(())
}
