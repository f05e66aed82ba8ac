//! user-gateway server entry point.
//!
//! Loads configuration, initializes tracing, wires the gateway and serves
//! REST and WebSocket endpoints until Ctrl-C.

use tracing_subscriber::EnvFilter;

use user_gateway::config::GatewayConfig;
use user_gateway::server::Gateway;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = GatewayConfig::from_env()?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if config.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        addr = %config.listen_addr,
        environment = %config.environment,
        persistence = config.persistence_enabled,
        "starting user-gateway"
    );

    let gateway = Gateway::build(config).await?;
    gateway.serve().await?;

    Ok(())
}
