//! Mortise control-plane daemon.
//!
//! Demultiplexes agent telemetry to per-flow `FlowCtrl` workers and streams
//! back trade-off decisions.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use mortise_server::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    let level = mortise_server::config::log_level_from_env();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string())))
        .init();

    tracing::info!(
        inbound = %config.inbound_sock,
        outbound = %config.outbound_sock,
        app_type = ?config.app_type(),
        "mortise-server starting"
    );

    mortise_server::run(&config).await
}
