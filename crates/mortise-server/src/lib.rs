//! # mortise-server
//!
//! The control-plane daemon: a stream-socket demultiplexer that routes
//! agent telemetry to per-flow [`mortise_core::FlowCtrl`] workers and
//! streams delta decisions back out.
//!
//! ## Crate structure
//!
//! - [`config`] — CLI configuration (socket paths, app type, log level)
//! - [`framing`] — shared length-prefixed frame I/O
//! - [`flow_table`] — the concurrent flow id → worker handle map
//! - [`worker`] — the per-flow actor owning one `FlowCtrl`
//! - [`demux`] — the inbound listener and its per-connection frame dispatch

pub mod config;
pub mod demux;
pub mod flow_table;
pub mod framing;
pub mod worker;

pub use config::Config;
pub use flow_table::FlowTable;

/// Runs the server until the listener errors; binds the inbound socket and
/// drives [`demux::serve`] to completion.
pub async fn run(config: &Config) -> anyhow::Result<()> {
    let table = FlowTable::new();
    demux::serve(&config.inbound_sock, &config.outbound_sock, config.app_type(), table).await?;
    Ok(())
}
