//! Startup configuration: socket paths, application type, and log level.
//!
//! Defaults match the original service's build-time constants; CLI flags
//! exist purely for local development and integration testing and never
//! change wire behaviour.

use clap::{Parser, ValueEnum};
use mortise_core::AppType;

/// Default inbound (agent → service) socket path.
pub const DEFAULT_INBOUND_SOCK: &str = "/tmp/mortise-py.sock";
/// Default outbound (service → agent) socket path.
pub const DEFAULT_OUTBOUND_SOCK: &str = "/tmp/mortise.sock";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AppTypeArg {
    File,
    Streaming,
}

impl From<AppTypeArg> for AppType {
    fn from(value: AppTypeArg) -> Self {
        match value {
            AppTypeArg::File => AppType::File,
            AppTypeArg::Streaming => AppType::Streaming,
        }
    }
}

/// Mortise control-plane daemon: demultiplexes agent telemetry reports to
/// per-flow `FlowCtrl` workers and streams back delta decisions.
#[derive(Debug, Clone, Parser)]
#[command(name = "mortise-server", version, about)]
pub struct Config {
    /// Local stream socket the agent connects to and streams reports on.
    #[arg(long, default_value = DEFAULT_INBOUND_SOCK)]
    pub inbound_sock: String,

    /// Local stream socket each flow worker connects out to, to push
    /// trade-off decisions back to the agent.
    #[arg(long, default_value = DEFAULT_OUTBOUND_SOCK)]
    pub outbound_sock: String,

    /// QoE model applied to every flow this process handles.
    #[arg(long, value_enum, default_value_t = AppTypeArg::Streaming)]
    pub app_type: AppTypeArg,
}

impl Config {
    pub fn app_type(&self) -> AppType {
        self.app_type.into()
    }
}

/// Resolves the tracing log level from `LOG_LEVEL`, defaulting to `INFO`
/// and falling back to it on an unparsable value.
pub fn log_level_from_env() -> tracing::Level {
    std::env::var("LOG_LEVEL")
        .ok()
        .and_then(|s| s.parse::<tracing::Level>().ok())
        .unwrap_or(tracing::Level::INFO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse_with_no_args() {
        let cfg = Config::parse_from(["mortise-server"]);
        assert_eq!(cfg.inbound_sock, DEFAULT_INBOUND_SOCK);
        assert_eq!(cfg.outbound_sock, DEFAULT_OUTBOUND_SOCK);
        assert_eq!(cfg.app_type(), AppType::Streaming);
    }

    #[test]
    fn app_type_flag_overrides_default() {
        let cfg = Config::parse_from(["mortise-server", "--app-type", "file"]);
        assert_eq!(cfg.app_type(), AppType::File);
    }

    #[test]
    fn log_level_falls_back_to_info_when_unset() {
        std::env::remove_var("LOG_LEVEL");
        assert_eq!(log_level_from_env(), tracing::Level::INFO);
    }

    #[test]
    fn log_level_falls_back_to_info_when_unparsable() {
        std::env::set_var("LOG_LEVEL", "not-a-level");
        assert_eq!(log_level_from_env(), tracing::Level::INFO);
        std::env::remove_var("LOG_LEVEL");
    }
}
