use clap::{Args, Parser, Subcommand};

use crate::agent::settings::{
    DEFAULT_CONCURRENCY_CAP, DEFAULT_CONTROL_PORT, DEFAULT_TARGET_COUNT, DEFAULT_TARGET_HOST,
    DEFAULT_TARGET_PATH, DEFAULT_TARGET_PORT,
};
use crate::agent::supervisor::DEFAULT_SERVICE_NAME;

use super::parsers::{parse_positive_u64, parse_stop_count};
use super::types::{PositiveU64, StopCount};

#[derive(Debug, Parser, Clone)]
#[clap(
    version,
    about = "Distributed HTTP load harness: run load agents, or provision, watch, and tune a fleet of them."
)]
pub struct LoadFleetArgs {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Path to config file (TOML/JSON). Defaults to ./loadfleet.toml or ./loadfleet.json
    #[arg(long, short = 'c', global = true)]
    pub config: Option<String>,

    /// Enable debug logging (overridden by LOADFLEET_LOG / RUST_LOG)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Disable colored log output
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run a load agent and its control plane
    Agent(AgentArgs),
    /// Add <count> instances (default 1), spread evenly across regions
    Start(StartArgs),
    /// Remove <count> instances (default 1). Accepts 'all'
    Stop(StopArgs),
    /// Top-like automatically updating status of instances
    Status(StatusArgs),
    /// Set a parameter to the given value on all current instances
    Set(SetArgs),
}

#[derive(Debug, Args, Clone)]
pub struct AgentArgs {
    /// Desired number of concurrently open requests
    #[arg(long = "target-count", short = 'n', default_value_t = DEFAULT_TARGET_COUNT)]
    pub target_count: u64,

    /// Max requests waiting for response headers at once
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY_CAP)]
    pub concurrency: u64,

    /// Target host
    #[arg(long, default_value = DEFAULT_TARGET_HOST)]
    pub host: String,

    /// Target port
    #[arg(long, default_value_t = DEFAULT_TARGET_PORT)]
    pub port: u16,

    /// Target path
    #[arg(long, default_value = DEFAULT_TARGET_PATH)]
    pub path: String,

    /// Port the control plane listens on
    #[arg(
        long = "control-port",
        env = "LOADFLEET_CONTROL_PORT",
        default_value_t = DEFAULT_CONTROL_PORT
    )]
    pub control_port: u16,

    /// Address the control plane binds to
    #[arg(long = "control-bind", default_value = "0.0.0.0")]
    pub control_bind: String,

    /// Reconciliation period in milliseconds
    #[arg(long = "tick-ms", default_value = "100", value_parser = parse_positive_u64)]
    pub tick_ms: PositiveU64,

    /// Stats log period in milliseconds
    #[arg(long = "stats-log-ms", default_value = "1000", value_parser = parse_positive_u64)]
    pub stats_log_ms: PositiveU64,

    /// systemd unit restarted on GET /restart
    #[arg(long = "service-name", default_value = DEFAULT_SERVICE_NAME)]
    pub service_name: String,

    /// Reject /set keys that are not known config fields
    #[arg(long = "strict-config")]
    pub strict_config: bool,
}

#[derive(Debug, Args, Clone)]
pub struct StartArgs {
    /// Number of instances to add
    #[arg(default_value_t = 1)]
    pub count: usize,

    /// Only start in this region
    pub region: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct StopArgs {
    /// Number of instances to remove, or 'all'
    #[arg(default_value = "1", value_parser = parse_stop_count)]
    pub count: StopCount,

    /// Only stop in this region
    pub region: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct StatusArgs {
    /// Only show this region
    pub region: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct SetArgs {
    /// Parameter name (e.g. n, concurrency, host, restart)
    pub param: String,

    /// Parameter value
    pub value: String,
}
