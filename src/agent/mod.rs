//! Load agent: request engine plus its HTTP control plane.
pub mod connector;
pub mod control;
pub mod engine;
pub mod http;
pub mod settings;
pub mod supervisor;
pub mod tracker;

#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::info;

use crate::args::AgentArgs;
use crate::error::{AgentError, AppError, AppResult};
use crate::system::shutdown_handlers::{setup_signal_shutdown_handler, shutdown_channel};

use connector::HttpConnector;
use control::serve_control;
use engine::{EngineTiming, RequestEngine, run_engine};
use settings::{LoadConfig, UnknownFieldPolicy};
use supervisor::SystemctlSupervisor;

impl From<&AgentArgs> for LoadConfig {
    fn from(args: &AgentArgs) -> Self {
        Self {
            target_count: args.target_count,
            concurrency_cap: args.concurrency,
            target_host: args.host.clone(),
            target_port: args.port,
            target_path: args.path.clone(),
            control_port: args.control_port,
            ..LoadConfig::default()
        }
    }
}

/// Runs the agent until SIGINT/SIGTERM.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be built or the control port
/// cannot be bound.
pub async fn run_agent(args: AgentArgs) -> AppResult<()> {
    let config = LoadConfig::from(&args);
    let connector = HttpConnector::new().map_err(AppError::agent)?;

    let control_addr = format!("{}:{}", args.control_bind, args.control_port);
    let listener = TcpListener::bind(&control_addr).await.map_err(|err| {
        AppError::agent(AgentError::Bind {
            addr: control_addr.clone(),
            source: err,
        })
    })?;

    info!(
        "==== Agent started ==== Time: {}",
        chrono::Utc::now().to_rfc3339()
    );
    info!(
        "Control plane on {}, target http://{}:{}{} (n={}, concurrency={})",
        control_addr,
        config.target_host,
        config.target_port,
        config.target_path,
        config.target_count,
        config.concurrency_cap
    );

    let (shutdown_tx, _) = shutdown_channel();
    let signal_handle = setup_signal_shutdown_handler(&shutdown_tx);

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (control_tx, control_rx) = mpsc::unbounded_channel();
    let policy = if args.strict_config {
        UnknownFieldPolicy::Reject
    } else {
        UnknownFieldPolicy::Store
    };
    let engine = RequestEngine::new(config, connector, events_tx, policy);
    let timing = EngineTiming {
        tick: Duration::from_millis(args.tick_ms.get()),
        stats_log: Duration::from_millis(args.stats_log_ms.get()),
    };

    let engine_handle = tokio::spawn(run_engine(
        engine,
        events_rx,
        control_rx,
        timing,
        shutdown_tx.clone(),
    ));
    let server_handle = tokio::spawn(serve_control(
        listener,
        control_tx,
        Arc::new(SystemctlSupervisor::new(args.service_name)),
        shutdown_tx.clone(),
    ));

    engine_handle.await?;
    drop(shutdown_tx.send(()));
    server_handle.await?;
    signal_handle.abort();
    info!("Agent stopped");
    Ok(())
}
