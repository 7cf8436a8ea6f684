use tokio::sync::broadcast;
use tracing::info;

use crate::shutdown::{ShutdownReceiver, ShutdownSender};

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// One slot is enough: every subscriber only cares that shutdown happened.
const SHUTDOWN_CHANNEL_CAPACITY: usize = 1;

/// What ended the process's main loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownCause {
    Interrupt,
    Terminate,
    /// Someone else sent on the shutdown channel (engine exit, tests).
    Requested,
}

impl ShutdownCause {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Interrupt => "SIGINT",
            Self::Terminate => "SIGTERM",
            Self::Requested => "shutdown request",
        }
    }
}

#[must_use]
pub fn shutdown_channel() -> (ShutdownSender, ShutdownReceiver) {
    broadcast::channel::<()>(SHUTDOWN_CHANNEL_CAPACITY)
}

/// Turns SIGINT/SIGTERM into a broadcast on `shutdown_tx`.
///
/// The task resolves with the cause once shutdown starts, whichever side
/// triggered it.
pub fn setup_signal_shutdown_handler(
    shutdown_tx: &ShutdownSender,
) -> tokio::task::JoinHandle<ShutdownCause> {
    let shutdown_tx = shutdown_tx.clone();
    let mut shutdown_rx = shutdown_tx.subscribe();
    tokio::spawn(async move {
        let cause = tokio::select! {
            _ = shutdown_rx.recv() => ShutdownCause::Requested,
            _ = tokio::signal::ctrl_c() => ShutdownCause::Interrupt,
            () = terminate_signal() => ShutdownCause::Terminate,
        };
        if cause != ShutdownCause::Requested {
            info!("Received {}, shutting down", cause.as_str());
            drop(shutdown_tx.send(()));
        }
        cause
    })
}

#[cfg(unix)]
async fn terminate_signal() {
    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            term.recv().await;
        }
        Err(err) => {
            tracing::warn!("Failed to register SIGTERM handler: {}", err);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate_signal() {
    std::future::pending::<()>().await;
}
