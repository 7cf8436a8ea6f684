//! Admission-controlled request engine.
//!
//! The engine is owned by exactly one task. Ticks, connection events, and
//! control commands are all applied from that task, which is what keeps the
//! tracker and the live config free of locks.
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};
use url::Url;

use crate::cancel::CancelHandle;
use crate::error::AgentError;
use crate::shutdown::ShutdownSender;

use super::settings::{LoadConfig, UnknownFieldPolicy};
use super::tracker::{ConnectionToken, ConnectionTracker, Stats};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEventKind {
    ResponseHeaders,
    Completed,
    RequestFailed,
    ResponseFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionEvent {
    pub token: ConnectionToken,
    pub kind: ConnectionEventKind,
}

impl ConnectionEvent {
    #[must_use]
    pub const fn new(token: ConnectionToken, kind: ConnectionEventKind) -> Self {
        Self { token, kind }
    }
}

pub type EventSender = mpsc::UnboundedSender<ConnectionEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<ConnectionEvent>;

/// Opens one outbound request and reports its lifecycle on `events`.
pub trait Connector {
    type Handle: CancelHandle;

    fn open(&self, token: ConnectionToken, target: &Url, events: &EventSender) -> Self::Handle;
}

/// What a single reconciliation pass did.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub opened: u64,
    pub aborted: Vec<ConnectionToken>,
}

pub enum ControlCommand {
    Stats {
        respond_to: oneshot::Sender<Stats>,
    },
    Set {
        writes: Vec<(String, String)>,
        respond_to: oneshot::Sender<Result<LoadConfig, AgentError>>,
    },
}

pub type ControlSender = mpsc::UnboundedSender<ControlCommand>;
pub type ControlReceiver = mpsc::UnboundedReceiver<ControlCommand>;

pub struct RequestEngine<C: Connector> {
    config: LoadConfig,
    tracker: ConnectionTracker<C::Handle>,
    connector: C,
    events_tx: EventSender,
    unknown_policy: UnknownFieldPolicy,
}

impl<C: Connector> RequestEngine<C> {
    pub fn new(
        config: LoadConfig,
        connector: C,
        events_tx: EventSender,
        unknown_policy: UnknownFieldPolicy,
    ) -> Self {
        Self {
            config,
            tracker: ConnectionTracker::new(),
            connector,
            events_tx,
            unknown_policy,
        }
    }

    pub const fn config(&self) -> &LoadConfig {
        &self.config
    }

    pub fn stats(&self) -> Stats {
        self.tracker.stats()
    }

    /// One reconciliation pass: grow toward the target without exceeding the
    /// pending budget, then trim the oldest established connections.
    pub fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();
        let target = self.config.target_count;
        let cap = self.config.concurrency_cap;

        let wants_growth = target > self.outstanding() && self.tracker.in_flight() < cap;
        if wants_growth {
            match self.config.target_url() {
                Ok(url) => {
                    while target > self.outstanding() && self.tracker.in_flight() < cap {
                        let token = self.fresh_token();
                        let handle = self.connector.open(token, &url, &self.events_tx);
                        self.tracker.insert_pending(token, handle);
                        report.opened = report.opened.saturating_add(1);
                    }
                }
                Err(err) => warn!("Not opening connections: {}", err),
            }
        }

        let excess = self.tracker.established().saturating_sub(target);
        if excess > 0 {
            for (token, handle) in self.tracker.take_earliest_established(excess) {
                handle.cancel();
                report.aborted.push(token);
            }
        }

        report
    }

    /// Applies a connection lifecycle event. Returns false when the event was
    /// stale (token already gone or in another phase).
    pub fn handle_event(&mut self, event: ConnectionEvent) -> bool {
        let applied = match event.kind {
            ConnectionEventKind::ResponseHeaders => self.tracker.mark_established(event.token),
            ConnectionEventKind::Completed => self.tracker.complete(event.token),
            ConnectionEventKind::RequestFailed => self.tracker.fail_request(event.token),
            ConnectionEventKind::ResponseFailed => self.tracker.fail_response(event.token),
        };
        if !applied {
            debug!("Ignoring {:?} for untracked connection {}", event.kind, event.token);
        }
        applied
    }

    /// Applies a control-plane write batch and returns the resulting config.
    ///
    /// # Errors
    ///
    /// Returns an error when a value does not fit its field or an unknown key
    /// is rejected; the config is left untouched in that case.
    pub fn apply_writes(&mut self, writes: Vec<(String, String)>) -> Result<LoadConfig, AgentError> {
        let outcome = self.config.apply_writes(writes, self.unknown_policy)?;
        if !outcome.unregistered.is_empty() {
            warn!(
                "Stored unregistered config keys as strings: {}",
                outcome.unregistered.join(", ")
            );
        }
        info!(
            "Config updated: n={} concurrency={} target={}:{}{}",
            self.config.target_count,
            self.config.concurrency_cap,
            self.config.target_host,
            self.config.target_port,
            self.config.target_path
        );
        Ok(self.config.clone())
    }

    pub fn handle_command(&mut self, command: ControlCommand) {
        match command {
            ControlCommand::Stats { respond_to } => {
                drop(respond_to.send(self.stats()));
            }
            ControlCommand::Set { writes, respond_to } => {
                drop(respond_to.send(self.apply_writes(writes)));
            }
        }
    }

    /// Cancels every tracked connection. Returns how many were cancelled.
    pub fn shutdown(&mut self) -> usize {
        let handles = self.tracker.drain();
        for handle in &handles {
            handle.cancel();
        }
        handles.len()
    }

    fn outstanding(&self) -> u64 {
        self.tracker
            .established()
            .saturating_add(self.tracker.in_flight())
    }

    fn fresh_token(&self) -> ConnectionToken {
        loop {
            let token = ConnectionToken::from_raw(rand::random::<u64>());
            if !self.tracker.contains(token) {
                return token;
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EngineTiming {
    pub tick: Duration,
    pub stats_log: Duration,
}

/// Drives the engine until shutdown.
pub async fn run_engine<C>(
    mut engine: RequestEngine<C>,
    mut events_rx: EventReceiver,
    mut control_rx: ControlReceiver,
    timing: EngineTiming,
    shutdown_tx: ShutdownSender,
) where
    C: Connector + Send + 'static,
    C::Handle: Send + 'static,
{
    let mut shutdown_rx = shutdown_tx.subscribe();
    let mut tick_interval = interval(timing.tick);
    tick_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut stats_interval = interval(timing.stats_log);
    stats_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = tick_interval.tick() => {
                let report = engine.tick();
                if report.opened > 0 || !report.aborted.is_empty() {
                    debug!(
                        "Tick opened {} aborted {} (established={}, in_flight={})",
                        report.opened,
                        report.aborted.len(),
                        engine.tracker.established(),
                        engine.tracker.in_flight()
                    );
                }
            }
            Some(event) = events_rx.recv() => {
                engine.handle_event(event);
            }
            Some(command) = control_rx.recv() => {
                engine.handle_command(command);
            }
            _ = stats_interval.tick() => {
                match serde_json::to_string(&engine.stats()) {
                    Ok(line) => info!("{}", line),
                    Err(err) => warn!("Failed to encode stats: {}", err),
                }
            }
        }
    }

    let cancelled = engine.shutdown();
    info!("Engine stopped, cancelled {} connections", cancelled);
}
