use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use url::Url;

use crate::cancel::CancelHandle;
use crate::error::{AgentError, AppError, AppResult};
use crate::system::shutdown_handlers::shutdown_channel;

use super::control::handle_control_connection;
use super::engine::{
    ConnectionEvent, ConnectionEventKind, Connector, EngineTiming, EventSender, RequestEngine,
    run_engine,
};
use super::settings::{LoadConfig, UnknownFieldPolicy};
use super::supervisor::Supervisor;
use super::tracker::ConnectionToken;

type TokenLog = Arc<Mutex<Vec<ConnectionToken>>>;

struct FakeHandle {
    token: ConnectionToken,
    cancelled: TokenLog,
}

impl CancelHandle for FakeHandle {
    fn cancel(&self) {
        if let Ok(mut cancelled) = self.cancelled.lock() {
            cancelled.push(self.token);
        }
    }
}

#[derive(Clone, Default)]
struct FakeConnector {
    opened: TokenLog,
    cancelled: TokenLog,
}

impl Connector for FakeConnector {
    type Handle = FakeHandle;

    fn open(&self, token: ConnectionToken, _target: &Url, _events: &EventSender) -> FakeHandle {
        if let Ok(mut opened) = self.opened.lock() {
            opened.push(token);
        }
        FakeHandle {
            token,
            cancelled: Arc::clone(&self.cancelled),
        }
    }
}

fn snapshot(log: &TokenLog) -> AppResult<Vec<ConnectionToken>> {
    log.lock()
        .map(|tokens| tokens.clone())
        .map_err(|_| AppError::agent("Token log poisoned"))
}

fn engine_with(
    target_count: u64,
    concurrency_cap: u64,
) -> (RequestEngine<FakeConnector>, FakeConnector) {
    let connector = FakeConnector::default();
    let (events_tx, _events_rx) = mpsc::unbounded_channel();
    let config = LoadConfig {
        target_count,
        concurrency_cap,
        ..LoadConfig::default()
    };
    let engine = RequestEngine::new(
        config,
        connector.clone(),
        events_tx,
        UnknownFieldPolicy::Store,
    );
    (engine, connector)
}

fn establish_all(engine: &mut RequestEngine<FakeConnector>, tokens: &[ConnectionToken]) {
    for token in tokens {
        engine.handle_event(ConnectionEvent::new(
            *token,
            ConnectionEventKind::ResponseHeaders,
        ));
    }
}

fn writes(items: &[(&str, &str)]) -> Vec<(String, String)> {
    items
        .iter()
        .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
        .collect()
}

#[test]
fn zero_target_opens_nothing() -> AppResult<()> {
    let (mut engine, connector) = engine_with(0, 100);
    let report = engine.tick();
    if report.opened != 0 || !report.aborted.is_empty() {
        return Err(AppError::agent(format!("Unexpected report: {:?}", report)));
    }
    if !snapshot(&connector.opened)?.is_empty() {
        return Err(AppError::agent("Connector was asked to open a request"));
    }
    let stats = engine.stats();
    if stats.established != 0 || stats.in_flight != 0 {
        return Err(AppError::agent(format!("Unexpected stats: {:?}", stats)));
    }
    Ok(())
}

#[test]
fn headers_move_requests_to_established() -> AppResult<()> {
    let (mut engine, connector) = engine_with(5, 100);
    let report = engine.tick();
    if report.opened != 5 {
        return Err(AppError::agent(format!("Expected 5 opened, got {}", report.opened)));
    }
    establish_all(&mut engine, &snapshot(&connector.opened)?);

    let stats = engine.stats();
    if stats.established != 5 || stats.in_flight != 0 || stats.ended_ok != 0 {
        return Err(AppError::agent(format!("Unexpected stats: {:?}", stats)));
    }
    if engine.tick().opened != 0 {
        return Err(AppError::agent("Target already met, nothing should open"));
    }
    Ok(())
}

#[test]
fn lowering_target_aborts_earliest_established() -> AppResult<()> {
    let (mut engine, connector) = engine_with(10, 100);
    engine.tick();
    let opened = snapshot(&connector.opened)?;
    establish_all(&mut engine, &opened);

    engine.apply_writes(writes(&[("n", "3")]))?;
    let report = engine.tick();

    let expected: Vec<ConnectionToken> = opened.iter().take(7).copied().collect();
    if report.aborted != expected {
        return Err(AppError::agent(format!(
            "Expected the 7 earliest to be aborted, got {:?}",
            report.aborted
        )));
    }
    if snapshot(&connector.cancelled)? != expected {
        return Err(AppError::agent("Cancel handles did not fire for aborted tokens"));
    }
    let stats = engine.stats();
    if stats.established != 3 {
        return Err(AppError::agent(format!("Expected 3 established, got {:?}", stats)));
    }
    Ok(())
}

#[test]
fn concurrency_cap_limits_pending_requests() -> AppResult<()> {
    let (mut engine, connector) = engine_with(10, 3);
    if engine.tick().opened != 3 {
        return Err(AppError::agent("First tick should fill the cap"));
    }
    if engine.tick().opened != 0 {
        return Err(AppError::agent("Cap is saturated, nothing should open"));
    }

    let opened = snapshot(&connector.opened)?;
    establish_all(&mut engine, opened.get(..2).unwrap_or_default());
    let report = engine.tick();
    if report.opened != 2 {
        return Err(AppError::agent(format!(
            "Expected 2 new requests after 2 established, got {}",
            report.opened
        )));
    }
    if engine.stats().in_flight > 3 {
        return Err(AppError::agent("In-flight count exceeded the cap"));
    }
    Ok(())
}

#[test]
fn late_events_for_aborted_connections_are_ignored() -> AppResult<()> {
    let (mut engine, connector) = engine_with(2, 100);
    engine.tick();
    let opened = snapshot(&connector.opened)?;
    establish_all(&mut engine, &opened);

    engine.apply_writes(writes(&[("n", "0")]))?;
    engine.tick();

    let Some(first) = opened.first().copied() else {
        return Err(AppError::agent("No connection was opened"));
    };
    if engine.handle_event(ConnectionEvent::new(first, ConnectionEventKind::Completed)) {
        return Err(AppError::agent("Completion for an aborted token was applied"));
    }
    let stats = engine.stats();
    if stats.ended_ok != 0 || stats.established != 0 {
        return Err(AppError::agent(format!("Unexpected stats: {:?}", stats)));
    }
    Ok(())
}

#[test]
fn failures_are_counted_by_phase() -> AppResult<()> {
    let (mut engine, connector) = engine_with(2, 100);
    engine.tick();
    let opened = snapshot(&connector.opened)?;
    let (Some(first), Some(second)) = (opened.first().copied(), opened.get(1).copied()) else {
        return Err(AppError::agent("Expected two opened connections"));
    };

    engine.handle_event(ConnectionEvent::new(first, ConnectionEventKind::RequestFailed));
    engine.handle_event(ConnectionEvent::new(second, ConnectionEventKind::ResponseHeaders));
    engine.handle_event(ConnectionEvent::new(second, ConnectionEventKind::ResponseFailed));

    let stats = engine.stats();
    if stats.errors_on_request != 1 || stats.errors_on_response != 1 || stats.established != 0 {
        return Err(AppError::agent(format!("Unexpected stats: {:?}", stats)));
    }
    Ok(())
}

#[test]
fn shutdown_cancels_everything() -> AppResult<()> {
    let (mut engine, connector) = engine_with(4, 2);
    engine.tick();
    let opened = snapshot(&connector.opened)?;
    establish_all(&mut engine, &opened);
    engine.tick();

    let cancelled = engine.shutdown();
    if cancelled != 4 {
        return Err(AppError::agent(format!("Expected 4 cancelled, got {}", cancelled)));
    }
    if snapshot(&connector.cancelled)?.len() != 4 {
        return Err(AppError::agent("Not every handle was cancelled"));
    }
    Ok(())
}

#[derive(Default)]
struct CountingSupervisor {
    restarts: Mutex<u32>,
}

impl Supervisor for CountingSupervisor {
    fn request_restart(&self) -> Result<(), AgentError> {
        let mut restarts = self
            .restarts
            .lock()
            .map_err(|_| AgentError::from("Restart counter poisoned"))?;
        *restarts = restarts.saturating_add(1);
        Ok(())
    }
}

fn run_async_test<F>(future: F) -> AppResult<()>
where
    F: Future<Output = AppResult<()>>,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::agent(format!("Failed to build runtime: {}", err)))?;
    runtime.block_on(future)
}

async fn exchange(
    request: &str,
    control_tx: &super::engine::ControlSender,
    supervisor: &dyn Supervisor,
) -> AppResult<String> {
    let (mut client, server) = tokio::io::duplex(16 * 1024);
    client.write_all(request.as_bytes()).await?;
    handle_control_connection(server, control_tx, supervisor).await;
    let mut response = String::new();
    client.read_to_string(&mut response).await?;
    Ok(response)
}

#[test]
fn control_plane_round_trip() -> AppResult<()> {
    run_async_test(async {
        let connector = FakeConnector::default();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let engine = RequestEngine::new(
            LoadConfig::default(),
            connector.clone(),
            events_tx,
            UnknownFieldPolicy::Store,
        );
        let (shutdown_tx, _) = shutdown_channel();
        let timing = EngineTiming {
            tick: Duration::from_millis(5),
            stats_log: Duration::from_secs(60),
        };
        let engine_task = tokio::spawn(run_engine(
            engine,
            events_rx,
            control_rx,
            timing,
            shutdown_tx.clone(),
        ));
        let supervisor = CountingSupervisor::default();

        let set = exchange(
            "GET /set?n=2&label=blue HTTP/1.1\r\nHost: agent\r\n\r\n",
            &control_tx,
            &supervisor,
        )
        .await?;
        if !set.starts_with("HTTP/1.1 200") || !set.contains("\"n\":2") {
            return Err(AppError::agent(format!("Unexpected /set response: {}", set)));
        }
        if !set.contains("\"label\":\"blue\"") {
            return Err(AppError::agent(format!("Unknown key missing: {}", set)));
        }

        let bad = exchange("GET /set?n=abc HTTP/1.1\r\n\r\n", &control_tx, &supervisor).await?;
        if !bad.starts_with("HTTP/1.1 400") {
            return Err(AppError::agent(format!("Expected 400, got {}", bad)));
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
        let stats = exchange("GET / HTTP/1.1\r\n\r\n", &control_tx, &supervisor).await?;
        if !stats.starts_with("HTTP/1.1 200") || !stats.contains("\"inFlight\":2") {
            return Err(AppError::agent(format!("Unexpected stats response: {}", stats)));
        }

        let missing = exchange("GET /nope HTTP/1.1\r\n\r\n", &control_tx, &supervisor).await?;
        if !missing.starts_with("HTTP/1.1 404") {
            return Err(AppError::agent(format!("Expected 404, got {}", missing)));
        }
        let post = exchange("POST / HTTP/1.1\r\n\r\n", &control_tx, &supervisor).await?;
        if !post.starts_with("HTTP/1.1 404") {
            return Err(AppError::agent(format!("Expected 404 for POST, got {}", post)));
        }

        let restart = exchange("GET /restart HTTP/1.1\r\n\r\n", &control_tx, &supervisor).await?;
        if !restart.ends_with("OK\n") {
            return Err(AppError::agent(format!("Unexpected restart reply: {}", restart)));
        }
        let restarts = supervisor
            .restarts
            .lock()
            .map(|count| *count)
            .map_err(|_| AppError::agent("Restart counter poisoned"))?;
        if restarts != 1 {
            return Err(AppError::agent(format!("Expected one restart, got {}", restarts)));
        }

        drop(shutdown_tx.send(()));
        engine_task.await?;
        if snapshot(&connector.cancelled)?.len() != 2 {
            return Err(AppError::agent("Shutdown did not cancel pending requests"));
        }
        Ok(())
    })
}

#[test]
fn control_plane_reports_missing_engine() -> AppResult<()> {
    run_async_test(async {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        drop(control_rx);
        let supervisor = CountingSupervisor::default();
        let response = exchange("GET / HTTP/1.1\r\n\r\n", &control_tx, &supervisor).await?;
        if !response.starts_with("HTTP/1.1 503") {
            return Err(AppError::agent(format!("Expected 503, got {}", response)));
        }
        Ok(())
    })
}
