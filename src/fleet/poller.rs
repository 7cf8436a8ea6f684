//! Per-instance status polling.
//!
//! Every instance with an address gets a [`PollState`]. A poll is issued once
//! the previous request is older than the staleness threshold; an outstanding
//! request for the same instance is cancelled first, so at most one poll per
//! instance is ever in flight. When the fan-out cap binds, instances that
//! have waited longest get the free slots. Completions carry the generation they were
//! issued under and are dropped when that generation is no longer current.
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::debug;

use crate::cancel::CancelHandle;

use super::instance::{InstanceRecord, RegionInstances};

pub const STALE_THRESHOLD: Duration = Duration::from_millis(2000);

/// Latest observation of one agent.
#[derive(Debug, Clone, PartialEq)]
pub struct PollState {
    /// `None` until the first poll goes out, which makes it due immediately.
    pub last_request: Option<Instant>,
    pub last_success: Instant,
    pub last_result: Option<Value>,
    pub last_error: Option<String>,
}

impl PollState {
    #[must_use]
    pub const fn new(now: Instant) -> Self {
        Self {
            last_request: None,
            last_success: now,
            last_result: None,
            last_error: None,
        }
    }

    fn is_due(&self, now: Instant, stale_after: Duration) -> bool {
        self.last_request
            .is_none_or(|sent| now.saturating_duration_since(sent) > stale_after)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollTicket {
    pub instance_id: String,
    pub generation: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Success(Value),
    /// Short error code shown next to the instance.
    Failure(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PollCompletion {
    pub ticket: PollTicket,
    pub outcome: PollOutcome,
}

/// Sends one status request and eventually reports a [`PollCompletion`]
/// for `ticket`.
pub trait PollDispatcher {
    type Handle: CancelHandle;

    fn dispatch(&self, ticket: PollTicket, address: &str) -> Self::Handle;
}

struct Outstanding<H> {
    generation: u64,
    handle: H,
}

/// What one `poll_due` pass did.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PollReport {
    pub issued: Vec<String>,
    /// Prior polls cancelled to make room for a fresh one.
    pub superseded: Vec<String>,
    /// Due polls held back by the fan-out cap.
    pub deferred: usize,
}

pub struct FleetPoller<D: PollDispatcher> {
    dispatcher: D,
    states: HashMap<String, PollState>,
    outstanding: HashMap<String, Outstanding<D::Handle>>,
    next_generation: u64,
    stale_after: Duration,
    fan_out_cap: usize,
}

impl<D: PollDispatcher> FleetPoller<D> {
    pub fn new(dispatcher: D, stale_after: Duration, fan_out_cap: usize) -> Self {
        Self {
            dispatcher,
            states: HashMap::new(),
            outstanding: HashMap::new(),
            next_generation: 0,
            stale_after,
            fan_out_cap,
        }
    }

    /// Read-only view for rendering.
    pub const fn states(&self) -> &HashMap<String, PollState> {
        &self.states
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }

    /// Creates state for newly seen instances and forgets (cancelling any
    /// outstanding poll) those that are no longer listed.
    pub fn observe(&mut self, view: &[RegionInstances], now: Instant) {
        let mut listed = HashSet::new();
        for instance in view.iter().flat_map(|region| region.instances.iter()) {
            if !instance.has_address() {
                continue;
            }
            listed.insert(instance.instance_id.as_str());
            self.states
                .entry(instance.instance_id.clone())
                .or_insert_with(|| PollState::new(now));
        }

        self.states.retain(|id, _| listed.contains(id.as_str()));
        let outstanding = &mut self.outstanding;
        outstanding.retain(|id, poll| {
            let keep = listed.contains(id.as_str());
            if !keep {
                debug!("Dropping poll for vanished instance {}", id);
                poll.handle.cancel();
            }
            keep
        });
    }

    /// Issues a poll for every due instance, respecting the fan-out cap.
    ///
    /// Due polls still outstanding are cancelled before any slot is handed
    /// out. Slots then go to never-polled instances first and afterwards to
    /// whoever has waited longest, so hung instances cannot hold the cap
    /// against the rest of the fleet.
    pub fn poll_due(&mut self, view: &[RegionInstances], now: Instant) -> PollReport {
        let mut report = PollReport::default();
        let mut due: Vec<(Option<Instant>, &InstanceRecord)> = view
            .iter()
            .flat_map(|region| region.instances.iter())
            .filter_map(|instance| {
                let state = self.states.get(&instance.instance_id)?;
                state
                    .is_due(now, self.stale_after)
                    .then_some((state.last_request, instance))
            })
            .collect();
        // Stable: ties keep listing order.
        due.sort_by_key(|(last_request, _)| *last_request);

        for (_, instance) in &due {
            if let Some(prior) = self.outstanding.remove(&instance.instance_id) {
                prior.handle.cancel();
                report.superseded.push(instance.instance_id.clone());
            }
        }

        for (_, instance) in due {
            if self.outstanding.len() >= self.fan_out_cap {
                report.deferred = report.deferred.saturating_add(1);
                continue;
            }
            let Some(state) = self.states.get_mut(&instance.instance_id) else {
                continue;
            };

            let generation = self.next_generation;
            self.next_generation = self.next_generation.wrapping_add(1);
            let ticket = PollTicket {
                instance_id: instance.instance_id.clone(),
                generation,
            };
            let handle = self.dispatcher.dispatch(ticket, &instance.address);
            state.last_request = Some(now);
            self.outstanding.insert(
                instance.instance_id.clone(),
                Outstanding { generation, handle },
            );
            report.issued.push(instance.instance_id.clone());
        }
        report
    }

    /// Applies a finished poll. Returns false for completions whose
    /// generation has been superseded or whose instance is gone.
    pub fn complete(&mut self, completion: PollCompletion, now: Instant) -> bool {
        let ticket = completion.ticket;
        let current = self
            .outstanding
            .get(&ticket.instance_id)
            .is_some_and(|poll| poll.generation == ticket.generation);
        if !current {
            debug!(
                "Ignoring stale poll result for {} (generation {})",
                ticket.instance_id, ticket.generation
            );
            return false;
        }
        self.outstanding.remove(&ticket.instance_id);

        let Some(state) = self.states.get_mut(&ticket.instance_id) else {
            return false;
        };
        match completion.outcome {
            PollOutcome::Success(result) => {
                state.last_success = now;
                state.last_result = Some(result);
                state.last_error = None;
            }
            PollOutcome::Failure(code) => {
                state.last_error = Some(code);
            }
        }
        true
    }

    /// Cancels every outstanding poll.
    pub fn shutdown(&mut self) -> usize {
        let cancelled = self.outstanding.len();
        for (_, poll) in self.outstanding.drain() {
            poll.handle.cancel();
        }
        cancelled
    }
}
