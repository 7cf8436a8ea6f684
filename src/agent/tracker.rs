//! Bookkeeping for outbound connections opened by the request engine.
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::Serialize;

use crate::cancel::CancelHandle;

/// Opaque identity of one outbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionToken(u64);

impl ConnectionToken {
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ConnectionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Counter snapshot served on `GET /`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub established: u64,
    pub in_flight: u64,
    pub ended_ok: u64,
    pub errors_on_request: u64,
    pub errors_on_response: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Pending,
    Established { order: u64 },
}

struct Tracked<H> {
    phase: Phase,
    handle: H,
}

/// Pending and established connections plus cumulative outcome counters.
///
/// A connection leaves the map exactly once. Every transition checks that the
/// token is still present and in the expected phase, so a completion that
/// races with an abort is dropped instead of being counted twice.
pub struct ConnectionTracker<H> {
    connections: HashMap<ConnectionToken, Tracked<H>>,
    established_order: BTreeMap<u64, ConnectionToken>,
    next_order: u64,
    pending: u64,
    ended_ok: u64,
    errors_on_request: u64,
    errors_on_response: u64,
}

impl<H> Default for ConnectionTracker<H> {
    fn default() -> Self {
        Self {
            connections: HashMap::new(),
            established_order: BTreeMap::new(),
            next_order: 0,
            pending: 0,
            ended_ok: 0,
            errors_on_request: 0,
            errors_on_response: 0,
        }
    }
}

impl<H: CancelHandle> ConnectionTracker<H> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn contains(&self, token: ConnectionToken) -> bool {
        self.connections.contains_key(&token)
    }

    #[must_use]
    pub const fn in_flight(&self) -> u64 {
        self.pending
    }

    #[must_use]
    pub fn established(&self) -> u64 {
        u64::try_from(self.established_order.len()).unwrap_or(u64::MAX)
    }

    #[must_use]
    pub fn stats(&self) -> Stats {
        Stats {
            established: self.established(),
            in_flight: self.pending,
            ended_ok: self.ended_ok,
            errors_on_request: self.errors_on_request,
            errors_on_response: self.errors_on_response,
        }
    }

    /// Records a freshly sent request. Returns false if the token is taken.
    pub fn insert_pending(&mut self, token: ConnectionToken, handle: H) -> bool {
        if self.contains(token) {
            return false;
        }
        self.connections.insert(
            token,
            Tracked {
                phase: Phase::Pending,
                handle,
            },
        );
        self.pending = self.pending.saturating_add(1);
        true
    }

    /// Pending -> Established, on response headers.
    pub fn mark_established(&mut self, token: ConnectionToken) -> bool {
        let Some(entry) = self.connections.get_mut(&token) else {
            return false;
        };
        if entry.phase != Phase::Pending {
            return false;
        }
        let order = self.next_order;
        self.next_order = self.next_order.saturating_add(1);
        entry.phase = Phase::Established { order };
        self.established_order.insert(order, token);
        self.pending = self.pending.saturating_sub(1);
        true
    }

    /// Established -> Ended, on a cleanly finished body.
    pub fn complete(&mut self, token: ConnectionToken) -> bool {
        if self.remove_established(token).is_none() {
            return false;
        }
        self.ended_ok = self.ended_ok.saturating_add(1);
        true
    }

    /// Pending -> ErroredRequest, on a transport failure before headers.
    pub fn fail_request(&mut self, token: ConnectionToken) -> bool {
        let is_pending = self
            .connections
            .get(&token)
            .is_some_and(|entry| entry.phase == Phase::Pending);
        if !is_pending {
            return false;
        }
        self.connections.remove(&token);
        self.pending = self.pending.saturating_sub(1);
        self.errors_on_request = self.errors_on_request.saturating_add(1);
        true
    }

    /// Established -> ErroredResponse, on a stream failure after headers.
    pub fn fail_response(&mut self, token: ConnectionToken) -> bool {
        if self.remove_established(token).is_none() {
            return false;
        }
        self.errors_on_response = self.errors_on_response.saturating_add(1);
        true
    }

    /// Removes up to `count` established connections, oldest first.
    ///
    /// The caller owns cancelling the returned handles. Aborted connections
    /// are not counted as ended or errored.
    pub fn take_earliest_established(&mut self, count: u64) -> Vec<(ConnectionToken, H)> {
        let mut taken = Vec::new();
        while u64::try_from(taken.len()).unwrap_or(u64::MAX) < count {
            let Some((_, token)) = self.established_order.pop_first() else {
                break;
            };
            if let Some(entry) = self.connections.remove(&token) {
                taken.push((token, entry.handle));
            }
        }
        taken
    }

    /// Empties the tracker, returning every live handle.
    pub fn drain(&mut self) -> Vec<H> {
        self.established_order.clear();
        self.pending = 0;
        self.connections
            .drain()
            .map(|(_, entry)| entry.handle)
            .collect()
    }

    fn remove_established(&mut self, token: ConnectionToken) -> Option<H> {
        let order = match self.connections.get(&token)?.phase {
            Phase::Established { order } => order,
            Phase::Pending => return None,
        };
        self.established_order.remove(&order);
        self.connections.remove(&token).map(|entry| entry.handle)
    }
}
