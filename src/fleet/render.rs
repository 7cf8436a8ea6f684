//! Text projection of the fleet for the `status` screen.
use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde_json::Value;

use super::instance::{InstanceRecord, RegionInstances};
use super::poller::PollState;

pub const UNKNOWN_STATUS: &str = "Unknown";

/// Renders every region and instance. Reads `states` only; never triggers a
/// poll.
#[must_use]
pub fn render_fleet(
    view: &[RegionInstances],
    states: &HashMap<String, PollState>,
    now: Instant,
) -> String {
    let mut out = String::new();
    for region in view {
        out.push_str(&region.region);
        out.push_str(": \n");
        for instance in &region.instances {
            out.push_str("  ");
            out.push_str(&render_instance(instance, states.get(&instance.instance_id), now));
            out.push('\n');
        }
    }
    out
}

/// One line: `id[state]: (since-success/since-request) payload [error]`.
#[must_use]
pub fn render_instance(instance: &InstanceRecord, state: Option<&PollState>, now: Instant) -> String {
    let message = state.map_or_else(
        || UNKNOWN_STATUS.to_owned(),
        |state| render_state(state, now),
    );
    format!("{}[{}]: {}", instance.instance_id, instance.state, message)
}

fn render_state(state: &PollState, now: Instant) -> String {
    let since_success = tenths(now.saturating_duration_since(state.last_success));
    let since_request = state.last_request.map_or_else(
        || String::from("  "),
        |sent| tenths(now.saturating_duration_since(sent)),
    );
    let payload = state.last_result.as_ref().map_or_else(String::new, flatten);
    let mut message = format!("({:>2}/{:>2}) {}", since_success, since_request, payload);
    if let Some(code) = state.last_error.as_ref() {
        message.push_str(" [");
        message.push_str(code);
        message.push(']');
    }
    message
}

/// Compact JSON with braces and quotes stripped: `established:5,inFlight:0`.
#[must_use]
pub fn flatten(value: &Value) -> String {
    value
        .to_string()
        .chars()
        .filter(|ch| !matches!(ch, '{' | '}' | '"'))
        .collect()
}

fn tenths(elapsed: Duration) -> String {
    elapsed
        .as_millis()
        .saturating_add(50)
        .checked_div(100)
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::fleet::instance::LifecycleState;

    fn instance(id: &str, address: &str) -> InstanceRecord {
        InstanceRecord {
            instance_id: id.to_owned(),
            address: address.to_owned(),
            state: LifecycleState::Running,
            tags: BTreeMap::new(),
        }
    }

    fn later(base: Instant, millis: u64) -> Result<Instant, String> {
        base.checked_add(Duration::from_millis(millis))
            .ok_or_else(|| "Instant overflow".to_owned())
    }

    #[test]
    fn instance_without_state_shows_unknown() -> Result<(), String> {
        let view = vec![RegionInstances {
            region: "eu-west-1".to_owned(),
            instances: vec![instance("i-empty", "")],
        }];
        let text = render_fleet(&view, &HashMap::new(), Instant::now());
        if text != "eu-west-1: \n  i-empty[running]: Unknown\n" {
            return Err(format!("Unexpected render: {:?}", text));
        }
        Ok(())
    }

    #[test]
    fn renders_ages_payload_and_error() -> Result<(), String> {
        let base = Instant::now();
        let state = PollState {
            last_request: Some(later(base, 1000)?),
            last_success: base,
            last_result: Some(serde_json::json!({"established": 5, "inFlight": 0})),
            last_error: Some("timeout".to_owned()),
        };
        let line = render_instance(&instance("i-1", "a"), Some(&state), later(base, 2000)?);
        if line != "i-1[running]: (20/10) established:5,inFlight:0 [timeout]" {
            return Err(format!("Unexpected line: {:?}", line));
        }
        Ok(())
    }

    #[test]
    fn never_requested_leaves_request_age_blank() -> Result<(), String> {
        let base = Instant::now();
        let line = render_instance(
            &instance("i-1", "a"),
            Some(&PollState::new(base)),
            later(base, 300)?,
        );
        if line != "i-1[running]: ( 3/  ) " {
            return Err(format!("Unexpected line: {:?}", line));
        }
        Ok(())
    }
}
