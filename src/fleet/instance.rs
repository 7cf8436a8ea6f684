use std::collections::BTreeMap;
use std::fmt;

/// Provider-side lifecycle of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Pending,
    Running,
    ShuttingDown,
    Stopping,
    Stopped,
    Terminated,
    /// Anything the provider reports that we do not recognise.
    Unknown,
}

impl LifecycleState {
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "pending" => Self::Pending,
            "running" => Self::Running,
            "shutting-down" => Self::ShuttingDown,
            "stopping" => Self::Stopping,
            "stopped" => Self::Stopped,
            "terminated" => Self::Terminated,
            _ => Self::Unknown,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::ShuttingDown => "shutting-down",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Terminated => "terminated",
            Self::Unknown => "unknown",
        }
    }

    #[must_use]
    pub const fn is_manageable(self) -> bool {
        matches!(self, Self::Pending | Self::Running | Self::ShuttingDown)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceRecord {
    pub instance_id: String,
    /// Public DNS name or IP; empty until the provider assigns one.
    pub address: String,
    pub state: LifecycleState,
    pub tags: BTreeMap<String, String>,
}

impl InstanceRecord {
    #[must_use]
    pub fn has_address(&self) -> bool {
        !self.address.is_empty()
    }

    /// True when every required tag is present with an equal value.
    #[must_use]
    pub fn tags_match(&self, required: &BTreeMap<String, String>) -> bool {
        required
            .iter()
            .all(|(key, value)| self.tags.get(key) == Some(value))
    }

    #[must_use]
    pub fn is_managed_by(&self, required: &BTreeMap<String, String>) -> bool {
        self.state.is_manageable() && self.tags_match(required)
    }
}

/// Instances of one region, in provider order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionInstances {
    pub region: String,
    pub instances: Vec<InstanceRecord>,
}

/// Keeps only manageable instances carrying the management tags.
#[must_use]
pub fn managed(
    instances: Vec<InstanceRecord>,
    required: &BTreeMap<String, String>,
) -> Vec<InstanceRecord> {
    instances
        .into_iter()
        .filter(|instance| instance.is_managed_by(required))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, state: &str, tags: &[(&str, &str)]) -> InstanceRecord {
        InstanceRecord {
            instance_id: id.to_owned(),
            address: String::new(),
            state: LifecycleState::parse(state),
            tags: tags
                .iter()
                .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
                .collect(),
        }
    }

    #[test]
    fn only_live_states_are_manageable() -> Result<(), String> {
        let manageable: Vec<&str> = [
            "pending",
            "running",
            "shutting-down",
            "stopping",
            "stopped",
            "terminated",
            "rebooting",
        ]
        .into_iter()
        .filter(|raw| LifecycleState::parse(raw).is_manageable())
        .collect();
        if manageable != ["pending", "running", "shutting-down"] {
            return Err(format!("Unexpected manageable states: {:?}", manageable));
        }
        Ok(())
    }

    #[test]
    fn tag_filter_requires_exact_values() -> Result<(), String> {
        let required: BTreeMap<String, String> =
            [("fleet".to_owned(), "load".to_owned())].into_iter().collect();
        let kept = managed(
            vec![
                record("i-1", "running", &[("fleet", "load"), ("extra", "x")]),
                record("i-2", "running", &[("fleet", "Load")]),
                record("i-3", "running", &[]),
                record("i-4", "stopped", &[("fleet", "load")]),
            ],
            &required,
        );
        let ids: Vec<&str> = kept.iter().map(|r| r.instance_id.as_str()).collect();
        if ids != ["i-1"] {
            return Err(format!("Unexpected instances kept: {:?}", ids));
        }
        Ok(())
    }

    #[test]
    fn empty_tag_set_matches_everything() -> Result<(), String> {
        let instance = record("i-1", "pending", &[("a", "b")]);
        if !instance.is_managed_by(&BTreeMap::new()) {
            return Err("Empty tag set should match".to_owned());
        }
        Ok(())
    }
}
