//! Live load configuration and its field registry.
//!
//! Every field the control plane may write is declared in [`FIELD_REGISTRY`]
//! with a fixed kind. Writes are validated against that kind before anything
//! is applied, so numeric fields can never leave the non-negative integer
//! domain. Keys outside the registry are either kept as plain strings or
//! rejected, depending on [`UnknownFieldPolicy`].
use std::collections::BTreeMap;

use serde::Serialize;
use url::Url;

use crate::error::AgentError;

pub const DEFAULT_TARGET_COUNT: u64 = 0;
pub const DEFAULT_CONCURRENCY_CAP: u64 = 100;
pub const DEFAULT_TARGET_HOST: &str = "127.0.0.1";
pub const DEFAULT_TARGET_PORT: u16 = 8888;
pub const DEFAULT_TARGET_PATH: &str = "/";
pub const DEFAULT_CONTROL_PORT: u16 = 8889;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Count,
    Port,
    Text,
}

impl FieldKind {
    const fn label(self) -> &'static str {
        match self {
            FieldKind::Count => "count",
            FieldKind::Port => "port",
            FieldKind::Text => "text",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldId {
    TargetCount,
    ConcurrencyCap,
    TargetHost,
    TargetPort,
    TargetPath,
    ControlPort,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    id: FieldId,
}

pub const FIELD_REGISTRY: [FieldSpec; 6] = [
    FieldSpec {
        name: "n",
        kind: FieldKind::Count,
        id: FieldId::TargetCount,
    },
    FieldSpec {
        name: "concurrency",
        kind: FieldKind::Count,
        id: FieldId::ConcurrencyCap,
    },
    FieldSpec {
        name: "host",
        kind: FieldKind::Text,
        id: FieldId::TargetHost,
    },
    FieldSpec {
        name: "port",
        kind: FieldKind::Port,
        id: FieldId::TargetPort,
    },
    FieldSpec {
        name: "path",
        kind: FieldKind::Text,
        id: FieldId::TargetPath,
    },
    FieldSpec {
        name: "controlPort",
        kind: FieldKind::Port,
        id: FieldId::ControlPort,
    },
];

fn lookup_field(name: &str) -> Option<&'static FieldSpec> {
    FIELD_REGISTRY.iter().find(|spec| spec.name == name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownFieldPolicy {
    /// Keep unknown keys verbatim as strings.
    #[default]
    Store,
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadConfig {
    #[serde(rename = "n")]
    pub target_count: u64,
    #[serde(rename = "concurrency")]
    pub concurrency_cap: u64,
    #[serde(rename = "host")]
    pub target_host: String,
    #[serde(rename = "port")]
    pub target_port: u16,
    #[serde(rename = "path")]
    pub target_path: String,
    #[serde(rename = "controlPort")]
    pub control_port: u16,
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            target_count: DEFAULT_TARGET_COUNT,
            concurrency_cap: DEFAULT_CONCURRENCY_CAP,
            target_host: DEFAULT_TARGET_HOST.to_owned(),
            target_port: DEFAULT_TARGET_PORT,
            target_path: DEFAULT_TARGET_PATH.to_owned(),
            control_port: DEFAULT_CONTROL_PORT,
            extra: BTreeMap::new(),
        }
    }
}

enum FieldWrite {
    Count(FieldId, u64),
    Port(FieldId, u16),
    Text(FieldId, String),
    Extra(String, String),
}

/// Result of a successful write batch.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Keys that were stored outside the registry.
    pub unregistered: Vec<String>,
}

impl LoadConfig {
    /// Validates every pair, then applies them in order.
    ///
    /// # Errors
    ///
    /// Returns an error when a registered field gets a value of the wrong
    /// kind, or when an unknown key is written under
    /// [`UnknownFieldPolicy::Reject`]. Nothing is applied in that case.
    pub fn apply_writes<I>(
        &mut self,
        pairs: I,
        policy: UnknownFieldPolicy,
    ) -> Result<WriteOutcome, AgentError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let writes = pairs
            .into_iter()
            .map(|(key, value)| parse_write(key, value, policy))
            .collect::<Result<Vec<_>, _>>()?;

        let mut outcome = WriteOutcome::default();
        for write in writes {
            match write {
                FieldWrite::Count(id, value) => self.set_count(id, value),
                FieldWrite::Port(id, value) => self.set_port(id, value),
                FieldWrite::Text(id, value) => self.set_text(id, value),
                FieldWrite::Extra(key, value) => {
                    if !outcome.unregistered.contains(&key) {
                        outcome.unregistered.push(key.clone());
                    }
                    self.extra.insert(key, value);
                }
            }
        }
        Ok(outcome)
    }

    /// Builds the URL every new outbound request is sent to.
    ///
    /// # Errors
    ///
    /// Returns an error when host/port/path do not form a valid URL.
    pub fn target_url(&self) -> Result<Url, AgentError> {
        let path = if self.target_path.starts_with('/') {
            self.target_path.clone()
        } else {
            format!("/{}", self.target_path)
        };
        let raw = format!("http://{}:{}{}", self.target_host, self.target_port, path);
        Url::parse(&raw).map_err(|err| AgentError::InvalidTarget {
            url: raw,
            source: err,
        })
    }

    fn set_count(&mut self, id: FieldId, value: u64) {
        match id {
            FieldId::TargetCount => self.target_count = value,
            FieldId::ConcurrencyCap => self.concurrency_cap = value,
            FieldId::TargetHost | FieldId::TargetPort | FieldId::TargetPath | FieldId::ControlPort => {}
        }
    }

    fn set_port(&mut self, id: FieldId, value: u16) {
        match id {
            FieldId::TargetPort => self.target_port = value,
            FieldId::ControlPort => self.control_port = value,
            FieldId::TargetCount | FieldId::ConcurrencyCap | FieldId::TargetHost | FieldId::TargetPath => {}
        }
    }

    fn set_text(&mut self, id: FieldId, value: String) {
        match id {
            FieldId::TargetHost => self.target_host = value,
            FieldId::TargetPath => self.target_path = value,
            FieldId::TargetCount | FieldId::ConcurrencyCap | FieldId::TargetPort | FieldId::ControlPort => {}
        }
    }
}

fn parse_write(
    key: String,
    value: String,
    policy: UnknownFieldPolicy,
) -> Result<FieldWrite, AgentError> {
    let Some(spec) = lookup_field(&key) else {
        return match policy {
            UnknownFieldPolicy::Store => Ok(FieldWrite::Extra(key, value)),
            UnknownFieldPolicy::Reject => Err(AgentError::UnknownField { field: key }),
        };
    };
    let invalid = |value: String| AgentError::InvalidFieldValue {
        field: spec.name,
        kind: spec.kind.label(),
        value,
    };
    match spec.kind {
        FieldKind::Count => match value.trim().parse::<u64>() {
            Ok(parsed) => Ok(FieldWrite::Count(spec.id, parsed)),
            Err(_) => Err(invalid(value)),
        },
        FieldKind::Port => match value.trim().parse::<u16>() {
            Ok(parsed) => Ok(FieldWrite::Port(spec.id, parsed)),
            Err(_) => Err(invalid(value)),
        },
        FieldKind::Text => Ok(FieldWrite::Text(spec.id, value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, AppResult};

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect()
    }

    #[test]
    fn numeric_field_stays_numeric() -> AppResult<()> {
        let mut config = LoadConfig::default();
        config.apply_writes(pairs(&[("n", "250")]), UnknownFieldPolicy::Store)?;
        if config.target_count != 250 {
            return Err(AppError::agent(format!(
                "Unexpected target_count: {}",
                config.target_count
            )));
        }
        let json = serde_json::to_value(&config)?;
        if json.get("n").and_then(serde_json::Value::as_u64) != Some(250) {
            return Err(AppError::agent(format!("Expected numeric n, got {}", json)));
        }
        Ok(())
    }

    #[test]
    fn unknown_key_is_stored_as_string() -> AppResult<()> {
        let mut config = LoadConfig::default();
        let outcome =
            config.apply_writes(pairs(&[("mode", "42")]), UnknownFieldPolicy::Store)?;
        if outcome.unregistered != vec!["mode".to_owned()] {
            return Err(AppError::agent("Expected mode to be flagged as unregistered"));
        }
        let json = serde_json::to_value(&config)?;
        if json.get("mode").and_then(serde_json::Value::as_str) != Some("42") {
            return Err(AppError::agent(format!("Expected string mode, got {}", json)));
        }
        Ok(())
    }

    #[test]
    fn unknown_key_rejected_when_strict() -> AppResult<()> {
        let mut config = LoadConfig::default();
        match config.apply_writes(pairs(&[("mode", "42")]), UnknownFieldPolicy::Reject) {
            Err(AgentError::UnknownField { field }) if field == "mode" => Ok(()),
            Err(err) => Err(AppError::agent(format!("Unexpected error: {}", err))),
            Ok(_) => Err(AppError::agent("Expected strict policy to reject mode")),
        }
    }

    #[test]
    fn invalid_number_rejects_whole_batch() -> AppResult<()> {
        let mut config = LoadConfig::default();
        let result = config.apply_writes(
            pairs(&[("n", "10"), ("concurrency", "-5")]),
            UnknownFieldPolicy::Store,
        );
        if result.is_ok() {
            return Err(AppError::agent("Expected negative concurrency to be rejected"));
        }
        if config != LoadConfig::default() {
            return Err(AppError::agent("Rejected batch must not change the config"));
        }
        Ok(())
    }

    #[test]
    fn repeated_write_is_idempotent() -> AppResult<()> {
        let mut config = LoadConfig::default();
        let write = pairs(&[("n", "7"), ("host", "example.test"), ("label", "blue")]);
        config.apply_writes(write.clone(), UnknownFieldPolicy::Store)?;
        let first = serde_json::to_string(&config)?;
        config.apply_writes(write, UnknownFieldPolicy::Store)?;
        let second = serde_json::to_string(&config)?;
        if first != second {
            return Err(AppError::agent(format!(
                "Config changed on repeat: {} vs {}",
                first, second
            )));
        }
        Ok(())
    }

    #[test]
    fn target_url_adds_leading_slash() -> AppResult<()> {
        let mut config = LoadConfig::default();
        config.apply_writes(
            pairs(&[("host", "10.0.0.5"), ("port", "9000"), ("path", "status")]),
            UnknownFieldPolicy::Store,
        )?;
        let url = config.target_url()?;
        if url.as_str() != "http://10.0.0.5:9000/status" {
            return Err(AppError::agent(format!("Unexpected url: {}", url)));
        }
        Ok(())
    }
}
