use tokio::process::Command;
use tracing::{info, warn};

use crate::error::AgentError;

pub const DEFAULT_SERVICE_NAME: &str = "loadfleet-agent";

/// External process supervisor that owns restarting the agent.
pub trait Supervisor: Send + Sync {
    /// Asks the supervisor to restart this process. Returns once the request
    /// has been handed off, not once the restart happened.
    ///
    /// # Errors
    ///
    /// Returns an error when the request cannot be handed off.
    fn request_restart(&self) -> Result<(), AgentError>;
}

/// Restarts the agent's systemd unit via `systemctl restart`.
pub struct SystemctlSupervisor {
    service_name: String,
}

impl SystemctlSupervisor {
    pub fn new(service_name: impl Into<String>) -> Self {
        let service_name = service_name.into();
        let service_name = service_name.trim().trim_end_matches(".service").to_owned();
        Self { service_name }
    }

    fn unit(&self) -> String {
        format!("{}.service", self.service_name)
    }
}

impl Supervisor for SystemctlSupervisor {
    fn request_restart(&self) -> Result<(), AgentError> {
        let unit = self.unit();
        let mut child = Command::new("systemctl")
            .args(["restart", unit.as_str()])
            .spawn()
            .map_err(|err| AgentError::RestartSpawn {
                command: format!("systemctl restart {}", unit),
                source: err,
            })?;
        info!("Requested restart of {}", unit);
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => {}
                Ok(status) => warn!("systemctl restart {} exited with {}", unit, status),
                Err(err) => warn!("Failed waiting for systemctl restart {}: {}", unit, err),
            }
        });
        Ok(())
    }
}
