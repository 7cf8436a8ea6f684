mod agent;
mod app;
mod config;
mod fleet;
mod validation;

#[cfg(test)]
mod test_support;

pub use agent::AgentError;
pub use app::{AppError, AppResult};
pub use config::ConfigError;
pub use fleet::FleetError;
pub use validation::ValidationError;
