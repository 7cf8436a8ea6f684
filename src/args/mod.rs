//! CLI argument types and parsing helpers.
mod cli;
pub(crate) mod parsers;
mod types;


pub use cli::{AgentArgs, Command, LoadFleetArgs, SetArgs, StartArgs, StatusArgs, StopArgs};
pub use types::{PositiveU64, StopCount};
