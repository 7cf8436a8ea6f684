//! Coordinator: provisions agents, polls them, and pushes parameter changes.
pub mod commands;
pub mod distribution;
pub mod instance;
pub mod poller;
pub mod provider;
pub mod push;
pub mod render;
pub mod status;

pub use commands::{run_set, run_start, run_stop};
pub use status::run_status;
