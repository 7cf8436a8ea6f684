//! Core library for the `loadfleet` CLI.
//!
//! Two roles share this crate: the load agent (an admission-controlled
//! request engine plus its HTTP control plane) and the coordinator that
//! provisions agents, polls their counters, and pushes parameter changes.
//! The primary interface is the `loadfleet` binary; library APIs may evolve
//! with it.
pub mod agent;
pub mod args;
pub mod cancel;
pub mod config;
pub mod error;
pub mod fleet;
pub mod shutdown;
mod system;

#[cfg(feature = "fuzzing")]
pub mod fuzzing;
