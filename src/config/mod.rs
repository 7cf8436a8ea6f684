//! Coordinator configuration: file discovery, parsing, and validation.
mod loader;
pub mod types;
mod validate;


pub use loader::{load_config, load_config_file};
#[cfg(feature = "fuzzing")]
pub(crate) use loader::parse_config;
pub use types::CoordinatorConfig;
pub use validate::validate_credentials;
