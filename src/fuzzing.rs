use std::path::Path;

use crate::agent::http::{HttpRequest, parse_request_head};
use crate::agent::settings::{LoadConfig, UnknownFieldPolicy};
use crate::args::parsers::{parse_positive_u64, parse_stop_count};
use crate::args::StopCount;
use crate::config::{CoordinatorConfig, load_config_file};
use crate::error::{AgentError, AppResult, ConfigError};
use crate::fleet::provider::userdata::expand_includes;

/// Loads a config file from disk.
///
/// # Errors
///
/// Returns an error when the file cannot be read or parsed.
pub fn load_config_file_input(path: &Path) -> AppResult<CoordinatorConfig> {
    load_config_file(path)
}

/// Parses TOML config content.
///
/// # Errors
///
/// Returns an error when the content is not a valid config.
pub fn parse_config_toml_input(input: &str) -> AppResult<CoordinatorConfig> {
    crate::config::parse_config(Path::new("loadfleet.toml"), input)
}

/// Parses JSON config content.
///
/// # Errors
///
/// Returns an error when the content is not a valid config.
pub fn parse_config_json_input(input: &str) -> AppResult<CoordinatorConfig> {
    crate::config::parse_config(Path::new("loadfleet.json"), input)
}

/// Applies a `/set` query string to a default agent config.
///
/// # Errors
///
/// Returns an error when a field value is invalid, or an unknown key is
/// written in strict mode.
pub fn apply_set_query_input(query: &str, strict: bool) -> Result<LoadConfig, AgentError> {
    let policy = if strict {
        UnknownFieldPolicy::Reject
    } else {
        UnknownFieldPolicy::Store
    };
    let pairs: Vec<(String, String)> = url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect();
    let mut config = LoadConfig::default();
    config.apply_writes(pairs, policy)?;
    Ok(config)
}

/// Parses a control request head (without the trailing blank line).
///
/// # Errors
///
/// Returns the HTTP status the control server would answer with.
pub fn parse_control_request_input(head: &[u8]) -> Result<HttpRequest, u16> {
    parse_request_head(head).map_err(|err| err.status)
}

/// # Errors
///
/// Returns an error for zero or non-numeric input.
pub fn parse_positive_u64_input(input: &str) -> AppResult<u64> {
    Ok(parse_positive_u64(input)?.get())
}

/// # Errors
///
/// Returns an error for input that is neither a count nor `all`.
pub fn parse_stop_count_input(input: &str) -> AppResult<StopCount> {
    parse_stop_count(input)
}

/// Expands a boot-script template against a directory with no include
/// files.
///
/// # Errors
///
/// Returns an error for unterminated or unreadable includes.
pub fn expand_user_data_input(template: &str) -> Result<String, ConfigError> {
    expand_includes(template, Path::new("/nonexistent-loadfleet-includes"))
}
