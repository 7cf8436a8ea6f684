use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config '{path}': {source}")]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse TOML config '{path}': {source}")]
    ParseToml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Failed to parse JSON config '{path}': {source}")]
    ParseJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Unsupported config extension '{ext}'. Use .toml or .json.")]
    UnsupportedExtension { ext: String },
    #[error("Config file must have .toml or .json extension.")]
    MissingExtension,
    #[error("No config file found. Create loadfleet.toml / loadfleet.json or pass --config.")]
    NotFound,
    #[error("Unknown region: {region}. Must be one of: {known}")]
    UnknownRegion { region: String, known: String },
    #[error("No regions configured.")]
    NoRegions,
    #[error("Access key id must be exactly {expected} characters (got {actual}).")]
    InvalidAccessKeyId { expected: usize, actual: usize },
    #[error("Access key secret must be exactly {expected} characters (got {actual}).")]
    InvalidAccessKeySecret { expected: usize, actual: usize },
    #[error("user_data_file is required to start instances.")]
    MissingUserDataFile,
    #[error("Failed to read user data template '{path}': {source}")]
    ReadUserData {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Unterminated include in user data template at byte {offset}.")]
    UnterminatedInclude { offset: usize },
    #[cfg(test)]
    #[error("Test expectation failed: {message}")]
    TestExpectation { message: &'static str },
    #[cfg(test)]
    #[error("Test expectation failed: {message}: {value}")]
    TestExpectationValue {
        message: &'static str,
        value: String,
    },
}
