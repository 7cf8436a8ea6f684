use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult, ConfigError};

use super::types::CoordinatorConfig;

const DEFAULT_TOML: &str = "loadfleet.toml";
const DEFAULT_JSON: &str = "loadfleet.json";

/// Loads the coordinator config from `path`, or from `loadfleet.toml` /
/// `loadfleet.json` in the working directory.
///
/// # Errors
///
/// Returns an error when no file is found or the file cannot be read or
/// parsed.
pub fn load_config(path: Option<&str>) -> AppResult<CoordinatorConfig> {
    if let Some(path) = path {
        return load_config_file(&PathBuf::from(path));
    }

    let toml_path = PathBuf::from(DEFAULT_TOML);
    if toml_path.exists() {
        return load_config_file(&toml_path);
    }

    let json_path = PathBuf::from(DEFAULT_JSON);
    if json_path.exists() {
        return load_config_file(&json_path);
    }

    Err(AppError::config(ConfigError::NotFound))
}

/// Parses a single config file, choosing the format by extension.
///
/// # Errors
///
/// Returns an error when the file cannot be read, has an unsupported
/// extension, or does not parse.
pub fn load_config_file(path: &Path) -> AppResult<CoordinatorConfig> {
    let content = std::fs::read_to_string(path).map_err(|err| {
        AppError::config(ConfigError::ReadConfig {
            path: path.to_path_buf(),
            source: err,
        })
    })?;
    parse_config(path, &content)
}

pub(crate) fn parse_config(path: &Path, content: &str) -> AppResult<CoordinatorConfig> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => toml::from_str(content).map_err(|err| {
            AppError::config(ConfigError::ParseToml {
                path: path.to_path_buf(),
                source: err,
            })
        }),
        Some("json") => serde_json::from_str(content).map_err(|err| {
            AppError::config(ConfigError::ParseJson {
                path: path.to_path_buf(),
                source: err,
            })
        }),
        Some(ext) => Err(AppError::config(ConfigError::UnsupportedExtension {
            ext: ext.to_owned(),
        })),
        None => Err(AppError::config(ConfigError::MissingExtension)),
    }
}
