use crate::error::ConfigError;

use super::types::CoordinatorConfig;

pub const ACCESS_KEY_ID_LEN: usize = 20;
pub const ACCESS_KEY_SECRET_LEN: usize = 40;

/// Checks the credential strings before any client is built.
///
/// # Errors
///
/// Returns an error when either credential has the wrong length.
pub fn validate_credentials(config: &CoordinatorConfig) -> Result<(), ConfigError> {
    let id_len = config.access_key_id.chars().count();
    if id_len != ACCESS_KEY_ID_LEN {
        return Err(ConfigError::InvalidAccessKeyId {
            expected: ACCESS_KEY_ID_LEN,
            actual: id_len,
        });
    }
    let secret_len = config.access_key_secret.chars().count();
    if secret_len != ACCESS_KEY_SECRET_LEN {
        return Err(ConfigError::InvalidAccessKeySecret {
            expected: ACCESS_KEY_SECRET_LEN,
            actual: secret_len,
        });
    }
    Ok(())
}
