//! Validation helpers for DTOs.

use validator::ValidationError;

const MAX_KEY_LEN: usize = 64;

/// Whether `key` is safe to use as an identifier and as a file name component.
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Validates an instance identifier (ASCII letters, digits, `-` and `_`, at most 64 chars).
///
/// # Examples
///
/// ```ignore
/// validate_instance_id("run-1")   // Ok
/// validate_instance_id("../x")    // Err - path separators
/// validate_instance_id("")        // Err - empty
/// ```
pub fn validate_instance_id(id: &str) -> Result<(), ValidationError> {
    if is_valid_key(id) {
        return Ok(());
    }
    let mut err = ValidationError::new("instance_id_format");
    err.message = Some(
        format!("Instance ID must be 1-{MAX_KEY_LEN} characters of [A-Za-z0-9_-] (got `{id}`)")
            .into(),
    );
    Err(err)
}

/// Validates a player name: non-blank, no control characters.
pub fn validate_player_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        let mut err = ValidationError::new("player_name_blank");
        err.message = Some("Player name must not be blank".into());
        return Err(err);
    }
    if name.chars().any(char::is_control) {
        let mut err = ValidationError::new("player_name_format");
        err.message = Some("Player name must not contain control characters".into());
        return Err(err);
    }
    Ok(())
}
