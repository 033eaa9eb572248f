//! Input validation for verification requests
//!
//! Centralized checks for everything a caller hands the pipeline:
//! session identifiers, expected phrases, upload sizes, and tuning
//! ranges. Rejecting early keeps malformed input away from the decode
//! and analysis stages.

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Value too long: max {max}, got {actual}")]
    ValueTooLong { max: usize, actual: usize },

    #[error("Payload too large: max {max} bytes, got {actual}")]
    PayloadTooLarge { max: usize, actual: usize },
}

/// Validate a session identifier (alphanumeric + underscore/hyphen, max 64
/// chars)
pub fn validate_session_id(id: &str) -> Result<String, ValidationError> {
    if id.is_empty() {
        return Err(ValidationError::InvalidFormat(
            "Session id cannot be empty".to_string(),
        ));
    }

    if id.len() > 64 {
        return Err(ValidationError::ValueTooLong {
            max: 64,
            actual: id.len(),
        });
    }

    if !id
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
    {
        return Err(ValidationError::InvalidFormat(
            "Session id can only contain letters, numbers, underscores, and hyphens".to_string(),
        ));
    }

    Ok(id.to_string())
}

/// Validate an expected phrase (max 256 chars, no control characters)
pub fn validate_expected_phrase(phrase: &str) -> Result<String, ValidationError> {
    if phrase.is_empty() {
        return Err(ValidationError::InvalidFormat(
            "Expected phrase cannot be empty".to_string(),
        ));
    }

    if phrase.len() > 256 {
        return Err(ValidationError::ValueTooLong {
            max: 256,
            actual: phrase.len(),
        });
    }

    if phrase.chars().any(|c| c.is_control()) {
        return Err(ValidationError::InvalidFormat(
            "Expected phrase contains invalid control characters".to_string(),
        ));
    }

    Ok(phrase.to_string())
}

/// Validate an upload against the configured size cap
pub fn validate_upload_size(actual: usize, max: usize) -> Result<(), ValidationError> {
    if actual == 0 {
        return Err(ValidationError::InvalidFormat(
            "Upload cannot be empty".to_string(),
        ));
    }
    if actual > max {
        return Err(ValidationError::PayloadTooLarge { max, actual });
    }
    Ok(())
}

/// Validate a score threshold (0.0 to 1.0)
pub fn validate_threshold(threshold: f32) -> Result<f32, ValidationError> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(ValidationError::InvalidRange(format!(
            "Threshold must be between 0.0 and 1.0, got {}",
            threshold
        )));
    }
    Ok(threshold)
}

/// Validate an epsilon-per-query setting (positive, bounded)
pub fn validate_epsilon(epsilon: f64) -> Result<f64, ValidationError> {
    if !(epsilon > 0.0 && epsilon <= 100.0) {
        return Err(ValidationError::InvalidRange(format!(
            "Epsilon must be in (0, 100], got {}",
            epsilon
        )));
    }
    Ok(epsilon)
}
