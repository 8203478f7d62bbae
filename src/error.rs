//! Error types for hive2bq.

use thiserror::Error;

/// The main error type for conversion runs.
///
/// Only failures of the machinery itself live here. An invalid source
/// statement, unresolved table names, or a candidate the target engine
/// rejects are ordinary run outcomes, see [`crate::workflow::Outcome`].
#[derive(Debug, Error)]
pub enum ConvertError {
    /// The translation oracle failed to answer.
    #[error("Translation error: {0}")]
    Translation(String),

    /// A validator failed to produce a verdict.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The repair oracle failed to answer.
    #[error("Repair error: {0}")]
    Repair(String),

    /// The table mapping could not be loaded.
    #[error("Mapping error: {0}")]
    Mapping(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV error while reading a mapping file.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML error while reading a config file.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON error while talking to an external collaborator.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConvertError {
    /// Create a configuration error for a key with an unusable value.
    pub fn config(key: &str, value: &str, expected: &str) -> Self {
        Self::Config(format!("{key}='{value}' is invalid, expected {expected}"))
    }
}

/// Result type alias for hive2bq operations.
pub type ConvertResult<T> = Result<T, ConvertError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConvertError::Translation("provider timed out".into());
        assert_eq!(err.to_string(), "Translation error: provider timed out");
    }

    #[test]
    fn test_config_helper() {
        let err = ConvertError::config("MAX_RETRIES", "many", "an integer");
        assert_eq!(
            err.to_string(),
            "Configuration error: MAX_RETRIES='many' is invalid, expected an integer"
        );
    }
}
