//! Error types shared by the Scout crates.

use thiserror::Error;

/// Domain parsing and configuration failures.
#[derive(Error, Debug)]
pub enum ScoutError {
    /// Configuration could not be loaded or is inconsistent
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Name that matches no supported company
    #[error("unknown company '{0}'")]
    UnknownCompany(String),

    /// A persisted or user-supplied value has no domain meaning
    #[error("invalid value: {0}")]
    Validation(String),
}

/// Failures while loading or validating `config.toml`.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No home directory to derive the config path from
    #[error("no platform config directory available")]
    NoConfigDir,

    /// File is not valid TOML for [`crate::AppConfig`]
    #[error("config file is not valid: {0}")]
    ParseError(#[from] toml::de::Error),

    /// File exists but could not be read
    #[error("could not read config file: {0}")]
    Io(#[from] std::io::Error),

    /// A setting is out of range or unknown
    #[error("{field}: {reason}")]
    InvalidValue {
        /// Dotted key, e.g. `scraping.min_delay_ms`
        field: String,
        /// What is wrong with it
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result alias over [`ScoutError`].
pub type Result<T> = std::result::Result<T, ScoutError>;

/// Result alias over [`ConfigError`].
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_value_names_the_key() {
        let err = ConfigError::invalid("scraping.max_pages_per_state", "must be at least 1");
        assert_eq!(
            err.to_string(),
            "scraping.max_pages_per_state: must be at least 1"
        );

        let err: ScoutError = err.into();
        assert!(matches!(err, ScoutError::Config(_)));
        assert_eq!(
            err.to_string(),
            "scraping.max_pages_per_state: must be at least 1"
        );
    }

    #[test]
    fn test_unknown_company_message() {
        let err = ScoutError::UnknownCompany("Acme".to_string());
        assert_eq!(err.to_string(), "unknown company 'Acme'");
    }
}
