//! Configuration validation for Zero services.
//!
//! Checks that required values are present and within valid ranges before a
//! screener run starts.

use thiserror::Error;

use crate::config::{Config, ObservabilityConfig, RetryConfig, ScreenerServiceConfig};

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

impl Config {
    /// Validate the entire configuration.
    pub fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = self.observability.validate() {
            errors.push(e);
        }

        if let Err(e) = self.screener.validate() {
            errors.push(e);
        }

        if errors.is_empty() {
            Ok(())
        } else if errors.len() == 1 {
            Err(errors.remove(0))
        } else {
            Err(ValidationError::Multiple(errors))
        }
    }

    /// Load, apply environment overrides, and validate configuration.
    pub fn load_and_validate() -> anyhow::Result<Self> {
        let config = Self::load_with_env()?;
        config.validate().map_err(|e| anyhow::anyhow!("{}", e))?;
        Ok(config)
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_level".into(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            });
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.log_format.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_format".into(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            });
        }

        Ok(())
    }
}

impl Validate for RetryConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.max_attempts == 0 {
            return Err(ValidationError::InvalidValue {
                field: "screener.retry.max_attempts".into(),
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

impl Validate for ScreenerServiceConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if self.document_path.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: "screener.document_path".into(),
            });
        }

        if self.data_base_url.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: "screener.data_base_url".into(),
            });
        }

        if self.lookback_days == 0 {
            errors.push(ValidationError::InvalidValue {
                field: "screener.lookback_days".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if self.max_concurrent_symbols == 0 {
            errors.push(ValidationError::InvalidValue {
                field: "screener.max_concurrent_symbols".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if let Err(e) = self.retry.validate() {
            errors.push(e);
        }

        for (symbol, profile) in &self.symbols {
            if symbol.trim().is_empty() {
                errors.push(ValidationError::InvalidValue {
                    field: "screener.symbols".into(),
                    reason: "symbol must not be empty".into(),
                });
            } else if profile.trim().is_empty() {
                errors.push(ValidationError::MissingField {
                    field: format!("screener.symbols.{symbol}"),
                });
            }
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ValidationError::Multiple(errors)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_valid_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = Config::default();
        config.observability.log_level = "invalid".into();
        let result = config.validate();
        assert!(matches!(
            result,
            Err(ValidationError::InvalidValue { ref field, .. }) if field == "observability.log_level"
        ));
    }

    #[test_case("trace" ; "trace level")]
    #[test_case("DEBUG" ; "uppercase debug")]
    #[test_case("warn" ; "warn level")]
    fn test_valid_log_levels(level: &str) {
        let mut config = Config::default();
        config.observability.log_level = level.into();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_retry_attempts_rejected() {
        let mut config = Config::default();
        config.screener.retry.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_screener_errors_aggregate() {
        let mut config = Config::default();
        config.screener.lookback_days = 0;
        config.screener.max_concurrent_symbols = 0;
        let result = config.validate();
        assert!(matches!(result, Err(ValidationError::Multiple(ref errs)) if errs.len() == 2));
    }

    #[test]
    fn test_empty_profile_rejected() {
        let mut config = Config::default();
        config.screener.symbols.insert("XYZ".into(), String::new());
        assert!(matches!(
            config.validate(),
            Err(ValidationError::MissingField { ref field }) if field == "screener.symbols.XYZ"
        ));
    }
}
