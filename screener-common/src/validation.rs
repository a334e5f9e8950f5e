//! Configuration validation.
//!
//! Checks that required values are present and within valid ranges before
//! the service starts.

use thiserror::Error;

use crate::config::{
    Config, DataConfig, IngestConfig, NetworkConfig, ObservabilityConfig, ScreenerConfig,
    KNOWN_PROVIDERS,
};

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

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: &[&str] = &["pretty", "json"];

impl Config {
    /// Validate the entire configuration.
    pub fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        let sections: [&dyn Validate; 5] = [
            &self.network,
            &self.observability,
            &self.data,
            &self.screener,
            &self.ingest,
        ];
        for section in sections {
            if let Err(e) = section.validate() {
                errors.push(e);
            }
        }

        if self.data.provider == "alphavantage" && self.alpha_vantage_api_key().is_none() {
            errors.push(ValidationError::MissingField {
                field: "secrets.alpha_vantage_api_key (required by data.provider = alphavantage)"
                    .into(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else if errors.len() == 1 {
            Err(errors.remove(0))
        } else {
            Err(ValidationError::Multiple(errors))
        }
    }

    /// Load with environment overrides, then validate.
    pub fn load_and_validate() -> anyhow::Result<Self> {
        let config = Self::load_with_env()?;
        config.validate().map_err(|e| anyhow::anyhow!("{}", e))?;
        Ok(config)
    }
}

impl Validate for NetworkConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.port == 0 {
            return Err(ValidationError::InvalidValue {
                field: "network.port".into(),
                reason: "must be between 1 and 65535".into(),
            });
        }
        if self.bind.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "network.bind".into(),
            });
        }
        Ok(())
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        if !LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_level".into(),
                reason: format!("expected one of {:?}", LOG_LEVELS),
            });
        }
        if !LOG_FORMATS.contains(&self.log_format.as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_format".into(),
                reason: format!("expected one of {:?}", LOG_FORMATS),
            });
        }
        Ok(())
    }
}

impl Validate for DataConfig {
    fn validate(&self) -> ValidationResult<()> {
        if !KNOWN_PROVIDERS.contains(&self.provider.as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "data.provider".into(),
                reason: format!("expected one of {:?}", KNOWN_PROVIDERS),
            });
        }
        if self.timeout_secs == 0 {
            return Err(ValidationError::InvalidValue {
                field: "data.timeout_secs".into(),
                reason: "must be greater than 0".into(),
            });
        }
        if self.rate_limit_rpm == 0 {
            return Err(ValidationError::InvalidValue {
                field: "data.rate_limit_rpm".into(),
                reason: "must be greater than 0".into(),
            });
        }
        Ok(())
    }
}

impl Validate for ScreenerConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.spans.is_empty() {
            return Err(ValidationError::MissingField {
                field: "screener.spans".into(),
            });
        }
        if self.spans.contains(&0) {
            return Err(ValidationError::InvalidValue {
                field: "screener.spans".into(),
                reason: "spans must be positive".into(),
            });
        }
        if self.spans.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ValidationError::InvalidValue {
                field: "screener.spans".into(),
                reason: "spans must be strictly increasing".into(),
            });
        }
        if self.max_concurrency == 0 {
            return Err(ValidationError::InvalidValue {
                field: "screener.max_concurrency".into(),
                reason: "must be at least 1".into(),
            });
        }
        if self.lookback_days == 0 {
            return Err(ValidationError::InvalidValue {
                field: "screener.lookback_days".into(),
                reason: "must be at least 1".into(),
            });
        }
        if self.index_sources.is_empty() {
            return Err(ValidationError::MissingField {
                field: "screener.index_sources".into(),
            });
        }
        for (i, source) in self.index_sources.iter().enumerate() {
            if source.url.trim().is_empty() || source.column.trim().is_empty() {
                return Err(ValidationError::MissingField {
                    field: format!("screener.index_sources[{}].url/column", i),
                });
            }
        }
        Ok(())
    }
}

impl Validate for IngestConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.symbols_file.as_os_str().is_empty() {
            return Err(ValidationError::MissingField {
                field: "ingest.symbols_file".into(),
            });
        }
        if self.max_concurrency == 0 {
            return Err(ValidationError::InvalidValue {
                field: "ingest.max_concurrency".into(),
                reason: "must be at least 1".into(),
            });
        }
        if self.lookback_days == 0 {
            return Err(ValidationError::InvalidValue {
                field: "ingest.lookback_days".into(),
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = Config::default();
        config.observability.log_level = "loud".into();
        let result = config.validate();
        assert!(result.is_err());
        if let Err(ValidationError::InvalidValue { field, .. }) = result {
            assert_eq!(field, "observability.log_level");
        }
    }

    #[test]
    fn test_spans_must_increase() {
        let mut config = Config::default();
        config.screener.spans = vec![20, 25, 25, 40];
        match config.validate() {
            Err(ValidationError::InvalidValue { field, reason }) => {
                assert_eq!(field, "screener.spans");
                assert!(reason.contains("strictly increasing"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_zero_span_rejected() {
        let mut config = Config::default();
        config.screener.spans = vec![0, 10];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_alphavantage_requires_key() {
        let mut config = Config::default();
        config.data.provider = "alphavantage".into();
        match config.validate() {
            Err(ValidationError::MissingField { field }) => {
                assert!(field.starts_with("secrets.alpha_vantage_api_key"));
            }
            other => panic!("unexpected: {:?}", other),
        }

        config.secrets.alpha_vantage_api_key = Some("key".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_provider() {
        let mut config = Config::default();
        config.data.provider = "bloomberg".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_multiple_errors_reported_together() {
        let mut config = Config::default();
        config.network.port = 0;
        config.ingest.max_concurrency = 0;
        match config.validate() {
            Err(ValidationError::Multiple(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
