//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, rates finite and positive)
//! - Check header names and values are sendable
//! - Check credentials are complete for the chosen auth kind
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ClientConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use reqwest::header::{HeaderName, HeaderValue};
use thiserror::Error;

use crate::config::schema::{AuthKind, ClientConfig, LimiterConfig};

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// Dotted path of the offending field, e.g. `retry.max_wait_ms`.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &ClientConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let client = &config.client;
    if client.app_name.trim().is_empty() {
        errors.push(ValidationError::new("client.app_name", "must not be empty"));
    } else if HeaderValue::from_str(&client.app_name).is_err() {
        errors.push(ValidationError::new("client.app_name", "is not a valid header value"));
    }
    if client.timeout_secs == 0 {
        errors.push(ValidationError::new("client.timeout_secs", "must be greater than 0"));
    }
    for (name, value) in &client.headers {
        if HeaderName::from_bytes(name.as_bytes()).is_err() {
            errors.push(ValidationError::new(
                format!("client.headers.{}", name),
                "is not a valid header name",
            ));
        }
        if HeaderValue::from_str(value).is_err() {
            errors.push(ValidationError::new(
                format!("client.headers.{}", name),
                "is not a valid header value",
            ));
        }
    }

    if let Some(auth) = &client.auth {
        let missing = |v: &Option<String>| v.as_deref().map_or(true, str::is_empty);
        match auth.kind {
            AuthKind::Bearer if missing(&auth.token) => {
                errors.push(ValidationError::new("client.auth.token", "required for bearer auth"));
            }
            AuthKind::Basic if missing(&auth.username) => {
                errors.push(ValidationError::new("client.auth.username", "required for basic auth"));
            }
            _ => {}
        }
    }

    let retry = &config.retry;
    if retry.max_wait_ms > 0 && retry.max_wait_ms < retry.min_wait_ms {
        errors.push(ValidationError::new(
            "retry.max_wait_ms",
            "must not be less than retry.min_wait_ms",
        ));
    }

    // Limiter parameters are only checked when the limiter will actually be built.
    if config.rate_limit.enabled {
        match &config.rate_limit.limiter {
            LimiterConfig::TokenBucket {
                requests_per_second,
                burst,
            } => {
                if requests_per_second.is_nan() || *requests_per_second <= 0.0 {
                    errors.push(ValidationError::new(
                        "rate_limit.limiter.requests_per_second",
                        "must be greater than 0",
                    ));
                }
                if *burst == 0 {
                    errors.push(ValidationError::new("rate_limit.limiter.burst", "must be greater than 0"));
                }
            }
            LimiterConfig::FixedWindow { limit, window_ms } => {
                if *limit == 0 {
                    errors.push(ValidationError::new("rate_limit.limiter.limit", "must be greater than 0"));
                }
                if *window_ms == 0 {
                    errors.push(ValidationError::new(
                        "rate_limit.limiter.window_ms",
                        "must be greater than 0",
                    ));
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::AuthConfig;

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&ClientConfig::default()).is_ok());
    }

    #[test]
    fn reports_every_violation() {
        let mut config = ClientConfig::default();
        config.client.app_name = " ".to_string();
        config.client.timeout_secs = 0;
        config.client.headers.insert("bad header".to_string(), "ok".to_string());
        config.retry.min_wait_ms = 500;
        config.retry.max_wait_ms = 100;
        config.rate_limit.enabled = true;
        config.rate_limit.limiter = LimiterConfig::TokenBucket {
            requests_per_second: f64::NAN,
            burst: 0,
        };

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "client.app_name",
                "client.timeout_secs",
                "client.headers.bad header",
                "retry.max_wait_ms",
                "rate_limit.limiter.requests_per_second",
                "rate_limit.limiter.burst",
            ]
        );
    }

    #[test]
    fn zero_max_wait_means_uncapped() {
        let mut config = ClientConfig::default();
        config.retry.min_wait_ms = 500;
        config.retry.max_wait_ms = 0;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn disabled_limiter_is_not_checked() {
        let mut config = ClientConfig::default();
        config.rate_limit.limiter = LimiterConfig::FixedWindow { limit: 0, window_ms: 0 };
        assert!(validate_config(&config).is_ok());

        config.rate_limit.enabled = true;
        assert_eq!(validate_config(&config).unwrap_err().len(), 2);
    }

    #[test]
    fn incomplete_auth() {
        let mut config = ClientConfig::default();
        config.client.auth = Some(AuthConfig {
            kind: AuthKind::Bearer,
            token: Some(String::new()),
            username: None,
            password: None,
        });
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].to_string(), "client.auth.token: required for bearer auth");
    }
}
