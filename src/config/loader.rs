//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ClientConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<ClientConfig, ConfigError> {
    let config: ClientConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ClientConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_io_error() {
        let err = load_config(Path::new("/nonexistent/resilient-http.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn syntax_error_is_parse_error() {
        assert!(matches!(parse_config("[retry"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn semantic_errors_are_joined() {
        let err = parse_config("[client]\ntimeout_secs = 0\napp_name = \"\"").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Validation failed: client.app_name: must not be empty, \
             client.timeout_secs: must be greater than 0"
        );
    }

    #[test]
    fn loads_from_disk() {
        let path = std::env::temp_dir().join(format!("resilient-http-{}.toml", std::process::id()));
        fs::write(&path, "[retry]\nmax_retries = 4\n").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.retry.max_retries, 4);

        fs::remove_file(&path).unwrap();
    }
}
