//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ClientConfig (validated, immutable)
//!     → Client::from_config (strategies built from schema.rs conversions)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; a new client is built for new settings
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AuthConfig, AuthKind, BackoffConfig, BackoffKind, ClientConfig, ClientSection, LimiterConfig,
    ObservabilityConfig, RateLimitConfig, RetryConfig, RetryOn,
};
pub use validation::{validate_config, ValidationError};
