//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Client loop, rate limiters, adaptive limiter produce:
//!     → logging.rs (structured log events via `tracing`)
//!     → metrics.rs (counters via the `metrics` facade)
//!
//! Consumers:
//!     → Whatever subscriber / recorder the embedding application installs
//! ```
//!
//! # Design Decisions
//! - The library never installs a metrics recorder; without one, counters are no-ops
//! - One span per logical call carries the request ID through every attempt
//! - The binary installs the log subscriber; the library only emits events

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
