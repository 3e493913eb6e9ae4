//! Metrics collection.
//!
//! # Metrics
//! - `http_client_attempts_total` (counter): attempts sent, by method
//! - `http_client_retries_total` (counter): retries scheduled, by reason
//! - `http_client_rate_limited_total` (counter): local denials, by behavior
//! - `http_client_adaptive_backoff_total` (counter): server-signaled backoffs, by source
//! - `http_client_calls_total` (counter): logical calls, by outcome
//!
//! # Design Decisions
//! - Recorded through the `metrics` facade; exporting is left to the application
//! - Label values are low-cardinality (no URLs, no hosts)

use metrics::counter;

pub fn record_attempt(method: &str) {
    counter!("http_client_attempts_total", "method" => method.to_string()).increment(1);
}

/// `reason` is `status` when a response triggered the retry, `transport` otherwise.
pub fn record_retry(reason: &'static str) {
    counter!("http_client_retries_total", "reason" => reason).increment(1);
}

pub fn record_rate_limited(behavior: &'static str) {
    counter!("http_client_rate_limited_total", "behavior" => behavior).increment(1);
}

pub fn record_adaptive_backoff(source: &'static str) {
    counter!("http_client_adaptive_backoff_total", "source" => source).increment(1);
}

/// `outcome` is one of `success`, `failed`, `rate_limited`, `canceled`.
pub fn record_call(outcome: &'static str) {
    counter!("http_client_calls_total", "outcome" => outcome).increment(1);
}
