// SPDX-FileCopyrightText: 2026 Skein Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Skein ingestion pipeline.
//!
//! All structs use `#[serde(deny_unknown_fields)]` so a mistyped key fails
//! at startup with a suggestion instead of being silently ignored.

use serde::{Deserialize, Serialize};
use skein_core::{Decision, OverflowPolicy};

/// Top-level Skein configuration.
///
/// Every section is optional and falls back to its defaults.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SkeinConfig {
    /// Collector endpoint and credentials.
    #[serde(default)]
    pub client: ClientConfig,

    /// Event queue and batching.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Delivery retry policy.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Circuit breaker around the collector.
    #[serde(default)]
    pub circuit: CircuitConfig,

    /// Queue-depth backpressure levels.
    #[serde(default)]
    pub backpressure: BackpressureConfig,

    /// Async error reporting.
    #[serde(default)]
    pub errors: ErrorsConfig,

    /// Graceful shutdown.
    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

/// Collector connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Base URL of the collector, without the ingestion path.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Public key used as the basic-auth user name.
    #[serde(default)]
    pub public_key: String,

    /// Secret key used as the basic-auth password.
    #[serde(default)]
    pub secret_key: String,

    /// Per-request HTTP timeout.
    #[serde(default = "default_request_timeout_secs")]
    pub timeout_secs: u64,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            public_key: String::new(),
            secret_key: String::new(),
            timeout_secs: default_request_timeout_secs(),
            log_level: default_log_level(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Queue and batcher settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    /// Maximum number of pending events.
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Events per batch; reaching it triggers a drain.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum time an event waits before a timer-triggered drain.
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    /// What happens to a new event when the queue is full.
    #[serde(default)]
    pub overflow_policy: OverflowPolicy,

    /// Concurrent batch deliveries. Values above 1 give up cross-batch ordering.
    #[serde(default = "default_delivery_workers")]
    pub delivery_workers: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            batch_size: default_batch_size(),
            flush_interval_ms: default_flush_interval_ms(),
            overflow_policy: OverflowPolicy::default(),
            delivery_workers: default_delivery_workers(),
        }
    }
}

fn default_capacity() -> usize {
    10_000
}

fn default_batch_size() -> usize {
    100
}

fn default_flush_interval_ms() -> u64 {
    1_000
}

fn default_delivery_workers() -> usize {
    1
}

/// Retry policy for a single batch.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Attempts after the first one.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

/// Circuit breaker settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CircuitConfig {
    /// Consecutive failures that open the circuit.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Seconds spent open before a trial call.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// Optional failure ratio (0.0 to 1.0) that also opens the circuit.
    #[serde(default)]
    pub failure_rate_threshold: Option<f64>,

    /// Calls observed before the failure ratio applies.
    #[serde(default = "default_min_requests_for_rate")]
    pub min_requests_for_rate: u32,

    /// Most recent calls the failure ratio is computed over.
    #[serde(default = "default_rate_window")]
    pub rate_window: u32,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_secs: default_cooldown_secs(),
            failure_rate_threshold: None,
            min_requests_for_rate: default_min_requests_for_rate(),
            rate_window: default_rate_window(),
        }
    }
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_cooldown_secs() -> u64 {
    30
}

fn default_min_requests_for_rate() -> u32 {
    10
}

fn default_rate_window() -> u32 {
    100
}

/// Backpressure thresholds (fractions of queue capacity) and the decision
/// producers get at each level.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BackpressureConfig {
    #[serde(default = "default_elevated_threshold")]
    pub elevated_threshold: f64,

    #[serde(default = "default_high_threshold")]
    pub high_threshold: f64,

    #[serde(default = "default_critical_threshold")]
    pub critical_threshold: f64,

    #[serde(default)]
    pub normal_decision: Decision,

    #[serde(default)]
    pub elevated_decision: Decision,

    #[serde(default)]
    pub high_decision: Decision,

    #[serde(default = "default_critical_decision")]
    pub critical_decision: Decision,
}

impl Default for BackpressureConfig {
    fn default() -> Self {
        Self {
            elevated_threshold: default_elevated_threshold(),
            high_threshold: default_high_threshold(),
            critical_threshold: default_critical_threshold(),
            normal_decision: Decision::Proceed,
            elevated_decision: Decision::Proceed,
            high_decision: Decision::Proceed,
            critical_decision: default_critical_decision(),
        }
    }
}

fn default_elevated_threshold() -> f64 {
    0.5
}

fn default_high_threshold() -> f64 {
    0.8
}

fn default_critical_threshold() -> f64 {
    0.95
}

fn default_critical_decision() -> Decision {
    Decision::Block
}

/// Async error reporter settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ErrorsConfig {
    /// Buffered background errors before new ones are dropped.
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
}

impl Default for ErrorsConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: default_buffer_capacity(),
        }
    }
}

fn default_buffer_capacity() -> usize {
    100
}

/// Graceful shutdown settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ShutdownConfig {
    /// Upper bound on the final drain.
    #[serde(default = "default_shutdown_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

fn default_shutdown_timeout_secs() -> u64 {
    30
}
