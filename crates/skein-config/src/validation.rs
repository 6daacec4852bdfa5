// SPDX-FileCopyrightText: 2026 Skein Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Checks semantic constraints serde cannot express: URL shape, positive
//! sizes, ordered thresholds, and cross-field relations.

use crate::diagnostic::ConfigError;
use crate::model::SkeinConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every problem instead of stopping at the first one.
pub fn validate_config(config: &SkeinConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    let base_url = config.client.base_url.trim();
    if base_url.is_empty() {
        fail("client.base_url must not be empty".to_string());
    } else if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        fail(format!(
            "client.base_url `{base_url}` must start with http:// or https://"
        ));
    }

    if config.client.secret_key.is_empty() != config.client.public_key.is_empty() {
        fail("client.public_key and client.secret_key must be set together".to_string());
    }

    if config.client.timeout_secs == 0 {
        fail("client.timeout_secs must be at least 1".to_string());
    }

    let level = config.client.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        fail(format!(
            "client.log_level `{}` is not one of {}",
            config.client.log_level,
            LOG_LEVELS.join(", ")
        ));
    }

    let queue = &config.queue;
    if queue.batch_size == 0 {
        fail("queue.batch_size must be at least 1".to_string());
    }
    if queue.capacity < queue.batch_size {
        fail(format!(
            "queue.capacity ({}) must be at least queue.batch_size ({})",
            queue.capacity, queue.batch_size
        ));
    }
    if queue.flush_interval_ms == 0 {
        fail("queue.flush_interval_ms must be at least 1".to_string());
    }
    if queue.delivery_workers == 0 {
        fail("queue.delivery_workers must be at least 1".to_string());
    }

    if config.retry.base_delay_ms > config.retry.max_delay_ms {
        fail(format!(
            "retry.base_delay_ms ({}) must not exceed retry.max_delay_ms ({})",
            config.retry.base_delay_ms, config.retry.max_delay_ms
        ));
    }

    if config.circuit.failure_threshold == 0 {
        fail("circuit.failure_threshold must be at least 1".to_string());
    }
    if let Some(rate) = config.circuit.failure_rate_threshold
        && !(rate > 0.0 && rate <= 1.0)
    {
        fail(format!(
            "circuit.failure_rate_threshold must be in (0, 1], got {rate}"
        ));
    }
    if config.circuit.rate_window < config.circuit.min_requests_for_rate.max(1) {
        fail(format!(
            "circuit.rate_window ({}) must be at least circuit.min_requests_for_rate ({}) and nonzero",
            config.circuit.rate_window, config.circuit.min_requests_for_rate
        ));
    }

    let bp = &config.backpressure;
    for (name, value) in [
        ("elevated_threshold", bp.elevated_threshold),
        ("high_threshold", bp.high_threshold),
        ("critical_threshold", bp.critical_threshold),
    ] {
        if !(value > 0.0 && value <= 1.0) {
            fail(format!("backpressure.{name} must be in (0, 1], got {value}"));
        }
    }
    if !(bp.elevated_threshold < bp.high_threshold && bp.high_threshold < bp.critical_threshold) {
        fail(format!(
            "backpressure thresholds must be strictly increasing \
             (elevated {} < high {} < critical {})",
            bp.elevated_threshold, bp.high_threshold, bp.critical_threshold
        ));
    }

    if config.errors.buffer_capacity == 0 {
        fail("errors.buffer_capacity must be at least 1".to_string());
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

    fn messages(config: &SkeinConfig) -> Vec<String> {
        validate_config(config)
            .unwrap_err()
            .into_iter()
            .map(|e| e.to_string())
            .collect()
    }

    #[test]
    fn default_config_validates() {
        assert!(validate_config(&SkeinConfig::default()).is_ok());
    }

    #[test]
    fn base_url_needs_scheme() {
        let mut config = SkeinConfig::default();
        config.client.base_url = "collector.local".to_string();
        assert!(messages(&config).iter().any(|m| m.contains("client.base_url")));
    }

    #[test]
    fn keys_must_be_paired() {
        let mut config = SkeinConfig::default();
        config.client.public_key = "pk-123".to_string();
        assert!(messages(&config).iter().any(|m| m.contains("set together")));

        config.client.secret_key = "sk-456".to_string();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn unordered_thresholds_fail() {
        let mut config = SkeinConfig::default();
        config.backpressure.high_threshold = 0.4;
        assert!(messages(&config).iter().any(|m| m.contains("strictly increasing")));
    }

    #[test]
    fn collects_every_error() {
        let mut config = SkeinConfig::default();
        config.queue.batch_size = 0;
        config.queue.delivery_workers = 0;
        config.errors.buffer_capacity = 0;
        config.client.log_level = "loud".to_string();
        assert_eq!(messages(&config).len(), 4);
    }

    #[test]
    fn capacity_below_batch_size_fails() {
        let mut config = SkeinConfig::default();
        config.queue.capacity = 10;
        config.queue.batch_size = 50;
        assert!(messages(&config).iter().any(|m| m.contains("queue.capacity")));
    }

    #[test]
    fn base_delay_above_max_fails() {
        let mut config = SkeinConfig::default();
        config.retry.base_delay_ms = 60_000;
        assert!(messages(&config).iter().any(|m| m.contains("retry.base_delay_ms")));
    }

    #[test]
    fn rate_window_smaller_than_minimum_fails() {
        let mut config = SkeinConfig::default();
        config.circuit.min_requests_for_rate = 20;
        config.circuit.rate_window = 10;
        assert!(messages(&config).iter().any(|m| m.contains("circuit.rate_window")));
    }
}
