// SPDX-FileCopyrightText: 2026 Skein Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Structured record of a failure that happened off the caller's path.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};

use crate::error::SkeinError;
use crate::event::EventId;
use crate::types::Operation;

/// A background failure delivered out-of-band to observers.
#[derive(Debug, Clone)]
pub struct AsyncError {
    pub operation: Operation,
    pub timestamp: DateTime<Utc>,
    pub event_ids: Vec<EventId>,
    pub cause: SkeinError,
    pub retryable: bool,
    pub context: BTreeMap<String, String>,
}

impl AsyncError {
    /// Wraps `cause`, inheriting its retryability.
    pub fn new(operation: Operation, cause: SkeinError) -> Self {
        Self {
            operation,
            timestamp: Utc::now(),
            event_ids: Vec::new(),
            retryable: cause.is_retryable(),
            cause,
            context: BTreeMap::new(),
        }
    }

    pub fn with_events(mut self, event_ids: Vec<EventId>) -> Self {
        self.event_ids = event_ids;
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.context.insert(key.into(), value.to_string());
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }
}

impl fmt::Display for AsyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.operation, self.cause)?;
        if !self.event_ids.is_empty() {
            write!(f, " ({} events)", self.event_ids.len())?;
        }
        Ok(())
    }
}

impl std::error::Error for AsyncError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inherits_retryability_from_cause() {
        let err = AsyncError::new(Operation::BatchSend, SkeinError::api(503, "down"));
        assert!(err.retryable);

        let err = AsyncError::new(Operation::BatchSend, SkeinError::api(400, "bad"));
        assert!(!err.retryable);
    }

    #[test]
    fn display_mentions_operation_and_event_count() {
        let err = AsyncError::new(Operation::Flush, SkeinError::network("reset"))
            .with_events(vec![EventId::from("a"), EventId::from("b")])
            .with_context("batch_id", "b-1");
        assert_eq!(err.to_string(), "flush failed: network error: reset (2 events)");
        assert_eq!(err.context.get("batch_id").map(String::as_str), Some("b-1"));
    }
}
