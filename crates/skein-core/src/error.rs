// SPDX-FileCopyrightText: 2026 Skein Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Skein ingestion pipeline.
//!
//! Every failure is a structured [`SkeinError`] value. Callers that need to
//! branch on the category use [`SkeinError::kind`] instead of comparing
//! against shared sentinel values.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

/// Coarse classification of a [`SkeinError`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Api,
    QueueFull,
    CircuitOpen,
    Shutdown,
    Closed,
    Cancelled,
    Timeout,
    Network,
    Hook,
    Config,
    Internal,
}

/// The primary error type used across the Skein workspace.
#[derive(Debug, Clone, Error)]
pub enum SkeinError {
    /// Caller mistake (malformed event, bad argument). Never retryable.
    #[error("validation error: {message}")]
    Validation {
        field: Option<String>,
        message: String,
    },

    /// The collector answered with a non-success HTTP status.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The pending-event buffer is at capacity and the overflow policy rejects.
    #[error("event queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    /// The circuit breaker is open and the call was rejected without a transport attempt.
    #[error("circuit breaker `{name}` is open")]
    CircuitOpen {
        name: String,
        retry_after: Option<Duration>,
    },

    /// Shutdown finished with events that were never delivered.
    #[error("shutdown incomplete: {pending_events} events not sent")]
    Shutdown { pending_events: usize },

    /// The pipeline no longer accepts events.
    #[error("pipeline is closed")]
    Closed,

    /// The caller's operation context was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// The caller's deadline (or a transport timeout) elapsed.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// Connection-level transport failure.
    #[error("network error: {message}")]
    Network { message: String },

    /// A hook failed. Only critical hook failures abort a request.
    #[error("hook `{name}` failed: {message}")]
    Hook { name: String, message: String },

    /// Invalid configuration handed to a component constructor.
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SkeinError {
    /// Shorthand for a validation error without a field name.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            field: None,
            message: message.into(),
        }
    }

    /// Shorthand for a validation error on a specific field.
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: Some(field.into()),
            message: message.into(),
        }
    }

    /// Shorthand for an API error.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Shorthand for a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Returns the error's category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Api { .. } => ErrorKind::Api,
            Self::QueueFull { .. } => ErrorKind::QueueFull,
            Self::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            Self::Shutdown { .. } => ErrorKind::Shutdown,
            Self::Closed => ErrorKind::Closed,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Network { .. } => ErrorKind::Network,
            Self::Hook { .. } => ErrorKind::Hook,
            Self::Config(_) => ErrorKind::Config,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// HTTP status carried by an API error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether a later attempt of the same operation may succeed.
    ///
    /// API errors are retryable only for 429 and 5xx. Errors without a
    /// classification (network, timeout, internal) are treated as retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Api { status, .. } => is_retryable_status(*status),
            Self::Network { .. }
            | Self::Timeout { .. }
            | Self::Internal(_)
            | Self::CircuitOpen { .. }
            | Self::QueueFull { .. } => true,
            Self::Validation { .. }
            | Self::Shutdown { .. }
            | Self::Closed
            | Self::Cancelled
            | Self::Hook { .. }
            | Self::Config(_) => false,
        }
    }

    /// Whether this error came from the caller's context ending.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Timeout { .. })
    }
}

/// Returns true for HTTP status codes worth retrying (429 and 5xx).
pub fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..=599).contains(&status)
}
