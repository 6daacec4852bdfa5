// SPDX-FileCopyrightText: 2026 Skein Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the pipeline crates and the configuration model.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Health status reported by pipeline health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Pipeline is fully operational.
    Healthy,
    /// Pipeline is operational but experiencing issues.
    Degraded(String),
    /// Pipeline is not delivering events.
    Unhealthy(String),
}

/// What the queue does with a new event when it is at capacity.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Fail the submission with a queue-full error.
    #[default]
    Reject,
    /// Evict the oldest pending event to make room.
    DropOldest,
    /// Discard the incoming event.
    DropNewest,
}

/// Action producers should take under the current backpressure level.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    #[default]
    Proceed,
    Block,
    DropOldest,
    DropNewest,
}

/// Background operation that produced an asynchronous error.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    BatchSend,
    Flush,
    Hook,
    Shutdown,
    Queue,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Operation::BatchSend,
        Operation::Flush,
        Operation::Hook,
        Operation::Shutdown,
        Operation::Queue,
    ];
}
