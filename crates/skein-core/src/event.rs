// SPDX-FileCopyrightText: 2026 Skein Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Telemetry events and batches carried through the pipeline.
//!
//! An [`Event`] is immutable once created. The queue owns it until it is
//! moved into exactly one [`Batch`].

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::SkeinError;

/// Unique identifier of a telemetry event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub String);

impl EventId {
    /// Generates a fresh random (UUIDv4) identifier.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EventId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for EventId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Identifier of a batch formed by the batcher.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(pub String);

impl BatchId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ingestion type tag of an event.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum EventType {
    TraceCreate,
    SpanCreate,
    SpanUpdate,
    GenerationCreate,
    GenerationUpdate,
    EventCreate,
    ScoreCreate,
    SdkLog,
}

/// Immutable telemetry envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    id: EventId,
    #[serde(rename = "type")]
    event_type: EventType,
    timestamp: DateTime<Utc>,
    payload: serde_json::Value,
}

impl Event {
    /// Creates an event with a generated id and the current time.
    pub fn new(event_type: EventType, payload: serde_json::Value) -> Self {
        Self {
            id: EventId::new(),
            event_type,
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Creates an event with a caller-supplied id (used for idempotent re-sends).
    pub fn with_id(id: EventId, event_type: EventType, payload: serde_json::Value) -> Self {
        Self {
            id,
            event_type,
            timestamp: Utc::now(),
            payload,
        }
    }

    pub fn trace(payload: serde_json::Value) -> Self {
        Self::new(EventType::TraceCreate, payload)
    }

    pub fn span(payload: serde_json::Value) -> Self {
        Self::new(EventType::SpanCreate, payload)
    }

    pub fn generation(payload: serde_json::Value) -> Self {
        Self::new(EventType::GenerationCreate, payload)
    }

    pub fn score(payload: serde_json::Value) -> Self {
        Self::new(EventType::ScoreCreate, payload)
    }

    pub fn id(&self) -> &EventId {
        &self.id
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    /// Checks the envelope invariants a producer is responsible for.
    pub fn validate(&self) -> Result<(), SkeinError> {
        if self.id.0.trim().is_empty() {
            return Err(SkeinError::invalid_field("id", "event id must not be empty"));
        }
        Ok(())
    }
}

/// Ordered group of events delivered together.
#[derive(Debug, Clone)]
pub struct Batch {
    id: BatchId,
    events: Vec<Event>,
}

impl Batch {
    pub fn new(events: Vec<Event>) -> Self {
        Self {
            id: BatchId::new(),
            events,
        }
    }

    pub fn id(&self) -> &BatchId {
        &self.id
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Ids of every event in submission order.
    pub fn event_ids(&self) -> Vec<EventId> {
        self.events.iter().map(|e| e.id.clone()).collect()
    }

    /// Gives the events back, e.g. to return them to the queue.
    pub fn into_events(self) -> Vec<Event> {
        self.events
    }
}
