// SPDX-FileCopyrightText: 2026 Skein Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ingestion wire contract.
//!
//! One POST per batch carries `{"events": [...]}`; the collector answers
//! with per-event `successes` and `errors`. Partial success is the normal
//! case, so callers inspect both lists.

use serde::{Deserialize, Serialize};

use crate::event::{Batch, BatchId, Event, EventId};

/// Request body of a single ingestion call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionRequest {
    pub events: Vec<Event>,
}

impl From<&Batch> for IngestionRequest {
    fn from(batch: &Batch) -> Self {
        Self {
            events: batch.events().to_vec(),
        }
    }
}

/// An event the collector accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSuccess {
    pub id: EventId,
    pub status: u16,
}

/// An event the collector rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFailure {
    pub id: EventId,
    pub status: u16,
    #[serde(default)]
    pub message: Option<String>,
}

/// Response body of an ingestion call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionResponse {
    #[serde(default)]
    pub successes: Vec<EventSuccess>,
    #[serde(default)]
    pub errors: Vec<EventFailure>,
}

impl IngestionResponse {
    /// A response accepting every event of the request.
    pub fn accept_all(request: &IngestionRequest) -> Self {
        Self {
            successes: request
                .events
                .iter()
                .map(|e| EventSuccess {
                    id: e.id().clone(),
                    status: 201,
                })
                .collect(),
            errors: Vec::new(),
        }
    }

    pub fn is_partial(&self) -> bool {
        !self.errors.is_empty() && !self.successes.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Outcome of delivering one batch.
#[derive(Debug, Clone)]
pub struct DeliveryReport {
    pub batch_id: BatchId,
    pub succeeded: Vec<EventId>,
    pub failed: Vec<EventFailure>,
    /// Number of transport attempts made, including the successful one.
    pub attempts: u32,
}

impl DeliveryReport {
    pub fn from_response(batch_id: BatchId, response: IngestionResponse, attempts: u32) -> Self {
        Self {
            batch_id,
            succeeded: response.successes.into_iter().map(|s| s.id).collect(),
            failed: response.errors,
            attempts,
        }
    }

    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failed_ids(&self) -> Vec<EventId> {
        self.failed.iter().map(|f| f.id.clone()).collect()
    }
}
