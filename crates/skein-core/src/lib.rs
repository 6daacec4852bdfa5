// SPDX-FileCopyrightText: 2026 Skein Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Skein ingestion pipeline.
//!
//! This crate provides the event and batch model, the ingestion wire types,
//! the error taxonomy, and the operation [`Context`] used throughout the
//! Skein workspace.

pub mod async_error;
pub mod context;
pub mod error;
pub mod event;
pub mod ingestion;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use async_error::AsyncError;
pub use context::Context;
pub use error::{ErrorKind, SkeinError};
pub use event::{Batch, BatchId, Event, EventId, EventType};
pub use ingestion::{
    DeliveryReport, EventFailure, EventSuccess, IngestionRequest, IngestionResponse,
};
pub use types::{Decision, HealthStatus, Operation, OverflowPolicy};
