// SPDX-FileCopyrightText: 2026 Skein Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Asynchronous telemetry ingestion for Skein.
//!
//! Events submitted to an [`IngestionPipeline`] are buffered in a bounded
//! [`EventQueue`], grouped into batches by size or age, and delivered by a
//! [`DeliveryClient`] that retries transient failures behind a circuit
//! breaker. Queue depth drives a [`BackpressureMonitor`], and failures that
//! happen off the caller's task are surfaced through the
//! [`AsyncErrorReporter`].

pub mod backpressure;
pub mod delivery;
pub mod pipeline;
pub mod queue;
pub mod recording;
pub mod reporter;
pub mod transport;

pub use backpressure::{
    BackpressureLevel, BackpressureMonitor, BackpressureThresholds, LevelCallback, LevelPolicy,
};
pub use delivery::{should_retry, DeliveryClient, RetryConfig};
pub use pipeline::{
    IngestionPipeline, PipelineBuilder, PipelineConfig, PipelineStats, BREAKER_NAME,
};
pub use queue::{Enqueued, EventQueue, QueueState};
pub use reporter::{
    AsyncErrorReporter, ErrorCallback, OverflowCallback, ReporterStats, DEFAULT_ERROR_BUFFER,
};
pub use transport::{
    HttpTransport, HttpTransportConfig, Transport, TransportResponse, INGESTION_PATH,
};
