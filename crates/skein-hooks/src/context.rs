// SPDX-FileCopyrightText: 2026 Skein Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hook capabilities and the per-attempt context they observe.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use skein_core::{BatchId, SkeinError};

/// State visible to hooks before a delivery attempt.
///
/// Hooks may add outbound headers; the transport sends them with the
/// request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub batch_id: BatchId,
    /// 1-based attempt number within the retry loop.
    pub attempt: u32,
    pub event_count: usize,
    pub headers: BTreeMap<String, String>,
}

impl RequestContext {
    pub fn new(batch_id: BatchId, attempt: u32, event_count: usize) -> Self {
        Self {
            batch_id,
            attempt,
            event_count,
            headers: BTreeMap::new(),
        }
    }

    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name.into(), value.into());
    }
}

/// Outcome of a delivery attempt as seen by after-response hooks.
#[derive(Debug, Clone)]
pub struct ResponseContext {
    pub batch_id: BatchId,
    pub attempt: u32,
    /// HTTP status, when the transport got that far.
    pub status: Option<u16>,
    pub elapsed: Duration,
    pub error: Option<SkeinError>,
    pub succeeded: usize,
    pub failed: usize,
}

impl ResponseContext {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Runs before each transport attempt.
#[async_trait]
pub trait BeforeRequest: Send + Sync {
    async fn before_request(&self, ctx: &mut RequestContext) -> Result<(), SkeinError>;
}

/// Runs after each transport attempt, successful or not.
#[async_trait]
pub trait AfterResponse: Send + Sync {
    async fn after_response(&self, ctx: &ResponseContext) -> Result<(), SkeinError>;
}
