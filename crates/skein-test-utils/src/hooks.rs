// SPDX-FileCopyrightText: 2026 Skein Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hooks with predictable behavior for chain and pipeline tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use skein_core::SkeinError;
use skein_hooks::{AfterResponse, BeforeRequest, RequestContext, ResponseContext};

/// Records every invocation and optionally stamps a header.
#[derive(Clone, Default)]
pub struct RecordingHook {
    header: Option<(String, String)>,
    requests: Arc<Mutex<Vec<RequestContext>>>,
    responses: Arc<Mutex<Vec<ResponseContext>>>,
}

impl RecordingHook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name: value` on every outgoing request.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.header = Some((name.into(), value.into()));
        self
    }

    pub fn requests(&self) -> Vec<RequestContext> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn responses(&self) -> Vec<ResponseContext> {
        self.responses
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl BeforeRequest for RecordingHook {
    async fn before_request(&self, ctx: &mut RequestContext) -> Result<(), SkeinError> {
        if let Some((name, value)) = &self.header {
            ctx.set_header(name.clone(), value.clone());
        }
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(ctx.clone());
        Ok(())
    }
}

#[async_trait]
impl AfterResponse for RecordingHook {
    async fn after_response(&self, ctx: &ResponseContext) -> Result<(), SkeinError> {
        self.responses
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(ctx.clone());
        Ok(())
    }
}

/// Fails every call with the given message.
#[derive(Clone)]
pub struct FailingHook {
    message: String,
    calls: Arc<AtomicUsize>,
}

impl FailingHook {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BeforeRequest for FailingHook {
    async fn before_request(&self, _ctx: &mut RequestContext) -> Result<(), SkeinError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(SkeinError::Internal(self.message.clone()))
    }
}

#[async_trait]
impl AfterResponse for FailingHook {
    async fn after_response(&self, _ctx: &ResponseContext) -> Result<(), SkeinError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(SkeinError::Internal(self.message.clone()))
    }
}

/// Panics on every call.
#[derive(Clone, Copy, Default)]
pub struct PanickingHook;

#[async_trait]
impl BeforeRequest for PanickingHook {
    async fn before_request(&self, _ctx: &mut RequestContext) -> Result<(), SkeinError> {
        panic!("hook exploded");
    }
}

#[async_trait]
impl AfterResponse for PanickingHook {
    async fn after_response(&self, _ctx: &ResponseContext) -> Result<(), SkeinError> {
        panic!("hook exploded");
    }
}

/// Sleeps for a fixed time on every call, then succeeds.
#[derive(Clone)]
pub struct SlowHook {
    delay: Duration,
    calls: Arc<AtomicUsize>,
}

impl SlowHook {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Calls started, finished or not.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BeforeRequest for SlowHook {
    async fn before_request(&self, _ctx: &mut RequestContext) -> Result<(), SkeinError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
}

#[async_trait]
impl AfterResponse for SlowHook {
    async fn after_response(&self, _ctx: &ResponseContext) -> Result<(), SkeinError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
}
