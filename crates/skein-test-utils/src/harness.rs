// SPDX-FileCopyrightText: 2026 Skein Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pipeline harness for integration tests.
//!
//! `TestPipeline` wires an [`IngestionPipeline`] to a [`MockTransport`]
//! with small batches, short retry delays and a flush interval long enough
//! that the timer never fires unless a test advances the clock.

use std::sync::Arc;
use std::time::Duration;

use skein_core::{Event, EventId, SkeinError};
use skein_hooks::{Hook, HookPriority};
use skein_ingest::{IngestionPipeline, PipelineConfig, RetryConfig};

use crate::mock_transport::MockTransport;

/// Numbered trace events with a small JSON payload.
pub fn events(n: usize) -> Vec<Event> {
    (0..n)
        .map(|i| Event::trace(serde_json::json!({ "name": format!("event-{i}"), "seq": i })))
        .collect()
}

/// Defaults used by [`TestPipeline`].
pub fn test_config() -> PipelineConfig {
    PipelineConfig {
        capacity: 100,
        batch_size: 10,
        flush_interval: Duration::from_secs(60),
        retry: RetryConfig {
            max_retries: 3,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
        },
        shutdown_timeout: Duration::from_secs(5),
        ..PipelineConfig::default()
    }
}

/// Builder for [`TestPipeline`].
pub struct TestPipelineBuilder {
    config: PipelineConfig,
    transport: Arc<MockTransport>,
    hooks: Vec<(String, Hook, HookPriority)>,
}

impl TestPipelineBuilder {
    fn new() -> Self {
        Self {
            config: test_config(),
            transport: Arc::new(MockTransport::new()),
            hooks: Vec::new(),
        }
    }

    /// Adjust the pipeline configuration.
    pub fn configure(mut self, f: impl FnOnce(&mut PipelineConfig)) -> Self {
        f(&mut self.config);
        self
    }

    pub fn transport(mut self, transport: MockTransport) -> Self {
        self.transport = Arc::new(transport);
        self
    }

    pub fn hook(mut self, name: &str, hook: Hook, priority: HookPriority) -> Self {
        self.hooks.push((name.to_string(), hook, priority));
        self
    }

    /// Builds the pipeline. Must run inside a Tokio runtime.
    pub fn build(self) -> Result<TestPipeline, SkeinError> {
        let mut builder = IngestionPipeline::builder(self.config)
            .transport(Arc::clone(&self.transport) as Arc<dyn skein_ingest::Transport>);
        for (name, hook, priority) in self.hooks {
            builder = builder.add_hook(name, hook, priority);
        }
        Ok(TestPipeline {
            pipeline: builder.build()?,
            transport: self.transport,
        })
    }
}

/// A pipeline plus the mock transport it delivers to.
pub struct TestPipeline {
    pub pipeline: IngestionPipeline,
    pub transport: Arc<MockTransport>,
}

impl TestPipeline {
    pub fn builder() -> TestPipelineBuilder {
        TestPipelineBuilder::new()
    }

    /// Submit `n` fresh events and return their ids in submission order.
    pub fn submit_events(&self, n: usize) -> Result<Vec<EventId>, SkeinError> {
        events(n)
            .into_iter()
            .map(|event| {
                let id = event.id().clone();
                self.pipeline.submit(event).map(|()| id)
            })
            .collect()
    }
}
