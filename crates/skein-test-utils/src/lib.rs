// SPDX-FileCopyrightText: 2026 Skein Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Skein integration tests.
//!
//! Provides an in-memory transport and a pipeline harness for fast,
//! deterministic tests without a running collector.
//!
//! # Components
//!
//! - [`MockTransport`] - Scripted transport that records every request
//! - [`TestPipeline`] - Pipeline wired to a `MockTransport` with test-sized settings
//! - [`RecordingHook`], [`FailingHook`], [`PanickingHook`], [`SlowHook`] - Hooks with fixed behavior

pub mod harness;
pub mod hooks;
pub mod mock_transport;

pub use harness::{events, test_config, TestPipeline, TestPipelineBuilder};
pub use hooks::{FailingHook, PanickingHook, RecordingHook, SlowHook};
pub use mock_transport::{MockTransport, RecordedRequest, Reply};
