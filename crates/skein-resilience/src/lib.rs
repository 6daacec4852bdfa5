// SPDX-FileCopyrightText: 2026 Skein Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fault isolation for the Skein delivery path.
//!
//! Provides a three-state [`CircuitBreaker`] that fails fast while the
//! ingestion endpoint is unhealthy and tests recovery with a single trial
//! call after a cooldown.

pub mod circuit;

pub use circuit::{
    CircuitBreaker, CircuitConfig, CircuitPermit, CircuitSnapshot, CircuitState,
    TransitionCallback,
};
