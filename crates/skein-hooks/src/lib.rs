// SPDX-FileCopyrightText: 2026 Skein Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request/response hooks around every delivery attempt.
//!
//! Hooks are registered once through [`HookChainBuilder`] and classified by
//! [`HookPriority`]. A critical hook failing before a request aborts the
//! attempt; an observational hook failing is logged and skipped. Panics
//! inside hooks are contained and treated as failures.

pub mod chain;
pub mod context;

pub use chain::{
    FailureCallback, Hook, HookChain, HookChainBuilder, HookFailure, HookPhase, HookPriority,
    HookStats,
};
pub use context::{AfterResponse, BeforeRequest, RequestContext, ResponseContext};
