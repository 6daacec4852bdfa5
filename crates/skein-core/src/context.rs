// SPDX-FileCopyrightText: 2026 Skein Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operation context: a cancellation signal plus an optional deadline.
//!
//! Every synchronous pipeline operation (flush, shutdown, manual drain)
//! takes a [`Context`]. Suspension points race their work against
//! [`Context::done`], so an expired or cancelled context aborts promptly.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::SkeinError;

/// Cancellation token plus optional deadline for one caller operation.
#[derive(Debug, Clone)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
    budget: Option<Duration>,
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl Context {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
            budget: None,
        }
    }

    /// A context whose deadline is `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(Instant::now() + timeout),
            budget: Some(timeout),
        }
    }

    /// A context with an absolute deadline. A deadline in the past yields
    /// an already-expired context.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(deadline),
            budget: Some(deadline.saturating_duration_since(Instant::now())),
        }
    }

    /// A context driven by an externally owned token.
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
            budget: None,
        }
    }

    /// Derives a context that is cancelled with its parent and may be
    /// cancelled on its own. The deadline is inherited.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
            budget: self.budget,
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, `None` when there is no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns the terminal error if the context has already ended.
    pub fn err(&self) -> Option<SkeinError> {
        if self.token.is_cancelled() {
            return Some(SkeinError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(self.timeout_error()),
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Resolves when the context is cancelled or its deadline passes.
    pub async fn done(&self) -> SkeinError {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => SkeinError::Cancelled,
                    _ = tokio::time::sleep_until(deadline) => self.timeout_error(),
                }
            }
            None => {
                self.token.cancelled().await;
                SkeinError::Cancelled
            }
        }
    }

    /// Runs `fut` until it completes or the context ends, whichever is first.
    /// An already-ended context wins without polling `fut`.
    pub async fn run<F>(&self, fut: F) -> Result<F::Output, SkeinError>
    where
        F: Future,
    {
        tokio::select! {
            biased;
            err = self.done() => Err(err),
            out = fut => Ok(out),
        }
    }

    /// Sleeps for `duration` unless the context ends first.
    pub async fn sleep(&self, duration: Duration) -> Result<(), SkeinError> {
        self.run(tokio::time::sleep(duration)).await
    }

    fn timeout_error(&self) -> SkeinError {
        SkeinError::Timeout {
            duration: self.budget.unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn background_context_is_not_done() {
        let ctx = Context::background();
        assert!(!ctx.is_done());
        assert!(ctx.remaining().is_none());
        let out = ctx.run(async { 5 }).await.unwrap();
        assert_eq!(out, 5);
    }

    #[tokio::test]
    async fn cancelled_context_reports_cancelled() {
        let ctx = Context::background();
        ctx.cancel();
        assert!(matches!(ctx.err(), Some(SkeinError::Cancelled)));
        let res = ctx.run(std::future::pending::<()>()).await;
        assert!(matches!(res, Err(SkeinError::Cancelled)));
    }

    #[tokio::test]
    async fn child_is_cancelled_with_parent() {
        let parent = Context::background();
        let child = parent.child();
        parent.cancel();
        assert!(child.is_done());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_expires_into_timeout() {
        let ctx = Context::with_timeout(Duration::from_millis(100));
        let res = ctx.sleep(Duration::from_secs(10)).await;
        assert!(matches!(res, Err(SkeinError::Timeout { duration }) if duration == Duration::from_millis(100)));
        assert!(ctx.is_done());
    }

    #[tokio::test(start_paused = true)]
    async fn past_deadline_is_already_expired() {
        let ctx = Context::with_deadline(Instant::now() - Duration::from_secs(1));
        assert!(matches!(ctx.err(), Some(SkeinError::Timeout { .. })));
        let res = ctx.run(async { 1 }).await;
        assert!(res.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_completes_before_deadline() {
        let ctx = Context::with_timeout(Duration::from_secs(5));
        ctx.sleep(Duration::from_secs(1)).await.unwrap();
        assert!(ctx.remaining().unwrap() <= Duration::from_secs(4));
    }
}
