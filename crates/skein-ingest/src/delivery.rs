// SPDX-FileCopyrightText: 2026 Skein Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retrying batch delivery.
//!
//! Every attempt runs the before-request hooks, asks the circuit breaker
//! for admission, calls the transport, then runs the after-response hooks.
//! Retryable failures back off exponentially. Every await inside an
//! attempt ends early once the caller's [`Context`] is done.

use std::sync::Arc;
use std::time::Duration;

use skein_core::{Batch, Context, DeliveryReport, IngestionRequest, SkeinError};
use skein_hooks::{HookChain, RequestContext, ResponseContext};
use skein_resilience::CircuitBreaker;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::recording;
use crate::transport::{Transport, TransportResponse};

/// Retry policy for one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Additional attempts after the first one.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// Wait after the `attempt`-th failure (1-based): `base * 2^(attempt-1)`,
    /// capped at `max_delay`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = 2u32.checked_pow(exponent).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Whether the retry loop should try the same batch again after `err`.
///
/// Hook aborts, open circuits and cancellations stop the loop even when
/// the error itself is classified as retryable.
pub fn should_retry(err: &SkeinError) -> bool {
    match err {
        SkeinError::Hook { .. } | SkeinError::CircuitOpen { .. } | SkeinError::Cancelled => false,
        other => other.is_retryable(),
    }
}

/// Delivers batches through hooks, the circuit breaker and a transport.
pub struct DeliveryClient {
    transport: Arc<dyn Transport>,
    breaker: Arc<CircuitBreaker>,
    hooks: Arc<HookChain>,
    retry: RetryConfig,
}

impl std::fmt::Debug for DeliveryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryClient")
            .field("breaker", &self.breaker)
            .field("hooks", &self.hooks)
            .field("retry", &self.retry)
            .finish()
    }
}

impl DeliveryClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        breaker: Arc<CircuitBreaker>,
        hooks: Arc<HookChain>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            transport,
            breaker,
            hooks,
            retry,
        }
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn hooks(&self) -> &Arc<HookChain> {
        &self.hooks
    }

    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }

    /// Delivers `batch`, retrying retryable failures.
    ///
    /// Returns the per-event outcome on any 200/207 response. If `ctx` ends
    /// during a before-request hook, a transport call or a backoff wait, its
    /// cancellation error is returned instead of the last transport error.
    pub async fn deliver(&self, batch: &Batch, ctx: &Context) -> Result<DeliveryReport, SkeinError> {
        let request = IngestionRequest::from(batch);
        let started = Instant::now();
        let mut attempt = 0u32;

        loop {
            if let Some(err) = ctx.err() {
                return Err(err);
            }
            attempt += 1;

            match self.attempt(batch, &request, attempt, ctx).await {
                Ok(response) => {
                    let report =
                        DeliveryReport::from_response(batch.id().clone(), response.body, attempt);
                    recording::record_delivery_latency(started.elapsed().as_secs_f64());
                    recording::record_batch("sent", report.succeeded.len(), report.failed.len());
                    if report.is_complete_success() {
                        debug!(
                            batch_id = %batch.id(),
                            events = batch.len(),
                            attempts = attempt,
                            "batch delivered"
                        );
                    } else {
                        warn!(
                            batch_id = %batch.id(),
                            succeeded = report.succeeded.len(),
                            failed = report.failed.len(),
                            "batch partially rejected"
                        );
                    }
                    return Ok(report);
                }
                Err(err) => {
                    if let Some(cancel) = ctx.err() {
                        info!(batch_id = %batch.id(), attempt, "delivery abandoned, context done");
                        return Err(cancel);
                    }

                    if !should_retry(&err) || attempt > self.retry.max_retries {
                        recording::record_delivery_latency(started.elapsed().as_secs_f64());
                        recording::record_batch("failed", 0, batch.len());
                        warn!(
                            batch_id = %batch.id(),
                            attempts = attempt,
                            error = %err,
                            "batch delivery failed"
                        );
                        return Err(err);
                    }

                    let delay = self.retry.backoff(attempt);
                    warn!(
                        batch_id = %batch.id(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "delivery attempt failed, will retry"
                    );
                    ctx.sleep(delay).await?;
                }
            }
        }
    }

    async fn attempt(
        &self,
        batch: &Batch,
        request: &IngestionRequest,
        attempt: u32,
        ctx: &Context,
    ) -> Result<TransportResponse, SkeinError> {
        let mut request_ctx = RequestContext::new(batch.id().clone(), attempt, batch.len());
        if let Err(err) = ctx.run(self.hooks.before_request(&mut request_ctx)).await? {
            recording::record_delivery_attempt("hook_abort");
            return Err(err);
        }

        let started = Instant::now();
        let result = self.admitted_send(request, &request_ctx, ctx).await;
        recording::record_delivery_attempt(match &result {
            Ok(_) => "success",
            Err(SkeinError::CircuitOpen { .. }) => "circuit_open",
            Err(_) => "failure",
        });

        let response_ctx = ResponseContext {
            batch_id: batch.id().clone(),
            attempt,
            status: match &result {
                Ok(response) => Some(response.status),
                Err(err) => err.status(),
            },
            elapsed: started.elapsed(),
            error: result.as_ref().err().cloned(),
            succeeded: result.as_ref().map_or(0, |r| r.body.successes.len()),
            failed: result.as_ref().map_or(0, |r| r.body.errors.len()),
        };
        // The attempt's outcome stands even if the context cuts these short;
        // a delivered batch must not be requeued.
        if ctx.run(self.hooks.after_response(&response_ctx)).await.is_err() {
            debug!(batch_id = %batch.id(), attempt, "after-response hooks abandoned, context done");
        }

        result
    }

    /// One transport call under the circuit breaker.
    ///
    /// Only failures that say something about the collector's health
    /// (retryable errors) count against the breaker. A cancelled call
    /// releases its permit without an outcome.
    async fn admitted_send(
        &self,
        request: &IngestionRequest,
        request_ctx: &RequestContext,
        ctx: &Context,
    ) -> Result<TransportResponse, SkeinError> {
        let permit = self.breaker.acquire()?;
        let result = ctx.run(self.transport.send(request, request_ctx)).await?;
        match &result {
            Ok(_) => permit.success(),
            Err(err) if err.is_retryable() => permit.failure(),
            Err(_) => permit.success(),
        }
        result
    }
}
