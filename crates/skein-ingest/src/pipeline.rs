// SPDX-FileCopyrightText: 2026 Skein Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The ingestion pipeline facade.
//!
//! Producers call [`IngestionPipeline::submit`]; a background scheduler
//! forms batches when the queue reaches the batch size or the flush
//! interval elapses, and hands them to the [`DeliveryClient`]. At most
//! `delivery_workers` batches are in flight at once.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use skein_config::SkeinConfig;
use skein_core::{
    AsyncError, Batch, Context, Decision, DeliveryReport, Event, HealthStatus, Operation,
    OverflowPolicy, SkeinError,
};
use skein_hooks::{Hook, HookChainBuilder, HookFailure, HookPriority, HookStats};
use skein_resilience::{CircuitBreaker, CircuitConfig, CircuitState, TransitionCallback};
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backpressure::{
    BackpressureLevel, BackpressureMonitor, BackpressureThresholds, LevelCallback, LevelPolicy,
};
use crate::delivery::{DeliveryClient, RetryConfig};
use crate::queue::{Enqueued, EventQueue, QueueState};
use crate::recording;
use crate::reporter::{AsyncErrorReporter, ErrorCallback, OverflowCallback, DEFAULT_ERROR_BUFFER};
use crate::transport::Transport;

/// Name of the circuit breaker guarding the ingestion endpoint.
pub const BREAKER_NAME: &str = "ingestion";

/// How long shutdown waits for cancelled background deliveries to hand
/// their batches back once its own deadline has passed.
const ABANDON_GRACE: Duration = Duration::from_millis(250);

/// Tunables for one pipeline instance.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub capacity: usize,
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub overflow_policy: OverflowPolicy,
    pub delivery_workers: usize,
    pub shutdown_timeout: Duration,
    pub retry: RetryConfig,
    pub circuit: CircuitConfig,
    pub thresholds: BackpressureThresholds,
    pub level_policy: LevelPolicy,
    pub error_buffer: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            batch_size: 100,
            flush_interval: Duration::from_secs(1),
            overflow_policy: OverflowPolicy::Reject,
            delivery_workers: 1,
            shutdown_timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
            circuit: CircuitConfig::default(),
            thresholds: BackpressureThresholds::default(),
            level_policy: LevelPolicy::default(),
            error_buffer: DEFAULT_ERROR_BUFFER,
        }
    }
}

impl PipelineConfig {
    /// Maps the validated file/env configuration onto pipeline tunables.
    pub fn from_config(config: &SkeinConfig) -> Self {
        let bp = &config.backpressure;
        Self {
            capacity: config.queue.capacity,
            batch_size: config.queue.batch_size,
            flush_interval: Duration::from_millis(config.queue.flush_interval_ms),
            overflow_policy: config.queue.overflow_policy,
            delivery_workers: config.queue.delivery_workers,
            shutdown_timeout: Duration::from_secs(config.shutdown.timeout_secs),
            retry: RetryConfig {
                max_retries: config.retry.max_retries,
                base_delay: Duration::from_millis(config.retry.base_delay_ms),
                max_delay: Duration::from_millis(config.retry.max_delay_ms),
            },
            circuit: CircuitConfig {
                failure_threshold: config.circuit.failure_threshold,
                cooldown: Duration::from_secs(config.circuit.cooldown_secs),
                failure_rate_threshold: config.circuit.failure_rate_threshold,
                min_requests_for_rate: config.circuit.min_requests_for_rate,
                rate_window: config.circuit.rate_window,
            },
            thresholds: BackpressureThresholds {
                elevated: bp.elevated_threshold,
                high: bp.high_threshold,
                critical: bp.critical_threshold,
            },
            level_policy: LevelPolicy {
                normal: bp.normal_decision,
                elevated: bp.elevated_decision,
                high: bp.high_decision,
                critical: bp.critical_decision,
            },
            error_buffer: config.errors.buffer_capacity,
        }
    }

    pub fn validate(&self) -> Result<(), SkeinError> {
        if self.batch_size == 0 {
            return Err(SkeinError::Config("batch_size must be at least 1".into()));
        }
        if self.capacity < self.batch_size {
            return Err(SkeinError::Config(format!(
                "queue capacity ({}) must be at least batch_size ({})",
                self.capacity, self.batch_size
            )));
        }
        if self.delivery_workers == 0 {
            return Err(SkeinError::Config("delivery_workers must be at least 1".into()));
        }
        if self.flush_interval.is_zero() {
            return Err(SkeinError::Config("flush_interval must be positive".into()));
        }
        if self.retry.base_delay > self.retry.max_delay {
            return Err(SkeinError::Config(
                "retry base_delay must not exceed max_delay".into(),
            ));
        }
        self.circuit.validate()?;
        self.thresholds.validate()
    }
}

/// Counters exposed by [`IngestionPipeline::stats`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub submitted: u64,
    pub dropped: u64,
    pub rejected: u64,
    pub batches_sent: u64,
    pub batches_failed: u64,
    pub events_delivered: u64,
    pub events_failed: u64,
    pub pending: usize,
}

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    dropped: AtomicU64,
    rejected: AtomicU64,
    batches_sent: AtomicU64,
    batches_failed: AtomicU64,
    events_delivered: AtomicU64,
    events_failed: AtomicU64,
    /// Events inside a delivery call right now.
    in_flight_events: AtomicUsize,
}

/// Builds an [`IngestionPipeline`].
pub struct PipelineBuilder {
    config: PipelineConfig,
    transport: Option<Arc<dyn Transport>>,
    hooks: Vec<(String, Hook, HookPriority)>,
    on_level_change: Option<LevelCallback>,
    on_async_error: Option<ErrorCallback>,
    on_error_overflow: Option<OverflowCallback>,
    on_circuit_transition: Option<TransitionCallback>,
}

impl PipelineBuilder {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            transport: None,
            hooks: Vec::new(),
            on_level_change: None,
            on_async_error: None,
            on_error_overflow: None,
            on_circuit_transition: None,
        }
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Registers a hook. Registration order fixes execution order.
    pub fn add_hook(mut self, name: impl Into<String>, hook: Hook, priority: HookPriority) -> Self {
        self.hooks.push((name.into(), hook, priority));
        self
    }

    pub fn on_level_change(mut self, callback: LevelCallback) -> Self {
        self.on_level_change = Some(callback);
        self
    }

    pub fn on_async_error(mut self, callback: ErrorCallback) -> Self {
        self.on_async_error = Some(callback);
        self
    }

    pub fn on_error_overflow(mut self, callback: OverflowCallback) -> Self {
        self.on_error_overflow = Some(callback);
        self
    }

    pub fn on_circuit_transition(mut self, callback: TransitionCallback) -> Self {
        self.on_circuit_transition = Some(callback);
        self
    }

    /// Validates the configuration and starts the batch scheduler.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn build(self) -> Result<IngestionPipeline, SkeinError> {
        self.config.validate()?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            SkeinError::Config("ingestion pipeline must be built inside a Tokio runtime".into())
        })?;
        let transport = self
            .transport
            .ok_or_else(|| SkeinError::Config("ingestion pipeline requires a transport".into()))?;
        let config = self.config;

        let mut reporter = AsyncErrorReporter::new(config.error_buffer);
        if let Some(callback) = self.on_async_error {
            reporter = reporter.with_error_callback(callback);
        }
        if let Some(callback) = self.on_error_overflow {
            reporter = reporter.with_overflow_callback(callback);
        }
        let reporter = Arc::new(reporter);

        let hook_reporter = Arc::clone(&reporter);
        let mut hooks = HookChainBuilder::new().on_failure(Arc::new(move |failure: &HookFailure| {
            hook_reporter.handle(
                AsyncError::new(Operation::Hook, failure.error.clone())
                    .with_context("hook", &failure.hook)
                    .with_context("phase", failure.phase)
                    .with_context("priority", failure.priority)
                    .with_context("panicked", failure.panicked),
            );
        }));
        for (name, hook, priority) in self.hooks {
            hooks = hooks.add_hook(name, hook, priority);
        }
        let hooks = Arc::new(hooks.build()?);

        let mut breaker = CircuitBreaker::new(BREAKER_NAME, config.circuit.clone());
        if let Some(callback) = self.on_circuit_transition {
            breaker = breaker.with_transition_callback(callback);
        }
        let delivery = DeliveryClient::new(
            transport,
            Arc::new(breaker),
            hooks,
            config.retry.clone(),
        );

        let mut monitor = BackpressureMonitor::new(config.thresholds, config.level_policy)?;
        if let Some(callback) = self.on_level_change {
            monitor = monitor.with_callback(callback);
        }

        let queue = EventQueue::new(config.capacity, config.overflow_policy).with_watermarks(
            BackpressureThresholds::depth_at(config.thresholds.elevated, config.capacity),
            BackpressureThresholds::depth_at(config.thresholds.high, config.capacity),
        );

        let shared = Arc::new(Shared {
            workers: Arc::new(Semaphore::new(config.delivery_workers)),
            queue,
            monitor,
            delivery,
            reporter,
            size_trigger: Notify::new(),
            last_drain: Mutex::new(Instant::now()),
            delivery_token: CancellationToken::new(),
            counters: Counters::default(),
            config,
        });

        let scheduler_token = CancellationToken::new();
        let scheduler = runtime.spawn(run_scheduler(Arc::clone(&shared), scheduler_token.clone()));

        info!(
            batch_size = shared.config.batch_size,
            capacity = shared.config.capacity,
            flush_interval_ms = shared.config.flush_interval.as_millis() as u64,
            workers = shared.config.delivery_workers,
            "ingestion pipeline started"
        );

        Ok(IngestionPipeline {
            shared,
            scheduler: Mutex::new(Some(scheduler)),
            scheduler_token,
            shutdown_lock: tokio::sync::Mutex::new(()),
            finished: AtomicBool::new(false),
        })
    }
}

/// State shared between the facade and the scheduler task.
struct Shared {
    config: PipelineConfig,
    queue: EventQueue,
    monitor: BackpressureMonitor,
    delivery: DeliveryClient,
    reporter: Arc<AsyncErrorReporter>,
    workers: Arc<Semaphore>,
    size_trigger: Notify,
    last_drain: Mutex<Instant>,
    /// Cancels batches handed off by the scheduler.
    delivery_token: CancellationToken,
    counters: Counters,
}

impl Shared {
    fn depth_changed(&self) -> QueueState {
        let state = self.monitor.settle(|| self.queue.state());
        recording::set_queue_depth(state.depth);
        state
    }

    fn touch_drain(&self) {
        *self
            .last_drain
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Instant::now();
    }

    fn next_timer_deadline(&self) -> Instant {
        *self
            .last_drain
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            + self.config.flush_interval
    }

    fn take_batch(&self) -> Option<Batch> {
        self.touch_drain();
        let batch = self.queue.take_batch(self.config.batch_size)?;
        self.depth_changed();
        Some(batch)
    }

    fn report_dropped(&self, event: Event, reason: &'static str) {
        self.counters.dropped.fetch_add(1, Ordering::Relaxed);
        recording::record_event_dropped(reason);
        self.reporter.handle(
            AsyncError::new(
                Operation::Queue,
                SkeinError::QueueFull {
                    capacity: self.config.capacity,
                },
            )
            .with_events(vec![event.id().clone()])
            .with_context("reason", reason)
            .with_retryable(false),
        );
    }

    /// Delivers one batch and accounts for its outcome.
    ///
    /// A batch abandoned because `ctx` ended goes back to the queue front.
    async fn deliver_batch(
        &self,
        batch: Batch,
        ctx: &Context,
        operation: Operation,
    ) -> Result<DeliveryReport, SkeinError> {
        let events = batch.len();
        self.counters.in_flight_events.fetch_add(events, Ordering::AcqRel);
        let outcome = self.delivery.deliver(&batch, ctx).await;
        self.counters.in_flight_events.fetch_sub(events, Ordering::AcqRel);

        match outcome {
            Ok(report) => {
                self.counters.batches_sent.fetch_add(1, Ordering::Relaxed);
                self.counters
                    .events_delivered
                    .fetch_add(report.succeeded.len() as u64, Ordering::Relaxed);
                if let Some(first) = report.failed.first() {
                    self.counters
                        .events_failed
                        .fetch_add(report.failed.len() as u64, Ordering::Relaxed);
                    let message = format!(
                        "{} of {} events rejected: {}",
                        report.failed.len(),
                        batch.len(),
                        first.message.as_deref().unwrap_or("no message")
                    );
                    self.reporter.handle(
                        AsyncError::new(operation, SkeinError::api(first.status, message))
                            .with_events(report.failed_ids())
                            .with_context("batch_id", batch.id()),
                    );
                }
                Ok(report)
            }
            Err(err) if err.is_cancellation() && ctx.is_done() => {
                debug!(batch_id = %batch.id(), events = batch.len(), "returning abandoned batch to queue");
                self.queue.requeue_front(batch.into_events());
                self.depth_changed();
                Err(err)
            }
            Err(err) => {
                self.counters.batches_failed.fetch_add(1, Ordering::Relaxed);
                self.counters
                    .events_failed
                    .fetch_add(batch.len() as u64, Ordering::Relaxed);
                self.reporter.handle(
                    AsyncError::new(operation, err.clone())
                        .with_events(batch.event_ids())
                        .with_context("batch_id", batch.id())
                        .with_context("events", batch.len()),
                );
                Err(err)
            }
        }
    }

    /// Hands one batch to a background delivery task.
    ///
    /// Returns `false` when the scheduler is stopping or nothing is queued.
    async fn spawn_drain(self: &Arc<Self>, stop: &CancellationToken) -> bool {
        let permit = tokio::select! {
            biased;
            _ = stop.cancelled() => return false,
            permit = Arc::clone(&self.workers).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return false,
            },
        };
        let Some(batch) = self.take_batch() else {
            return false;
        };

        let shared = Arc::clone(self);
        let ctx = Context::with_token(self.delivery_token.child_token());
        tokio::spawn(async move {
            let _permit: OwnedSemaphorePermit = permit;
            let _ = shared.deliver_batch(batch, &ctx, Operation::BatchSend).await;
        });
        true
    }
}

async fn run_scheduler(shared: Arc<Shared>, stop: CancellationToken) {
    debug!("batch scheduler started");
    loop {
        let deadline = shared.next_timer_deadline();
        tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            _ = shared.size_trigger.notified() => {
                while shared.queue.len() >= shared.config.batch_size {
                    if !shared.spawn_drain(&stop).await {
                        break;
                    }
                }
            }
            _ = tokio::time::sleep_until(deadline) => {
                // An explicit flush since we started waiting moved the deadline.
                if Instant::now() < shared.next_timer_deadline() {
                    continue;
                }
                if shared.queue.is_empty() {
                    shared.touch_drain();
                    shared.depth_changed();
                } else {
                    shared.spawn_drain(&stop).await;
                }
            }
        }
    }
    debug!("batch scheduler stopped");
}

/// Resilient asynchronous ingestion pipeline.
pub struct IngestionPipeline {
    shared: Arc<Shared>,
    scheduler: Mutex<Option<JoinHandle<()>>>,
    scheduler_token: CancellationToken,
    shutdown_lock: tokio::sync::Mutex<()>,
    finished: AtomicBool,
}

impl std::fmt::Debug for IngestionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestionPipeline")
            .field("config", &self.shared.config)
            .field("queue", &self.shared.queue.state())
            .field("circuit", &self.circuit_state())
            .finish()
    }
}

impl IngestionPipeline {
    pub fn builder(config: PipelineConfig) -> PipelineBuilder {
        PipelineBuilder::new(config)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.shared.config
    }

    /// Enqueues an event without blocking.
    ///
    /// Fails with `Validation` for a malformed event, `Closed` after
    /// shutdown began, and `QueueFull` when the queue is at capacity under
    /// the `reject` policy. Events dropped by a drop policy or by the
    /// backpressure decision are reported asynchronously and the call
    /// succeeds.
    pub fn submit(&self, event: Event) -> Result<(), SkeinError> {
        let shared = &self.shared;
        if let Err(err) = event.validate() {
            return Err(self.rejected(err));
        }
        if shared.queue.is_closed() {
            return Err(self.rejected(SkeinError::Closed));
        }

        let outcome = match shared.monitor.decision() {
            Decision::DropNewest => Ok(Enqueued::Discarded(event)),
            Decision::DropOldest => {
                if let Some(oldest) = shared.queue.evict_oldest() {
                    shared.report_dropped(oldest, "backpressure");
                }
                shared.queue.push(event)
            }
            Decision::Proceed | Decision::Block => shared.queue.push(event),
        };

        match outcome {
            Ok(Enqueued::Accepted) => {
                shared.counters.submitted.fetch_add(1, Ordering::Relaxed);
                recording::record_event_submitted();
            }
            Ok(Enqueued::Evicted(oldest)) => {
                shared.counters.submitted.fetch_add(1, Ordering::Relaxed);
                recording::record_event_submitted();
                shared.report_dropped(oldest, "overflow");
            }
            Ok(Enqueued::Discarded(event)) => {
                let reason = if shared.queue.len() >= shared.config.capacity {
                    "overflow"
                } else {
                    "backpressure"
                };
                shared.report_dropped(event, reason);
            }
            Err(err) => return Err(self.rejected(err)),
        }

        let state = shared.depth_changed();
        if state.depth >= shared.config.batch_size {
            shared.size_trigger.notify_one();
        }
        Ok(())
    }

    /// Like [`submit`](Self::submit), but while backpressure says
    /// [`Decision::Block`] it waits for the level to drop first.
    pub async fn submit_wait(&self, event: Event, ctx: &Context) -> Result<(), SkeinError> {
        loop {
            let changed = self.shared.monitor.changed();
            if self.shared.monitor.decision() != Decision::Block || self.shared.queue.is_closed() {
                break;
            }
            ctx.run(changed).await?;
        }
        self.submit(event)
    }

    /// Forms and delivers one batch in the caller's task.
    ///
    /// Returns `Ok(None)` when the queue is empty.
    pub async fn drain_once(&self, ctx: &Context) -> Result<Option<DeliveryReport>, SkeinError> {
        self.drain_with(ctx, Operation::BatchSend).await
    }

    /// Delivers every pending event.
    ///
    /// Returns the first delivery error encountered; every failure is also
    /// reported asynchronously. Ends with the context's error if `ctx` is
    /// done first.
    pub async fn flush(&self, ctx: &Context) -> Result<(), SkeinError> {
        let mut first_error = None;
        loop {
            match self.drain_with(ctx, Operation::Flush).await {
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(err) => {
                    if let Some(cancel) = ctx.err() {
                        return Err(cancel);
                    }
                    first_error.get_or_insert(err);
                }
            }
        }
        self.wait_idle(ctx).await?;
        first_error.map_or(Ok(()), Err)
    }

    /// Stops accepting events and delivers what is left.
    ///
    /// If `ctx` ends with events still queued, returns
    /// [`SkeinError::Shutdown`] with their count. The async error reporter is
    /// closed before returning. Calling again after a successful shutdown
    /// is a no-op.
    pub async fn shutdown(&self, ctx: &Context) -> Result<(), SkeinError> {
        let _guard = self.shutdown_lock.lock().await;
        if self.finished.load(Ordering::Acquire) {
            return Ok(());
        }

        if self.shared.queue.close() {
            info!(pending = self.pending(), "shutting down ingestion pipeline");
        }
        self.scheduler_token.cancel();
        let scheduler = self
            .scheduler
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = scheduler {
            // The scheduler exits promptly once its token is cancelled.
            let _ = handle.await;
        }

        loop {
            match self.drain_with(ctx, Operation::Shutdown).await {
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(_) if ctx.is_done() => break,
                // Already reported; keep draining.
                Err(_) => {}
            }
        }

        if self.wait_idle(ctx).await.is_err() {
            // Abandon scheduler deliveries still in flight; they requeue.
            self.shared.delivery_token.cancel();
            let workers = self.shared.config.delivery_workers as u32;
            match tokio::time::timeout(ABANDON_GRACE, self.shared.workers.acquire_many(workers))
                .await
            {
                Ok(Ok(all)) => drop(all),
                Ok(Err(_)) => {}
                Err(_) => warn!(
                    in_flight = self.shared.counters.in_flight_events.load(Ordering::Acquire),
                    "background deliveries still running after cancellation"
                ),
            }
        }

        // Events stuck in a delivery that ignored cancellation are not in
        // the queue but were never sent either.
        let pending = self.shared.queue.len()
            + self.shared.counters.in_flight_events.load(Ordering::Acquire);
        if pending > 0 {
            let err = SkeinError::Shutdown {
                pending_events: pending,
            };
            warn!(pending, "shutdown deadline reached with events still queued");
            self.shared.reporter.handle(
                AsyncError::new(Operation::Shutdown, err.clone()).with_context("pending", pending),
            );
            self.shared.reporter.close();
            return Err(err);
        }

        self.shared.reporter.close();
        self.finished.store(true, Ordering::Release);
        info!(stats = ?self.stats(), "ingestion pipeline shut down");
        Ok(())
    }

    /// Shuts down with the configured timeout.
    pub async fn close(&self) -> Result<(), SkeinError> {
        self.shutdown(&Context::with_timeout(self.shared.config.shutdown_timeout))
            .await
    }

    pub fn pending(&self) -> usize {
        self.shared.queue.len()
    }

    pub fn queue_state(&self) -> QueueState {
        self.shared.queue.state()
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.shared.delivery.breaker().state()
    }

    pub fn circuit(&self) -> &Arc<CircuitBreaker> {
        self.shared.delivery.breaker()
    }

    pub fn backpressure_level(&self) -> BackpressureLevel {
        self.shared.monitor.level()
    }

    pub fn current_decision(&self) -> Decision {
        self.shared.monitor.decision()
    }

    pub fn reporter(&self) -> &Arc<AsyncErrorReporter> {
        &self.shared.reporter
    }

    pub fn hook_stats(&self) -> Vec<HookStats> {
        self.shared.delivery.hooks().stats()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.queue.is_closed()
    }

    /// Combines circuit state and backpressure level.
    pub fn health(&self) -> HealthStatus {
        if self.is_closed() {
            return HealthStatus::Unhealthy("pipeline is shut down".into());
        }
        match self.circuit_state() {
            CircuitState::Open => {
                return HealthStatus::Unhealthy("circuit breaker open".into());
            }
            CircuitState::HalfOpen => {
                return HealthStatus::Degraded("circuit breaker half-open".into());
            }
            CircuitState::Closed => {}
        }
        match self.backpressure_level() {
            level @ (BackpressureLevel::High | BackpressureLevel::Critical) => {
                HealthStatus::Degraded(format!("backpressure {level}"))
            }
            BackpressureLevel::Normal | BackpressureLevel::Elevated => HealthStatus::Healthy,
        }
    }

    pub fn stats(&self) -> PipelineStats {
        let c = &self.shared.counters;
        PipelineStats {
            submitted: c.submitted.load(Ordering::Relaxed),
            dropped: c.dropped.load(Ordering::Relaxed),
            rejected: c.rejected.load(Ordering::Relaxed),
            batches_sent: c.batches_sent.load(Ordering::Relaxed),
            batches_failed: c.batches_failed.load(Ordering::Relaxed),
            events_delivered: c.events_delivered.load(Ordering::Relaxed),
            events_failed: c.events_failed.load(Ordering::Relaxed),
            pending: self.pending(),
        }
    }

    fn rejected(&self, err: SkeinError) -> SkeinError {
        self.shared.counters.rejected.fetch_add(1, Ordering::Relaxed);
        recording::record_event_rejected(&err.kind().to_string());
        err
    }

    async fn drain_with(
        &self,
        ctx: &Context,
        operation: Operation,
    ) -> Result<Option<DeliveryReport>, SkeinError> {
        let permit = ctx
            .run(Arc::clone(&self.shared.workers).acquire_owned())
            .await?
            .map_err(|_| SkeinError::Closed)?;
        let Some(batch) = self.shared.take_batch() else {
            return Ok(None);
        };
        let result = self.shared.deliver_batch(batch, ctx, operation).await;
        drop(permit);
        result.map(Some)
    }

    /// Waits until no delivery is in flight.
    async fn wait_idle(&self, ctx: &Context) -> Result<(), SkeinError> {
        let workers = self.shared.config.delivery_workers as u32;
        let all = ctx
            .run(self.shared.workers.acquire_many(workers))
            .await?
            .map_err(|_| SkeinError::Closed)?;
        drop(all);
        Ok(())
    }
}

impl Drop for IngestionPipeline {
    fn drop(&mut self) {
        self.scheduler_token.cancel();
    }
}
