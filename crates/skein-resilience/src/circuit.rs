// SPDX-FileCopyrightText: 2026 Skein Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Circuit breaker for the delivery path.
//!
//! ```text
//!            failures >= threshold
//!   CLOSED ───────────────────────────▶ OPEN
//!     ▲                                  │  ▲
//!     │ trial succeeds        cooldown   │  │ trial fails
//!     │                       elapsed    ▼  │
//!     └───────────────────────────── HALF-OPEN
//!                                (one trial at a time)
//! ```
//!
//! State lives behind a short-held `std::sync::Mutex` that is never held
//! across an `.await`. Callers obtain a [`CircuitPermit`] from
//! [`CircuitBreaker::acquire`] and settle it with the attempt's outcome.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use skein_core::SkeinError;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// Time spent Open before a trial call is admitted.
    pub cooldown: Duration,
    /// Optional failure ratio (0.0 to 1.0) that also opens the circuit.
    pub failure_rate_threshold: Option<f64>,
    /// Calls observed before the failure ratio is considered.
    pub min_requests_for_rate: u32,
    /// Most recent calls the failure ratio is computed over.
    pub rate_window: u32,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
            failure_rate_threshold: None,
            min_requests_for_rate: 10,
            rate_window: 100,
        }
    }
}

impl CircuitConfig {
    pub fn validate(&self) -> Result<(), SkeinError> {
        if self.failure_threshold == 0 {
            return Err(SkeinError::Config(
                "circuit failure_threshold must be at least 1".into(),
            ));
        }
        if let Some(rate) = self.failure_rate_threshold
            && !(rate > 0.0 && rate <= 1.0)
        {
            return Err(SkeinError::Config(format!(
                "circuit failure_rate_threshold must be in (0, 1], got {rate}"
            )));
        }
        if self.rate_window < self.min_requests_for_rate.max(1) {
            return Err(SkeinError::Config(format!(
                "circuit rate_window ({}) must be at least min_requests_for_rate ({}) and nonzero",
                self.rate_window, self.min_requests_for_rate
            )));
        }
        Ok(())
    }
}

/// Current state of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitState {
    /// Normal operation, all calls admitted.
    Closed,
    /// Downstream considered unhealthy, calls fail fast.
    Open,
    /// Testing recovery with a single trial call.
    HalfOpen,
}

impl CircuitState {
    /// Numeric encoding used for the state gauge.
    pub fn as_gauge(self) -> f64 {
        match self {
            Self::Closed => 0.0,
            Self::Open => 1.0,
            Self::HalfOpen => 2.0,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Point-in-time copy of a breaker's state for health checks.
#[derive(Debug, Clone)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    /// Calls in the failure-rate window.
    pub total_requests: u32,
    /// Failures in the failure-rate window.
    pub failed_requests: u32,
    pub last_transition: Instant,
    pub opened_at: Option<Instant>,
    pub trial_in_flight: bool,
}

impl CircuitSnapshot {
    /// Failure ratio over the current measurement window (0.0 to 1.0).
    pub fn failure_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            f64::from(self.failed_requests) / f64::from(self.total_requests)
        }
    }
}

/// Invoked with `(from, to)` after every state transition.
pub type TransitionCallback = Arc<dyn Fn(CircuitState, CircuitState) + Send + Sync>;

#[derive(Debug)]
struct CircuitInner {
    state: CircuitState,
    consecutive_failures: u32,
    /// Outcomes of the latest calls while Closed, `true` for a failure.
    window: VecDeque<bool>,
    failed_in_window: u32,
    last_transition: Instant,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

impl CircuitInner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            window: VecDeque::new(),
            failed_in_window: 0,
            last_transition: Instant::now(),
            opened_at: None,
            trial_in_flight: false,
        }
    }

    fn reset_counters(&mut self) {
        self.consecutive_failures = 0;
        self.window.clear();
        self.failed_in_window = 0;
    }

    fn push_outcome(&mut self, failed: bool, capacity: u32) {
        let capacity = capacity.max(1) as usize;
        while self.window.len() >= capacity {
            if self.window.pop_front() == Some(true) {
                self.failed_in_window -= 1;
            }
        }
        self.window.push_back(failed);
        if failed {
            self.failed_in_window += 1;
        }
    }

    fn window_len(&self) -> u32 {
        u32::try_from(self.window.len()).unwrap_or(u32::MAX)
    }

    fn snapshot(&self) -> CircuitSnapshot {
        CircuitSnapshot {
            state: self.state,
            consecutive_failures: self.consecutive_failures,
            total_requests: self.window_len(),
            failed_requests: self.failed_in_window,
            last_transition: self.last_transition,
            opened_at: self.opened_at,
            trial_in_flight: self.trial_in_flight,
        }
    }
}

type Transition = (CircuitState, CircuitState);

/// Thread-safe circuit breaker guarding one downstream.
pub struct CircuitBreaker {
    name: String,
    config: CircuitConfig,
    inner: Mutex<CircuitInner>,
    on_transition: Option<TransitionCallback>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}

impl CircuitBreaker {
    /// Creates a closed breaker.
    pub fn new(name: impl Into<String>, config: CircuitConfig) -> Self {
        let name = name.into();
        metrics::gauge!("skein_circuit_state", "breaker" => name.clone())
            .set(CircuitState::Closed.as_gauge());
        Self {
            name,
            config,
            inner: Mutex::new(CircuitInner::new()),
            on_transition: None,
        }
    }

    /// Registers a callback invoked after every state transition.
    pub fn with_transition_callback(mut self, callback: TransitionCallback) -> Self {
        self.on_transition = Some(callback);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitConfig {
        &self.config
    }

    /// Current state, without evaluating the cooldown.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        self.lock().snapshot()
    }

    /// Asks for admission of one call.
    ///
    /// In Closed every call is admitted. In Open the call fails fast until
    /// the cooldown has elapsed, at which point the breaker moves to
    /// HalfOpen and admits exactly one trial. Callers arriving while a
    /// trial is outstanding are rejected as if Open.
    pub fn acquire(&self) -> Result<CircuitPermit<'_>, SkeinError> {
        let mut transitions = Vec::new();
        let result = {
            let mut inner = self.lock();

            if inner.state == CircuitState::Open {
                let elapsed = inner
                    .opened_at
                    .map(|at| at.elapsed())
                    .unwrap_or(self.config.cooldown);
                if elapsed >= self.config.cooldown {
                    transitions.push(self.transition(&mut inner, CircuitState::HalfOpen));
                } else {
                    let retry_after = self.config.cooldown - elapsed;
                    drop(inner);
                    debug!(breaker = %self.name, ?retry_after, "circuit open, rejecting call");
                    return Err(self.open_error(Some(retry_after)));
                }
            }

            match inner.state {
                CircuitState::Closed => Ok(CircuitPermit::new(self, false)),
                CircuitState::HalfOpen if !inner.trial_in_flight => {
                    inner.trial_in_flight = true;
                    Ok(CircuitPermit::new(self, true))
                }
                _ => Err(self.open_error(None)),
            }
        };

        self.notify(transitions);
        if result.is_err() {
            metrics::counter!("skein_circuit_rejections_total", "breaker" => self.name.clone())
                .increment(1);
        }
        result
    }

    /// Runs `f` under the breaker, recording its outcome.
    ///
    /// A [`SkeinError::Cancelled`] returned by `f` releases the permit
    /// without counting as a downstream failure.
    pub async fn call<F, Fut, T>(&self, f: F) -> Result<T, SkeinError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, SkeinError>>,
    {
        let permit = self.acquire()?;
        match f().await {
            Ok(value) => {
                permit.success();
                Ok(value)
            }
            Err(SkeinError::Cancelled) => Err(SkeinError::Cancelled),
            Err(err) => {
                permit.failure();
                Err(err)
            }
        }
    }

    /// Forces the breaker back to Closed and clears all counters.
    pub fn reset(&self) {
        let transition = {
            let mut inner = self.lock();
            inner.reset_counters();
            inner.trial_in_flight = false;
            inner.opened_at = None;
            if inner.state == CircuitState::Closed {
                None
            } else {
                Some(self.transition(&mut inner, CircuitState::Closed))
            }
        };
        info!(breaker = %self.name, "circuit breaker manually reset");
        self.notify(transition.into_iter().collect());
    }

    fn record_success(&self, trial: bool) {
        let mut transitions = Vec::new();
        {
            let mut inner = self.lock();
            match inner.state {
                CircuitState::Closed => {
                    inner.push_outcome(false, self.config.rate_window);
                    inner.consecutive_failures = 0;
                }
                CircuitState::HalfOpen if trial => {
                    inner.trial_in_flight = false;
                    inner.reset_counters();
                    transitions.push(self.transition(&mut inner, CircuitState::Closed));
                }
                CircuitState::HalfOpen => {
                    debug!(breaker = %self.name, "ignoring stale success while half-open");
                }
                CircuitState::Open => {
                    warn!(breaker = %self.name, "recorded success for open circuit");
                }
            }
        }
        self.notify(transitions);
    }

    fn record_failure(&self, trial: bool) {
        let mut transitions = Vec::new();
        {
            let mut inner = self.lock();
            match inner.state {
                CircuitState::Closed => {
                    inner.push_outcome(true, self.config.rate_window);
                    inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
                    if self.should_open(&inner) {
                        transitions.push(self.transition(&mut inner, CircuitState::Open));
                    }
                }
                CircuitState::HalfOpen if trial => {
                    inner.trial_in_flight = false;
                    inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
                    transitions.push(self.transition(&mut inner, CircuitState::Open));
                }
                CircuitState::HalfOpen | CircuitState::Open => {}
            }
        }
        self.notify(transitions);
    }

    fn release_trial(&self) {
        let mut inner = self.lock();
        if inner.state == CircuitState::HalfOpen {
            inner.trial_in_flight = false;
        }
    }

    fn should_open(&self, inner: &CircuitInner) -> bool {
        if inner.consecutive_failures >= self.config.failure_threshold {
            return true;
        }

        match self.config.failure_rate_threshold {
            Some(rate) if inner.window_len() >= self.config.min_requests_for_rate.max(1) => {
                f64::from(inner.failed_in_window) / f64::from(inner.window_len()) >= rate
            }
            _ => false,
        }
    }

    fn transition(&self, inner: &mut CircuitInner, to: CircuitState) -> Transition {
        let from = inner.state;
        let now = Instant::now();
        inner.state = to;
        inner.last_transition = now;

        match to {
            CircuitState::Open => {
                inner.opened_at = Some(now);
                warn!(
                    breaker = %self.name,
                    consecutive_failures = inner.consecutive_failures,
                    cooldown = ?self.config.cooldown,
                    "circuit breaker opened"
                );
            }
            CircuitState::HalfOpen => {
                inner.trial_in_flight = false;
                info!(breaker = %self.name, "circuit breaker half-open, admitting trial call");
            }
            CircuitState::Closed => {
                inner.opened_at = None;
                info!(breaker = %self.name, "circuit breaker closed, downstream recovered");
            }
        }

        (from, to)
    }

    fn notify(&self, transitions: Vec<Transition>) {
        for (from, to) in transitions {
            metrics::gauge!("skein_circuit_state", "breaker" => self.name.clone())
                .set(to.as_gauge());
            metrics::counter!(
                "skein_circuit_transitions_total",
                "breaker" => self.name.clone(),
                "to" => to.to_string()
            )
            .increment(1);
            if let Some(callback) = &self.on_transition
                && std::panic::catch_unwind(AssertUnwindSafe(|| callback(from, to))).is_err()
            {
                error!(breaker = %self.name, %from, %to, "circuit transition callback panicked");
            }
        }
    }

    fn open_error(&self, retry_after: Option<Duration>) -> SkeinError {
        SkeinError::CircuitOpen {
            name: self.name.clone(),
            retry_after,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CircuitInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Admission granted by [`CircuitBreaker::acquire`].
///
/// Settle it with [`success`](Self::success) or [`failure`](Self::failure).
/// Dropping an unsettled trial permit frees the half-open trial slot
/// without recording an outcome.
#[must_use = "a permit must be settled with success() or failure()"]
pub struct CircuitPermit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl<'a> CircuitPermit<'a> {
    fn new(breaker: &'a CircuitBreaker, trial: bool) -> Self {
        Self {
            breaker,
            trial,
            settled: false,
        }
    }

    /// Whether this permit is the half-open trial call.
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn success(mut self) {
        self.settled = true;
        self.breaker.record_success(self.trial);
    }

    pub fn failure(mut self) {
        self.settled = true;
        self.breaker.record_failure(self.trial);
    }
}

impl Drop for CircuitPermit<'_> {
    fn drop(&mut self) {
        if !self.settled && self.trial {
            self.breaker.release_trial();
        }
    }
}
