// SPDX-FileCopyrightText: 2026 Skein Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue-depth backpressure levels and producer decisions.
//!
//! The monitor maps queue utilization onto four levels using strictly
//! increasing thresholds. The level is recomputed on every depth change,
//! but observers are only called when the level actually changes.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use skein_core::{Decision, SkeinError};
use tokio::sync::Notify;
use tokio::sync::futures::Notified;
use tracing::{error, info};

use crate::queue::QueueState;
use crate::recording;

/// Severity of queue pressure, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum BackpressureLevel {
    Normal = 0,
    Elevated = 1,
    High = 2,
    Critical = 3,
}

impl BackpressureLevel {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Normal,
            1 => Self::Elevated,
            2 => Self::High,
            _ => Self::Critical,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Elevated => "elevated",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for BackpressureLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Utilization fractions at which each level begins.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackpressureThresholds {
    pub elevated: f64,
    pub high: f64,
    pub critical: f64,
}

impl Default for BackpressureThresholds {
    fn default() -> Self {
        Self {
            elevated: 0.5,
            high: 0.8,
            critical: 0.95,
        }
    }
}

impl BackpressureThresholds {
    /// Thresholds must lie in (0, 1] and be strictly increasing.
    pub fn validate(&self) -> Result<(), SkeinError> {
        let ordered = [self.elevated, self.high, self.critical];
        if ordered.iter().any(|t| !(*t > 0.0 && *t <= 1.0)) {
            return Err(SkeinError::Config(format!(
                "backpressure thresholds must be in (0, 1], got {ordered:?}"
            )));
        }
        if !(self.elevated < self.high && self.high < self.critical) {
            return Err(SkeinError::Config(format!(
                "backpressure thresholds must be strictly increasing, got {ordered:?}"
            )));
        }
        Ok(())
    }

    pub fn level_for(&self, utilization: f64) -> BackpressureLevel {
        if utilization >= self.critical {
            BackpressureLevel::Critical
        } else if utilization >= self.high {
            BackpressureLevel::High
        } else if utilization >= self.elevated {
            BackpressureLevel::Elevated
        } else {
            BackpressureLevel::Normal
        }
    }

    /// Queue depth at which `fraction` of `capacity` is reached.
    pub fn depth_at(fraction: f64, capacity: usize) -> usize {
        (fraction * capacity as f64).ceil() as usize
    }
}

/// Decision handed to producers at each level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelPolicy {
    pub normal: Decision,
    pub elevated: Decision,
    pub high: Decision,
    pub critical: Decision,
}

impl Default for LevelPolicy {
    fn default() -> Self {
        Self {
            normal: Decision::Proceed,
            elevated: Decision::Proceed,
            high: Decision::Proceed,
            critical: Decision::Block,
        }
    }
}

impl LevelPolicy {
    pub fn decision_for(&self, level: BackpressureLevel) -> Decision {
        match level {
            BackpressureLevel::Normal => self.normal,
            BackpressureLevel::Elevated => self.elevated,
            BackpressureLevel::High => self.high,
            BackpressureLevel::Critical => self.critical,
        }
    }
}

/// Called with the new level and queue state on each level change.
pub type LevelCallback = Arc<dyn Fn(BackpressureLevel, QueueState) + Send + Sync>;

/// Edge-triggered backpressure monitor.
pub struct BackpressureMonitor {
    thresholds: BackpressureThresholds,
    policy: LevelPolicy,
    level: AtomicU8,
    transitions: AtomicU64,
    changed: Notify,
    callback: Option<LevelCallback>,
}

impl std::fmt::Debug for BackpressureMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackpressureMonitor")
            .field("thresholds", &self.thresholds)
            .field("policy", &self.policy)
            .field("level", &self.level())
            .finish()
    }
}

impl BackpressureMonitor {
    pub fn new(thresholds: BackpressureThresholds, policy: LevelPolicy) -> Result<Self, SkeinError> {
        thresholds.validate()?;
        Ok(Self {
            thresholds,
            policy,
            level: AtomicU8::new(BackpressureLevel::Normal as u8),
            transitions: AtomicU64::new(0),
            changed: Notify::new(),
            callback: None,
        })
    }

    pub fn with_callback(mut self, callback: LevelCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn thresholds(&self) -> &BackpressureThresholds {
        &self.thresholds
    }

    pub fn level(&self) -> BackpressureLevel {
        BackpressureLevel::from_u8(self.level.load(Ordering::Acquire))
    }

    pub fn decision(&self) -> Decision {
        self.policy.decision_for(self.level())
    }

    /// Number of level changes observed so far.
    pub fn transitions(&self) -> u64 {
        self.transitions.load(Ordering::Relaxed)
    }

    /// Recomputes the level for `state`.
    ///
    /// Returns the new level when it differs from the previous one. The
    /// callback runs only in that case; a panic inside it is contained.
    pub fn update(&self, state: QueueState) -> Option<BackpressureLevel> {
        let next = self.thresholds.level_for(state.utilization());
        let previous = BackpressureLevel::from_u8(self.level.swap(next as u8, Ordering::AcqRel));
        if previous == next {
            return None;
        }

        self.transitions.fetch_add(1, Ordering::Relaxed);
        recording::set_backpressure_level(next);
        info!(
            from = %previous,
            to = %next,
            depth = state.depth,
            capacity = state.capacity,
            "backpressure level changed"
        );

        if let Some(callback) = &self.callback
            && std::panic::catch_unwind(AssertUnwindSafe(|| callback(next, state))).is_err()
        {
            error!(level = %next, "backpressure callback panicked");
        }

        self.changed.notify_waiters();
        Some(next)
    }

    /// Updates from `read` until the stored level agrees with a fresh read.
    ///
    /// Concurrent callers can store levels out of order. Each caller checks
    /// again after its own store, so the last one to finish leaves a level
    /// computed from the queue as it last saw it.
    pub fn settle(&self, mut read: impl FnMut() -> QueueState) -> QueueState {
        let mut state = read();
        loop {
            self.update(state);
            let fresh = read();
            if self.level() == self.thresholds.level_for(fresh.utilization()) {
                return fresh;
            }
            state = fresh;
        }
    }

    /// Future resolving at the next level change.
    ///
    /// Create it before checking [`decision`](Self::decision) so a change
    /// between the check and the await is not missed.
    pub fn changed(&self) -> Notified<'_> {
        self.changed.notified()
    }
}
