// SPDX-FileCopyrightText: 2026 Skein Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded FIFO buffer of pending events.
//!
//! The buffer and its closed flag sit behind one `std::sync::Mutex` that is
//! only held for the duration of a push or a batch split, never across an
//! `.await`.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use skein_core::{Batch, Event, OverflowPolicy, SkeinError};

/// Snapshot of queue occupancy, recomputed on every push and take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueState {
    pub depth: usize,
    pub capacity: usize,
    /// Depth at which backpressure leaves `Normal`.
    pub low_watermark: usize,
    /// Depth at which backpressure reaches `High`.
    pub high_watermark: usize,
}

impl QueueState {
    /// Occupancy in the range 0.0 to 1.0.
    pub fn utilization(&self) -> f64 {
        if self.capacity == 0 {
            return 1.0;
        }
        self.depth as f64 / self.capacity as f64
    }

    pub fn is_full(&self) -> bool {
        self.depth >= self.capacity
    }
}

/// Result of a successful push.
#[derive(Debug)]
pub enum Enqueued {
    /// The event was appended.
    Accepted,
    /// The event was appended after evicting the oldest pending event.
    Evicted(Event),
    /// The queue was full and the incoming event was discarded.
    Discarded(Event),
}

#[derive(Debug, Default)]
struct QueueInner {
    events: VecDeque<Event>,
    closed: bool,
}

/// Bounded event queue with a configurable overflow policy.
#[derive(Debug)]
pub struct EventQueue {
    inner: Mutex<QueueInner>,
    capacity: usize,
    policy: OverflowPolicy,
    low_watermark: usize,
    high_watermark: usize,
}

impl EventQueue {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                events: VecDeque::with_capacity(capacity.min(4096)),
                closed: false,
            }),
            capacity,
            policy,
            low_watermark: capacity,
            high_watermark: capacity,
        }
    }

    /// Sets the depths reported as watermarks in [`QueueState`].
    pub fn with_watermarks(mut self, low: usize, high: usize) -> Self {
        self.low_watermark = low;
        self.high_watermark = high;
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().events.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Appends an event, applying the queue's overflow policy when full.
    pub fn push(&self, event: Event) -> Result<Enqueued, SkeinError> {
        self.push_with(event, self.policy)
    }

    /// Appends an event, applying `policy` when full.
    pub fn push_with(&self, event: Event, policy: OverflowPolicy) -> Result<Enqueued, SkeinError> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(SkeinError::Closed);
        }

        if inner.events.len() < self.capacity {
            inner.events.push_back(event);
            return Ok(Enqueued::Accepted);
        }

        match policy {
            OverflowPolicy::Reject => Err(SkeinError::QueueFull {
                capacity: self.capacity,
            }),
            OverflowPolicy::DropNewest => Ok(Enqueued::Discarded(event)),
            OverflowPolicy::DropOldest => match inner.events.pop_front() {
                Some(oldest) => {
                    inner.events.push_back(event);
                    Ok(Enqueued::Evicted(oldest))
                }
                // Zero capacity: nothing to evict.
                None => Ok(Enqueued::Discarded(event)),
            },
        }
    }

    /// Removes the oldest pending event regardless of capacity.
    pub fn evict_oldest(&self) -> Option<Event> {
        self.lock().events.pop_front()
    }

    /// Removes up to `max` events from the front as one batch.
    pub fn take_batch(&self, max: usize) -> Option<Batch> {
        let mut inner = self.lock();
        let n = inner.events.len().min(max);
        if n == 0 {
            return None;
        }
        let events: Vec<Event> = inner.events.drain(..n).collect();
        Some(Batch::new(events))
    }

    /// Puts events back at the front, preserving their order.
    ///
    /// Used when an in-flight batch is abandoned. Capacity is not enforced
    /// here; the queue may briefly exceed it until the next drain. Works on
    /// a closed queue.
    pub fn requeue_front(&self, events: Vec<Event>) {
        let mut inner = self.lock();
        for event in events.into_iter().rev() {
            inner.events.push_front(event);
        }
    }

    /// Stops accepting new events. Returns `true` on the first call.
    pub fn close(&self) -> bool {
        let mut inner = self.lock();
        let was_open = !inner.closed;
        inner.closed = true;
        was_open
    }

    pub fn state(&self) -> QueueState {
        QueueState {
            depth: self.len(),
            capacity: self.capacity,
            low_watermark: self.low_watermark,
            high_watermark: self.high_watermark,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
