// SPDX-FileCopyrightText: 2026 Skein Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Non-blocking channel for failures that happen off the caller's path.
//!
//! Every background failure (batch send, flush, hook, shutdown, queue drop)
//! is handed to [`AsyncErrorReporter::handle`], which never blocks: when the
//! bounded buffer is full the error is counted as dropped instead.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use skein_core::{AsyncError, Operation};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{error, warn};

use crate::recording;

/// Default number of buffered async errors.
pub const DEFAULT_ERROR_BUFFER: usize = 100;

/// Called with the running dropped total whenever an error is dropped.
pub type OverflowCallback = Arc<dyn Fn(u64) + Send + Sync>;

/// Called synchronously for every handled error.
pub type ErrorCallback = Arc<dyn Fn(&AsyncError) + Send + Sync>;

/// Snapshot of reporter counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReporterStats {
    pub total: u64,
    pub dropped: u64,
    pub pending: usize,
    pub capacity: usize,
    pub by_operation: BTreeMap<Operation, u64>,
}

/// Bounded, drop-on-full async error channel.
pub struct AsyncErrorReporter {
    sender: Mutex<Option<mpsc::Sender<AsyncError>>>,
    receiver: tokio::sync::Mutex<mpsc::Receiver<AsyncError>>,
    capacity: usize,
    total: AtomicU64,
    dropped: AtomicU64,
    pending: AtomicUsize,
    by_operation: [AtomicU64; Operation::ALL.len()],
    on_overflow: Option<OverflowCallback>,
    on_error: Option<ErrorCallback>,
}

impl std::fmt::Debug for AsyncErrorReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncErrorReporter")
            .field("capacity", &self.capacity)
            .field("stats", &self.stats())
            .finish()
    }
}

impl Default for AsyncErrorReporter {
    fn default() -> Self {
        Self::new(DEFAULT_ERROR_BUFFER)
    }
}

impl AsyncErrorReporter {
    /// Creates a reporter buffering up to `capacity` errors (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            sender: Mutex::new(Some(tx)),
            receiver: tokio::sync::Mutex::new(rx),
            capacity,
            total: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            pending: AtomicUsize::new(0),
            by_operation: std::array::from_fn(|_| AtomicU64::new(0)),
            on_overflow: None,
            on_error: None,
        }
    }

    pub fn with_overflow_callback(mut self, callback: OverflowCallback) -> Self {
        self.on_overflow = Some(callback);
        self
    }

    pub fn with_error_callback(mut self, callback: ErrorCallback) -> Self {
        self.on_error = Some(callback);
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Records and buffers `err` without blocking.
    pub fn handle(&self, err: AsyncError) {
        self.total.fetch_add(1, Ordering::Relaxed);
        self.by_operation[op_index(err.operation)].fetch_add(1, Ordering::Relaxed);
        recording::record_async_error(err.operation);

        warn!(
            operation = %err.operation,
            retryable = err.retryable,
            events = err.event_ids.len(),
            error = %err.cause,
            "background operation failed"
        );

        if let Some(callback) = &self.on_error
            && std::panic::catch_unwind(AssertUnwindSafe(|| callback(&err))).is_err()
        {
            error!("async error callback panicked");
        }

        // Counted before sending so a concurrent receiver never sees pending underflow.
        self.pending.fetch_add(1, Ordering::AcqRel);
        let result = match self
            .sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
        {
            Some(tx) => tx.try_send(err).map_err(|e| match e {
                TrySendError::Full(_) => "buffer full",
                TrySendError::Closed(_) => "reporter closed",
            }),
            None => Err("reporter closed"),
        };
        if let Err(reason) = result {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            self.record_drop(reason);
        }
    }

    fn record_drop(&self, reason: &'static str) {
        let dropped = self.dropped.fetch_add(1, Ordering::AcqRel) + 1;
        recording::record_async_error_dropped();
        warn!(dropped, reason, "async error dropped");

        if let Some(callback) = &self.on_overflow
            && std::panic::catch_unwind(AssertUnwindSafe(|| callback(dropped))).is_err()
        {
            error!("async error overflow callback panicked");
        }
    }

    /// Removes and returns every buffered error without waiting.
    ///
    /// Returns an empty list if another task is currently inside
    /// [`recv`](Self::recv).
    pub fn drain(&self) -> Vec<AsyncError> {
        let Ok(mut rx) = self.receiver.try_lock() else {
            return Vec::new();
        };
        let mut drained = Vec::new();
        while let Ok(err) = rx.try_recv() {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            drained.push(err);
        }
        drained
    }

    /// Waits for the next error. Returns `None` once closed and empty.
    pub async fn recv(&self) -> Option<AsyncError> {
        let mut rx = self.receiver.lock().await;
        let err = rx.recv().await?;
        self.pending.fetch_sub(1, Ordering::AcqRel);
        Some(err)
    }

    /// Closes the channel. Buffered errors remain readable; later
    /// [`handle`](Self::handle) calls are counted as dropped. Returns `true`
    /// on the first call.
    pub fn close(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
            .is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_none()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Acquire)
    }

    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> ReporterStats {
        ReporterStats {
            total: self.total.load(Ordering::Relaxed),
            dropped: self.dropped(),
            pending: self.pending(),
            capacity: self.capacity,
            by_operation: Operation::ALL
                .iter()
                .map(|op| (*op, self.by_operation[op_index(*op)].load(Ordering::Relaxed)))
                .filter(|(_, n)| *n > 0)
                .collect(),
        }
    }
}

fn op_index(op: Operation) -> usize {
    match op {
        Operation::BatchSend => 0,
        Operation::Flush => 1,
        Operation::Hook => 2,
        Operation::Shutdown => 3,
        Operation::Queue => 4,
    }
}
