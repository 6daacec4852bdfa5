// SPDX-FileCopyrightText: 2026 Skein Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted in-memory transport.
//!
//! `MockTransport` implements [`Transport`] by popping replies from a FIFO
//! script. When the script is empty it falls back to a default reply,
//! which accepts every event unless changed.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use skein_core::{EventFailure, EventId, IngestionRequest, IngestionResponse, SkeinError};
use skein_hooks::RequestContext;
use skein_ingest::{Transport, TransportResponse};

/// One scripted transport outcome.
#[derive(Debug, Clone)]
pub enum Reply {
    /// 200 with every event accepted.
    AcceptAll,
    /// 207 rejecting the listed events with `status`; the rest succeed.
    Reject { ids: Vec<EventId>, status: u16 },
    /// A collector-level failure with this status, e.g. 503 or 400.
    Status(u16),
    /// Any transport error.
    Error(SkeinError),
}

/// A request as the transport saw it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub request: IngestionRequest,
    pub attempt: u32,
    pub headers: BTreeMap<String, String>,
}

/// In-memory [`Transport`] with scripted replies and request capture.
pub struct MockTransport {
    script: Mutex<VecDeque<Reply>>,
    fallback: Mutex<Reply>,
    delay: Mutex<Option<Duration>>,
    requests: Mutex<Vec<RecordedRequest>>,
    delivered: Mutex<Vec<EventId>>,
    calls: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(Reply::AcceptAll),
            delay: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
            delivered: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Queue replies for the next calls, in order.
    pub fn with_replies(replies: impl IntoIterator<Item = Reply>) -> Self {
        let transport = Self::new();
        transport.push_replies(replies);
        transport
    }

    pub fn push_reply(&self, reply: Reply) {
        lock(&self.script).push_back(reply);
    }

    pub fn push_replies(&self, replies: impl IntoIterator<Item = Reply>) {
        lock(&self.script).extend(replies);
    }

    /// Reply used once the script runs out.
    pub fn set_fallback(&self, reply: Reply) {
        *lock(&self.fallback) = reply;
    }

    /// Make every call take `delay` before answering.
    pub fn set_delay(&self, delay: Duration) {
        *lock(&self.delay) = Some(delay);
    }

    /// Number of `send` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.requests).clone()
    }

    /// Sizes of every batch sent, in call order.
    pub fn batch_sizes(&self) -> Vec<usize> {
        lock(&self.requests)
            .iter()
            .map(|r| r.request.events.len())
            .collect()
    }

    /// Ids of every event the transport accepted, in delivery order.
    ///
    /// Only counts calls that ended in a 200/207 reply.
    pub fn delivered_ids(&self) -> Vec<EventId> {
        lock(&self.delivered).clone()
    }

    fn next_reply(&self) -> Reply {
        lock(&self.script)
            .pop_front()
            .unwrap_or_else(|| lock(&self.fallback).clone())
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(
        &self,
        request: &IngestionRequest,
        ctx: &RequestContext,
    ) -> Result<TransportResponse, SkeinError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.requests).push(RecordedRequest {
            request: request.clone(),
            attempt: ctx.attempt,
            headers: ctx.headers.clone(),
        });

        let delay = *lock(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let response = match self.next_reply() {
            Reply::AcceptAll => TransportResponse {
                status: 200,
                body: IngestionResponse::accept_all(request),
            },
            Reply::Reject { ids, status } => {
                let rejected: HashSet<&EventId> = ids.iter().collect();
                let mut body = IngestionResponse::accept_all(request);
                body.successes.retain(|s| !rejected.contains(&s.id));
                body.errors = request
                    .events
                    .iter()
                    .filter(|e| rejected.contains(e.id()))
                    .map(|e| EventFailure {
                        id: e.id().clone(),
                        status,
                        message: Some("rejected by mock".to_string()),
                    })
                    .collect();
                TransportResponse { status: 207, body }
            }
            Reply::Status(status) => {
                return Err(SkeinError::api(status, format!("mock status {status}")));
            }
            Reply::Error(err) => return Err(err),
        };

        lock(&self.delivered).extend(response.body.successes.iter().map(|s| s.id.clone()));
        Ok(response)
    }
}
