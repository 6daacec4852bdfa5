// SPDX-FileCopyrightText: 2026 Skein Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery client tests: retry budget, error classification, circuit
//! breaking and cancellation.

use std::sync::Arc;
use std::time::Duration;

use skein_core::{Batch, Context, SkeinError};
use skein_hooks::{Hook, HookChain, HookPriority};
use skein_ingest::{DeliveryClient, RetryConfig, Transport};
use skein_resilience::{CircuitBreaker, CircuitConfig, CircuitState};
use skein_test_utils::{events, MockTransport, RecordingHook, Reply};

fn retry(max_retries: u32) -> RetryConfig {
    RetryConfig {
        max_retries,
        base_delay: Duration::from_millis(100),
        max_delay: Duration::from_secs(1),
    }
}

fn client(
    transport: &Arc<MockTransport>,
    circuit: CircuitConfig,
    hooks: HookChain,
    retry: RetryConfig,
) -> DeliveryClient {
    DeliveryClient::new(
        Arc::clone(transport) as Arc<dyn Transport>,
        Arc::new(CircuitBreaker::new("test", circuit)),
        Arc::new(hooks),
        retry,
    )
}

fn lenient_circuit() -> CircuitConfig {
    CircuitConfig {
        failure_threshold: 100,
        ..CircuitConfig::default()
    }
}

#[tokio::test(start_paused = true)]
async fn retryable_status_uses_whole_budget() {
    let transport = Arc::new(MockTransport::new());
    transport.set_fallback(Reply::Status(503));
    let delivery = client(&transport, lenient_circuit(), HookChain::empty(), retry(3));
    let started = tokio::time::Instant::now();

    let err = delivery
        .deliver(&Batch::new(events(2)), &Context::background())
        .await
        .unwrap_err();

    assert!(matches!(err, SkeinError::Api { status: 503, .. }));
    assert_eq!(transport.calls(), 4, "one attempt plus three retries");
    // 100ms + 200ms + 400ms of backoff.
    assert!(started.elapsed() >= Duration::from_millis(700));
}

#[tokio::test(start_paused = true)]
async fn client_error_is_not_retried() {
    let transport = Arc::new(MockTransport::with_replies([Reply::Status(400)]));
    let delivery = client(&transport, lenient_circuit(), HookChain::empty(), retry(3));

    let err = delivery
        .deliver(&Batch::new(events(1)), &Context::background())
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(400));
    assert_eq!(transport.calls(), 1);
    assert_eq!(delivery.breaker().snapshot().consecutive_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn timeout_then_success_counts_attempts() {
    let transport = Arc::new(MockTransport::with_replies([Reply::Error(
        SkeinError::Timeout {
            duration: Duration::from_secs(10),
        },
    )]));
    let delivery = client(&transport, lenient_circuit(), HookChain::empty(), retry(3));

    let report = delivery
        .deliver(&Batch::new(events(3)), &Context::background())
        .await
        .unwrap();

    assert_eq!(report.attempts, 2);
    assert_eq!(report.succeeded.len(), 3);
    assert!(report.failed.is_empty());
}

#[tokio::test(start_paused = true)]
async fn cancellation_during_backoff_stops_retrying() {
    let transport = Arc::new(MockTransport::new());
    transport.set_fallback(Reply::Status(503));
    let delivery = client(
        &transport,
        lenient_circuit(),
        HookChain::empty(),
        RetryConfig {
            max_retries: 5,
            base_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(60),
        },
    );

    let ctx = Context::with_timeout(Duration::from_secs(5));
    let err = delivery
        .deliver(&Batch::new(events(1)), &ctx)
        .await
        .unwrap_err();

    assert!(err.is_cancellation(), "got: {err}");
    assert_eq!(transport.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn open_circuit_fails_fast_without_calling_transport() {
    let transport = Arc::new(MockTransport::new());
    transport.set_fallback(Reply::Status(503));
    let circuit = CircuitConfig {
        failure_threshold: 2,
        cooldown: Duration::from_secs(30),
        ..CircuitConfig::default()
    };
    let delivery = client(&transport, circuit, HookChain::empty(), retry(0));
    let ctx = Context::background();

    for _ in 0..2 {
        let err = delivery.deliver(&Batch::new(events(1)), &ctx).await.unwrap_err();
        assert_eq!(err.status(), Some(503));
    }
    assert_eq!(delivery.breaker().state(), CircuitState::Open);

    let err = delivery.deliver(&Batch::new(events(1)), &ctx).await.unwrap_err();
    assert!(matches!(err, SkeinError::CircuitOpen { .. }));
    assert_eq!(transport.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn circuit_recovers_through_half_open_trial() {
    let transport = Arc::new(MockTransport::with_replies([Reply::Status(503)]));
    let circuit = CircuitConfig {
        failure_threshold: 1,
        cooldown: Duration::from_secs(5),
        ..CircuitConfig::default()
    };
    let delivery = client(&transport, circuit, HookChain::empty(), retry(0));
    let ctx = Context::background();

    delivery.deliver(&Batch::new(events(1)), &ctx).await.unwrap_err();
    assert_eq!(delivery.breaker().state(), CircuitState::Open);

    tokio::time::sleep(Duration::from_secs(6)).await;
    let report = delivery.deliver(&Batch::new(events(1)), &ctx).await.unwrap();
    assert!(report.is_complete_success());
    assert_eq!(delivery.breaker().state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn hooks_see_every_attempt() {
    let transport = Arc::new(MockTransport::with_replies([Reply::Status(502)]));
    let recorder = RecordingHook::new().with_header("x-attempt-source", "test");
    let hooks = HookChain::builder()
        .add_hook("recorder", Hook::both(recorder.clone()), HookPriority::Observational)
        .build()
        .unwrap();
    let delivery = client(&transport, lenient_circuit(), hooks, retry(2));

    delivery
        .deliver(&Batch::new(events(2)), &Context::background())
        .await
        .unwrap();

    let attempts: Vec<u32> = recorder.requests().iter().map(|r| r.attempt).collect();
    assert_eq!(attempts, vec![1, 2]);

    let responses = recorder.responses();
    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0].status, Some(502));
    assert!(!responses[0].is_success());
    assert_eq!(responses[1].status, Some(200));
    assert_eq!(responses[1].succeeded, 2);

    assert!(
        transport
            .requests()
            .iter()
            .all(|r| r.headers.get("x-attempt-source").map(String::as_str) == Some("test"))
    );
}
