// SPDX-FileCopyrightText: 2026 Skein Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests for the complete ingestion pipeline.
//!
//! Each test builds its own pipeline against a `MockTransport`, so tests are
//! independent and order-insensitive.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use skein_core::{Context, EventId, HealthStatus, Operation, SkeinError};
use skein_hooks::{Hook, HookPriority};
use skein_ingest::{BackpressureLevel, IngestionPipeline, PipelineConfig, QueueState, Transport};
use skein_resilience::CircuitState;
use skein_test_utils::{events, test_config, MockTransport, RecordingHook, Reply, TestPipeline};

fn build(
    config: PipelineConfig,
    transport: &Arc<MockTransport>,
) -> skein_ingest::PipelineBuilder {
    IngestionPipeline::builder(config).transport(Arc::clone(transport) as Arc<dyn Transport>)
}

// ---- Circuit breaking across batches ----

#[tokio::test(start_paused = true)]
async fn circuit_opens_on_outage_and_recovers_after_cooldown() {
    let transport = Arc::new(MockTransport::new());
    transport.set_fallback(Reply::Status(503));

    let mut config = test_config();
    config.retry.max_retries = 0;
    config.circuit.failure_threshold = 2;
    config.circuit.cooldown = Duration::from_secs(5);

    let transitions = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&transitions);
    let pipeline = build(config, &transport)
        .on_circuit_transition(Arc::new(move |from: CircuitState, to: CircuitState| {
            seen.lock().unwrap().push((from, to));
        }))
        .build()
        .unwrap();
    let ctx = Context::background();

    for _ in 0..2 {
        pipeline.submit(events(1).remove(0)).unwrap();
        let err = pipeline.flush(&ctx).await.unwrap_err();
        assert_eq!(err.status(), Some(503));
    }
    assert_eq!(pipeline.circuit_state(), CircuitState::Open);
    assert!(matches!(pipeline.health(), HealthStatus::Unhealthy(_)));

    pipeline.submit(events(1).remove(0)).unwrap();
    let err = pipeline.flush(&ctx).await.unwrap_err();
    assert!(matches!(err, SkeinError::CircuitOpen { .. }), "got: {err}");
    assert_eq!(transport.calls(), 2, "open circuit must not reach the collector");

    transport.set_fallback(Reply::AcceptAll);
    tokio::time::sleep(Duration::from_secs(6)).await;

    pipeline.submit(events(1).remove(0)).unwrap();
    pipeline.flush(&ctx).await.unwrap();
    assert_eq!(pipeline.circuit_state(), CircuitState::Closed);
    assert_eq!(pipeline.health(), HealthStatus::Healthy);

    let transitions = transitions.lock().unwrap().clone();
    assert_eq!(transitions.first(), Some(&(CircuitState::Closed, CircuitState::Open)));
    assert_eq!(transitions.last(), Some(&(CircuitState::HalfOpen, CircuitState::Closed)));

    pipeline.close().await.unwrap();
}

// ---- Backpressure ----

#[tokio::test]
async fn backpressure_rises_with_depth_and_releases_blocked_producers() {
    let transport = Arc::new(MockTransport::new());
    let mut config = test_config();
    config.capacity = 20;
    config.batch_size = 20;

    let levels = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&levels);
    let pipeline = Arc::new(
        build(config, &transport)
            .on_level_change(Arc::new(move |level: BackpressureLevel, _: QueueState| {
                seen.lock().unwrap().push(level);
            }))
            .build()
            .unwrap(),
    );

    // One short of a full batch, so only the level changes.
    for event in events(19) {
        pipeline.submit(event).unwrap();
    }
    assert_eq!(pipeline.backpressure_level(), BackpressureLevel::Critical);
    assert!(matches!(pipeline.health(), HealthStatus::Degraded(_)));
    assert_eq!(
        *levels.lock().unwrap(),
        vec![
            BackpressureLevel::Elevated,
            BackpressureLevel::High,
            BackpressureLevel::Critical,
        ]
    );

    let blocked = {
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move {
            pipeline
                .submit_wait(events(1).remove(0), &Context::background())
                .await
        })
    };
    tokio::task::yield_now().await;
    assert!(!blocked.is_finished(), "critical level blocks producers");

    pipeline.flush(&Context::background()).await.unwrap();
    blocked.await.unwrap().unwrap();
    assert_eq!(levels.lock().unwrap().last(), Some(&BackpressureLevel::Normal));

    pipeline.close().await.unwrap();
    assert_eq!(transport.delivered_ids().len(), 20);
}

// ---- Async error stream ----

#[tokio::test]
async fn background_failures_reach_the_error_stream() {
    let test = TestPipeline::builder()
        .transport({
            let transport = MockTransport::new();
            transport.set_fallback(Reply::Status(400));
            transport
        })
        .build()
        .unwrap();

    let reporter = Arc::clone(test.pipeline.reporter());
    let consumer = tokio::spawn(async move {
        let mut received = Vec::new();
        while let Some(err) = reporter.recv().await {
            received.push(err);
        }
        received
    });

    let ids = test.submit_events(3).unwrap();
    let err = test.pipeline.flush(&Context::background()).await.unwrap_err();
    assert_eq!(err.status(), Some(400));

    test.pipeline.close().await.unwrap();
    let received = consumer.await.unwrap();

    assert_eq!(received.len(), 1);
    assert_eq!(received[0].operation, Operation::Flush);
    assert_eq!(received[0].event_ids, ids);
    assert!(!received[0].retryable);
    assert_eq!(received[0].cause.status(), Some(400));
    assert_eq!(test.transport.calls(), 1);
}

// ---- Concurrency ----

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_producers_deliver_every_event_once() {
    let test = Arc::new(
        TestPipeline::builder()
            .configure(|config| {
                config.capacity = 1_000;
                config.batch_size = 25;
                config.delivery_workers = 4;
            })
            .build()
            .unwrap(),
    );

    let producers: Vec<_> = (0..8)
        .map(|_| {
            let test = Arc::clone(&test);
            tokio::spawn(async move { test.submit_events(100) })
        })
        .collect();

    let mut submitted = Vec::new();
    for producer in producers {
        submitted.extend(producer.await.unwrap().unwrap());
    }
    test.pipeline.close().await.unwrap();

    let delivered = test.transport.delivered_ids();
    assert_eq!(delivered.len(), 800);
    let unique: HashSet<&EventId> = delivered.iter().collect();
    assert_eq!(unique.len(), 800, "no event is delivered twice");
    assert_eq!(unique, submitted.iter().collect::<HashSet<_>>());
    assert!(test.transport.batch_sizes().iter().all(|&n| n <= 25));

    let stats = test.pipeline.stats();
    assert_eq!(stats.events_delivered, 800);
    assert_eq!(stats.pending, 0);
}

// ---- Configuration to delivery ----

#[tokio::test]
async fn file_configuration_drives_batching_and_hooks() {
    let config = skein_config::load_and_validate_str(
        r#"
[client]
base_url = "http://collector.test"

[queue]
capacity = 50
batch_size = 4
overflow_policy = "reject"
"#,
    )
    .unwrap();

    let transport = Arc::new(MockTransport::new());
    let recorder = RecordingHook::new().with_header("x-source", "e2e");
    let pipeline = build(PipelineConfig::from_config(&config), &transport)
        .add_hook("recorder", Hook::both(recorder.clone()), HookPriority::Observational)
        .build()
        .unwrap();

    for event in events(10) {
        pipeline.submit(event).unwrap();
    }
    pipeline.close().await.unwrap();

    let mut sizes = transport.batch_sizes();
    sizes.sort_unstable();
    assert_eq!(sizes, vec![2, 4, 4]);
    assert_eq!(recorder.requests().len(), 3);
    assert!(
        transport
            .requests()
            .iter()
            .all(|r| r.headers.get("x-source").map(String::as_str) == Some("e2e"))
    );

    let err = pipeline.submit(events(1).remove(0)).unwrap_err();
    assert!(matches!(err, SkeinError::Closed));
}
