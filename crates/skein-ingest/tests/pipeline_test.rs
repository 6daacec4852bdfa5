// SPDX-FileCopyrightText: 2026 Skein Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end pipeline tests against the in-memory transport.

use std::time::Duration;

use skein_core::{Context, Event, EventId, EventType, HealthStatus, Operation, SkeinError};
use skein_hooks::{Hook, HookPriority};
use skein_test_utils::{
    FailingHook, MockTransport, PanickingHook, RecordingHook, Reply, SlowHook, TestPipeline,
};

/// Polls `cond` on the paused clock until it holds.
async fn wait_for(cond: impl Fn() -> bool) {
    for _ in 0..1_000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition not reached");
}

#[tokio::test(start_paused = true)]
async fn full_batches_are_sent_without_waiting_for_the_timer() {
    let test = TestPipeline::builder().build().unwrap();
    let started = tokio::time::Instant::now();

    test.submit_events(20).unwrap();
    wait_for(|| test.transport.calls() == 2).await;

    assert_eq!(test.transport.batch_sizes(), vec![10, 10]);
    assert_eq!(test.pipeline.pending(), 0);
    assert!(started.elapsed() < test.pipeline.config().flush_interval);
}

#[tokio::test(start_paused = true)]
async fn partial_batch_waits_for_flush_interval() {
    let test = TestPipeline::builder().build().unwrap();
    test.submit_events(1).unwrap();

    tokio::time::sleep(Duration::from_secs(59)).await;
    assert_eq!(test.transport.calls(), 0);
    assert_eq!(test.pipeline.pending(), 1);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(test.transport.batch_sizes(), vec![1]);
    assert_eq!(test.pipeline.pending(), 0);
}

#[tokio::test(start_paused = true)]
async fn remainder_below_batch_size_waits_for_the_timer() {
    let test = TestPipeline::builder().build().unwrap();

    test.submit_events(13).unwrap();
    wait_for(|| test.transport.calls() == 1).await;
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(test.transport.batch_sizes(), vec![10]);
    assert_eq!(test.pipeline.pending(), 3);
}

#[tokio::test(start_paused = true)]
async fn one_short_of_a_batch_sends_nothing_before_the_timer() {
    let test = TestPipeline::builder().build().unwrap();

    test.submit_events(9).unwrap();
    tokio::time::sleep(Duration::from_secs(59)).await;

    assert_eq!(test.transport.calls(), 0);
    assert_eq!(test.pipeline.pending(), 9);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(test.transport.batch_sizes(), vec![9]);
}

#[tokio::test(start_paused = true)]
async fn explicit_flush_restarts_the_flush_interval() {
    let test = TestPipeline::builder().build().unwrap();
    test.submit_events(1).unwrap();

    tokio::time::sleep(Duration::from_secs(50)).await;
    test.pipeline.flush(&Context::background()).await.unwrap();
    assert_eq!(test.transport.calls(), 1);

    test.submit_events(1).unwrap();
    // Past the deadline the timer had before the flush.
    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(test.transport.calls(), 1);
    assert_eq!(test.pipeline.pending(), 1);

    // A full interval after the flush.
    tokio::time::sleep(Duration::from_secs(50)).await;
    assert_eq!(test.transport.batch_sizes(), vec![1, 1]);
    assert_eq!(test.pipeline.pending(), 0);
}

#[tokio::test(start_paused = true)]
async fn flush_delivers_everything_in_order() {
    let test = TestPipeline::builder().build().unwrap();
    let ids = test.submit_events(25).unwrap();

    test.pipeline.flush(&Context::background()).await.unwrap();

    assert_eq!(test.pipeline.pending(), 0);
    assert_eq!(test.transport.delivered_ids(), ids);
    let mut sizes = test.transport.batch_sizes();
    sizes.sort_unstable();
    assert_eq!(sizes, vec![5, 10, 10]);

    let stats = test.pipeline.stats();
    assert_eq!(stats.submitted, 25);
    assert_eq!(stats.events_delivered, 25);
    assert_eq!(stats.batches_sent, 3);
}

#[tokio::test(start_paused = true)]
async fn invalid_event_is_rejected_synchronously() {
    let test = TestPipeline::builder().build().unwrap();

    let err = test
        .pipeline
        .submit(Event::with_id(
            EventId::from(""),
            EventType::TraceCreate,
            serde_json::json!({}),
        ))
        .unwrap_err();
    assert!(matches!(err, SkeinError::Validation { .. }));
    assert_eq!(test.pipeline.stats().rejected, 1);
    assert_eq!(test.pipeline.pending(), 0);
}

#[tokio::test(start_paused = true)]
async fn full_queue_rejects_under_reject_policy() {
    let test = TestPipeline::builder()
        .configure(|c| {
            c.capacity = 10;
            c.batch_size = 10;
        })
        .transport({
            let transport = MockTransport::new();
            transport.set_delay(Duration::from_secs(30));
            transport
        })
        .build()
        .unwrap();

    // The first ten go out as one slow batch; the next ten fill the queue.
    test.submit_events(10).unwrap();
    wait_for(|| test.transport.calls() == 1).await;
    test.submit_events(10).unwrap();

    let err = test.submit_events(1).unwrap_err();
    assert!(matches!(err, SkeinError::QueueFull { capacity: 10 }));
}

#[tokio::test(start_paused = true)]
async fn expired_deadline_shutdown_reports_pending_events() {
    let test = TestPipeline::builder().build().unwrap();
    test.submit_events(5).unwrap();

    let ctx = Context::with_timeout(Duration::ZERO);
    let err = test.pipeline.shutdown(&ctx).await.unwrap_err();

    assert!(matches!(err, SkeinError::Shutdown { pending_events: 5 }));
    assert_eq!(test.transport.calls(), 0);

    let reported = test.pipeline.reporter().drain();
    assert!(
        reported
            .iter()
            .any(|e| e.operation == Operation::Shutdown
                && matches!(e.cause, SkeinError::Shutdown { pending_events: 5 }))
    );
    assert!(test.pipeline.reporter().is_closed());
}

#[tokio::test(start_paused = true)]
async fn shutdown_abandons_in_flight_batch_back_to_queue() {
    let transport = MockTransport::new();
    transport.set_delay(Duration::from_secs(10));
    let test = TestPipeline::builder().transport(transport).build().unwrap();

    let ids = test.submit_events(10).unwrap();
    wait_for(|| test.transport.calls() == 1).await;

    let err = test
        .pipeline
        .shutdown(&Context::with_timeout(Duration::from_secs(1)))
        .await
        .unwrap_err();

    assert!(matches!(err, SkeinError::Shutdown { pending_events: 10 }));
    assert_eq!(test.pipeline.pending(), 10);
    assert!(test.transport.delivered_ids().is_empty());
    assert_eq!(ids.len(), 10);
}

#[tokio::test(start_paused = true)]
async fn slow_hook_does_not_outlive_shutdown_deadline() {
    let hook = SlowHook::new(Duration::from_secs(60));
    let test = TestPipeline::builder()
        .hook("slow", Hook::before(hook.clone()), HookPriority::Observational)
        .build()
        .unwrap();
    test.submit_events(3).unwrap();

    let started = tokio::time::Instant::now();
    let err = test
        .pipeline
        .shutdown(&Context::with_timeout(Duration::from_secs(1)))
        .await
        .unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(2), "took {:?}", started.elapsed());
    assert!(matches!(err, SkeinError::Shutdown { pending_events: 3 }), "got: {err}");
    assert_eq!(hook.calls(), 1);
    assert_eq!(test.pipeline.pending(), 3);
    assert_eq!(test.transport.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_background_delivery_stuck_in_hook() {
    let hook = SlowHook::new(Duration::from_secs(3_600));
    let test = TestPipeline::builder()
        .configure(|config| config.batch_size = 3)
        .hook("slow", Hook::before(hook.clone()), HookPriority::Observational)
        .build()
        .unwrap();
    test.submit_events(3).unwrap();
    wait_for(|| hook.calls() == 1).await;
    assert_eq!(test.pipeline.pending(), 0);

    let started = tokio::time::Instant::now();
    let err = test
        .pipeline
        .shutdown(&Context::with_timeout(Duration::from_secs(1)))
        .await
        .unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(2), "took {:?}", started.elapsed());
    assert!(matches!(err, SkeinError::Shutdown { pending_events: 3 }), "got: {err}");
    assert_eq!(test.pipeline.pending(), 3, "batch returns to the queue");
    assert_eq!(test.transport.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn submit_after_shutdown_is_closed() {
    let test = TestPipeline::builder().build().unwrap();
    test.submit_events(3).unwrap();

    test.pipeline.close().await.unwrap();
    assert_eq!(test.transport.delivered_ids().len(), 3);

    let err = test.submit_events(1).unwrap_err();
    assert!(matches!(err, SkeinError::Closed));
    assert!(test.pipeline.is_closed());
    assert!(matches!(test.pipeline.health(), HealthStatus::Unhealthy(_)));
}

#[tokio::test(start_paused = true)]
async fn shutdown_is_idempotent() {
    let test = TestPipeline::builder().build().unwrap();
    test.submit_events(4).unwrap();

    let ctx = Context::background();
    test.pipeline.shutdown(&ctx).await.unwrap();
    let calls = test.transport.calls();

    test.pipeline.shutdown(&ctx).await.unwrap();
    assert_eq!(test.transport.calls(), calls);
}

#[tokio::test(start_paused = true)]
async fn critical_hook_failure_aborts_delivery() {
    let hook = FailingHook::new("signing key missing");
    let test = TestPipeline::builder()
        .hook("signer", Hook::before(hook.clone()), HookPriority::Critical)
        .build()
        .unwrap();
    test.submit_events(3).unwrap();

    let err = test.pipeline.flush(&Context::background()).await.unwrap_err();

    assert!(matches!(err, SkeinError::Hook { ref name, .. } if name == "signer"));
    assert_eq!(hook.calls(), 1, "hook failures are not retried");
    assert_eq!(test.transport.calls(), 0);
    assert_eq!(test.pipeline.stats().batches_failed, 1);

    let ops: Vec<Operation> = test
        .pipeline
        .reporter()
        .drain()
        .into_iter()
        .map(|e| e.operation)
        .collect();
    assert!(ops.contains(&Operation::Hook));
    assert!(ops.contains(&Operation::Flush));
}

#[tokio::test(start_paused = true)]
async fn observational_hook_failure_is_skipped() {
    let recorder = RecordingHook::new().with_header("x-skein-tenant", "acme");
    let test = TestPipeline::builder()
        .hook("audit", Hook::both(FailingHook::new("audit sink down")), HookPriority::Observational)
        .hook("tenant", Hook::both(recorder.clone()), HookPriority::Critical)
        .build()
        .unwrap();
    test.submit_events(3).unwrap();

    test.pipeline.flush(&Context::background()).await.unwrap();

    assert_eq!(test.transport.delivered_ids().len(), 3);
    let requests = test.transport.requests();
    assert_eq!(
        requests[0].headers.get("x-skein-tenant").map(String::as_str),
        Some("acme")
    );
    assert_eq!(recorder.requests().len(), 1);
    assert_eq!(recorder.responses().len(), 1);
    assert!(recorder.responses()[0].is_success());

    let stats = test.pipeline.hook_stats();
    let audit = stats.iter().find(|s| s.name == "audit").unwrap();
    assert_eq!(audit.failures, 2, "one failure per phase");
}

#[tokio::test(start_paused = true)]
async fn panicking_critical_hook_is_contained() {
    let test = TestPipeline::builder()
        .hook("boom", Hook::before(PanickingHook), HookPriority::Critical)
        .build()
        .unwrap();
    test.submit_events(1).unwrap();

    let err = test.pipeline.flush(&Context::background()).await.unwrap_err();
    assert!(err.to_string().contains("panicked"), "got: {err}");
    assert_eq!(test.transport.calls(), 0);

    let stats = test.pipeline.hook_stats();
    assert_eq!(stats[0].panics, 1);
}

#[tokio::test(start_paused = true)]
async fn partial_success_reports_only_rejected_events() {
    let test = TestPipeline::builder().build().unwrap();
    let ids = test.submit_events(10).unwrap();
    let rejected = vec![ids[2].clone(), ids[7].clone()];

    test.transport.push_reply(Reply::Reject {
        ids: rejected.clone(),
        status: 400,
    });
    test.pipeline.flush(&Context::background()).await.unwrap();

    let stats = test.pipeline.stats();
    assert_eq!(stats.events_delivered, 8);
    assert_eq!(stats.events_failed, 2);
    assert_eq!(test.transport.calls(), 1, "partial success is not retried");

    let reported = test.pipeline.reporter().drain();
    assert_eq!(reported.len(), 1);
    assert_eq!(reported[0].event_ids, rejected);
    assert_eq!(reported[0].cause.status(), Some(400));
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried_until_success() {
    let test = TestPipeline::builder()
        .transport(MockTransport::with_replies([
            Reply::Status(503),
            Reply::Error(SkeinError::network("connection reset")),
        ]))
        .build()
        .unwrap();
    test.submit_events(2).unwrap();

    let report = test
        .pipeline
        .drain_once(&Context::background())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(report.attempts, 3);
    assert!(report.is_complete_success());
    let attempts: Vec<u32> = test.transport.requests().iter().map(|r| r.attempt).collect();
    assert_eq!(attempts, vec![1, 2, 3]);
    assert!(test.pipeline.reporter().drain().is_empty());
}

#[tokio::test(start_paused = true)]
async fn drop_oldest_policy_evicts_and_reports() {
    let transport = MockTransport::new();
    transport.set_delay(Duration::from_secs(30));
    let test = TestPipeline::builder()
        .configure(|c| {
            c.capacity = 10;
            c.batch_size = 10;
            c.overflow_policy = skein_core::OverflowPolicy::DropOldest;
        })
        .transport(transport)
        .build()
        .unwrap();

    test.submit_events(10).unwrap();
    wait_for(|| test.transport.calls() == 1).await;
    let queued = test.submit_events(10).unwrap();
    let late = test.submit_events(1).unwrap();

    assert_eq!(test.pipeline.pending(), 10);
    assert_eq!(test.pipeline.stats().dropped, 1);
    let reported = test.pipeline.reporter().drain();
    assert_eq!(reported.len(), 1);
    assert_eq!(reported[0].operation, Operation::Queue);
    assert_eq!(reported[0].event_ids, vec![queued[0].clone()]);
    assert_eq!(late.len(), 1);
}
