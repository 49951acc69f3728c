//! Batch scheduler behavior against the real pool and pipeline

mod common;

use common::*;
use relaycore::scheduler::{BatchJob, NoopSink, SinkError};
use relaycore::{
    BatchProgress, BatchScheduler, DeliveryReport, Destination, ExtractorPreferences, JobOutcome, RelayError,
    RelayService, SchedulerConfig,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

fn service(
    factory: &Arc<MockExtractorFactory>,
    transport: &Arc<MockTransport>,
    concurrency: usize,
    timeout: Duration,
) -> Arc<RelayService> {
    RelayService::new(
        pool_of(factory, 3),
        BatchScheduler::new(SchedulerConfig::new(concurrency, timeout)),
        pipeline_with(transport, 3),
        ExtractorPreferences::default(),
    )
}

// ===== Aggregate Tests =====

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_summary_adds_up_with_mixed_outcomes() {
    let factory = MockExtractorFactory::new(
        MockExtractorConfig::default()
            .with("/fail", Behavior::Fail("作品不存在".to_string()))
            .with("/empty", Behavior::Images(0))
            .with("/nothing", Behavior::Nothing)
            .with("/hang", Behavior::Hang),
    );
    let transport = MockTransport::new();
    let svc = service(&factory, &transport, 3, Duration::from_millis(300));

    let urls = vec![
        url("/a"),
        url("/fail"),
        url("/b"),
        url("/empty"),
        url("/hang"),
        url("/nothing"),
        url("/c"),
    ];
    let summary = svc.run_batch(Destination(7), urls, Arc::new(NoopSink)).await;

    assert_eq!(summary.total, 7);
    assert_eq!(summary.succeeded + summary.failed, summary.total);
    assert_eq!(summary.succeeded, 3);
    assert_eq!(summary.timed_out, 1);
    assert_eq!(summary.outcomes.len(), 7);

    match &summary.outcomes[1] {
        JobOutcome::Failed(e) => assert_eq!(e.user_message(), "作品不存在"),
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert!(matches!(summary.outcomes[3], JobOutcome::Failed(RelayError::NoDownloadableMedia)));
    assert!(matches!(summary.outcomes[4], JobOutcome::TimedOut(_)));
    assert!(matches!(summary.outcomes[5], JobOutcome::Failed(RelayError::Extraction(_))));
    assert!(matches!(summary.outcomes[6], JobOutcome::Succeeded(DeliveryReport::Success { .. })));

    // The hung job's extractor went back to the pool.
    assert_eq!(svc.pool().stats().busy, 0);
}

#[tokio::test]
async fn test_progress_is_monotonic_and_complete() {
    let factory = MockExtractorFactory::new(MockExtractorConfig::default().with("/x", Behavior::Nothing));
    let transport = MockTransport::new();
    let svc = service(&factory, &transport, 2, Duration::from_secs(5));

    let seen: Arc<Mutex<Vec<BatchProgress>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = {
        let seen = Arc::clone(&seen);
        move |progress: BatchProgress| -> Result<(), SinkError> {
            seen.lock().unwrap().push(progress);
            Ok(())
        }
    };

    let urls = vec![url("/1"), url("/x"), url("/2"), url("/3"), url("/x")];
    let summary = svc.run_batch(Destination(1), urls, Arc::new(sink)).await;
    assert_eq!(summary.failed, 2);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 5);
    for pair in seen.windows(2) {
        assert!(pair[1].completed >= pair[0].completed);
        assert!(pair[1].failed >= pair[0].failed);
    }
    for progress in seen.iter() {
        assert!(progress.completed + progress.failed <= progress.total);
    }
    let last = seen.iter().max_by_key(|p| p.finished()).unwrap();
    assert_eq!(
        *last,
        BatchProgress {
            completed: 3,
            failed: 2,
            total: 5
        }
    );
}

// ===== Timeout Isolation Tests =====

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_hung_job_does_not_delay_siblings() {
    let factory = MockExtractorFactory::new(
        MockExtractorConfig::default()
            .latency(Duration::from_millis(20))
            .with("/hang", Behavior::Hang),
    );
    let transport = MockTransport::new();
    let per_job_timeout = Duration::from_millis(400);
    let svc = service(&factory, &transport, 3, per_job_timeout);

    let finish_times: Arc<Mutex<Vec<Duration>>> = Arc::new(Mutex::new(Vec::new()));
    let started = Instant::now();
    let sink = {
        let finish_times = Arc::clone(&finish_times);
        move |_progress: BatchProgress| -> Result<(), SinkError> {
            finish_times.lock().unwrap().push(started.elapsed());
            Ok(())
        }
    };

    let summary = svc
        .run_batch(Destination(1), vec![url("/hang"), url("/a"), url("/b")], Arc::new(sink))
        .await;
    let elapsed = started.elapsed();

    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.timed_out, 1);
    assert!(matches!(summary.outcomes[0], JobOutcome::TimedOut(_)));
    assert!(elapsed >= per_job_timeout);
    assert!(elapsed < per_job_timeout + Duration::from_millis(500), "took {:?}", elapsed);

    // Siblings finished long before the hung job was given up on.
    let finish_times = finish_times.lock().unwrap();
    assert!(finish_times[0] < per_job_timeout, "{:?}", finish_times);
    assert!(finish_times[1] < per_job_timeout, "{:?}", finish_times);
}

// ===== Concurrency Tests =====

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_cap_is_respected() {
    let scheduler = BatchScheduler::new(SchedulerConfig::new(2, Duration::from_secs(5)));
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let summary = {
        let running = Arc::clone(&running);
        let peak = Arc::clone(&peak);
        scheduler
            .run_batch(
                BatchJob::from_urls((0..8).map(|i| url(&format!("/{}", i)))),
                move |_job| {
                    let running = Arc::clone(&running);
                    let peak = Arc::clone(&peak);
                    async move {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        running.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    }
                },
                Arc::new(NoopSink),
            )
            .await
    };

    assert_eq!(summary.succeeded, 8);
    assert!(peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_configured_concurrency_is_clamped_to_ceiling() {
    let scheduler = BatchScheduler::new(SchedulerConfig::new(64, Duration::from_secs(5)));
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    {
        let running = Arc::clone(&running);
        let peak = Arc::clone(&peak);
        scheduler
            .run_batch(
                BatchJob::from_urls((0..20).map(|i| url(&format!("/{}", i)))),
                move |_job| {
                    let running = Arc::clone(&running);
                    let peak = Arc::clone(&peak);
                    async move {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        running.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    }
                },
                Arc::new(NoopSink),
            )
            .await;
    }

    assert!(peak.load(Ordering::SeqCst) <= 5);
}

#[tokio::test]
async fn test_jobs_start_in_input_order() {
    let scheduler = BatchScheduler::new(SchedulerConfig::new(1, Duration::from_secs(5)));
    let order = Arc::new(Mutex::new(Vec::new()));

    {
        let order = Arc::clone(&order);
        scheduler
            .run_batch(
                BatchJob::from_urls((0..6).map(|i| url(&format!("/{}", i)))),
                move |job| {
                    let order = Arc::clone(&order);
                    async move {
                        order.lock().unwrap().push(job.index);
                        Ok(())
                    }
                },
                Arc::new(NoopSink),
            )
            .await;
    }

    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn test_panicking_job_counts_as_failed() {
    let scheduler = BatchScheduler::new(SchedulerConfig::new(2, Duration::from_secs(5)));
    let summary = scheduler
        .run_batch(
            BatchJob::from_urls((0..3).map(|i| url(&format!("/{}", i)))),
            |job| async move {
                if job.index == 1 {
                    panic!("bad job");
                }
                Ok(job.index)
            },
            Arc::new(NoopSink),
        )
        .await;

    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);
    assert!(matches!(summary.outcomes[1], JobOutcome::Panicked(_)));
}
