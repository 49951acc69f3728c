//! Fan-out of independent URL jobs with bounded parallelism.
//!
//! Jobs are dispatched in input order: the dispatch loop takes a concurrency
//! permit before spawning each job, so job *k+1* never starts before job *k*.
//! Completion order is unconstrained. Every job runs under its own timeout;
//! when it fires the job's future is dropped, which releases whatever pool
//! guard it held, and siblings are unaffected.
//!
//! Keep `max_concurrency` at or below the extractor pool capacity. Above that,
//! jobs simply queue on pool permits.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use url::Url;

use crate::core::config::scheduler::MAX_CONCURRENCY_CEILING;
use crate::core::error::{RelayError, RelayResult};
use crate::core::metrics;

/// Scheduling policy for one batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub max_concurrency: usize,
    pub per_job_timeout: Duration,
}

impl SchedulerConfig {
    pub fn new(max_concurrency: usize, per_job_timeout: Duration) -> Self {
        Self {
            max_concurrency,
            per_job_timeout,
        }
    }

    /// Concurrency actually used: clamped to `[1, MAX_CONCURRENCY_CEILING]`.
    pub fn effective_concurrency(&self) -> usize {
        self.max_concurrency.clamp(1, MAX_CONCURRENCY_CEILING)
    }
}

/// One user-submitted URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchJob {
    /// Zero-based position in the submitted batch
    pub index: usize,
    pub url: Url,
}

impl BatchJob {
    pub fn from_urls(urls: impl IntoIterator<Item = Url>) -> Vec<BatchJob> {
        urls.into_iter()
            .enumerate()
            .map(|(index, url)| BatchJob { index, url })
            .collect()
    }
}

/// Snapshot passed to the progress sink after every completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchProgress {
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
}

impl BatchProgress {
    pub fn finished(&self) -> usize {
        self.completed + self.failed
    }

    pub fn is_done(&self) -> bool {
        self.finished() >= self.total
    }
}

impl fmt::Display for BatchProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} done", self.finished(), self.total)?;
        if self.failed > 0 {
            write!(f, ", {} failed", self.failed)?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
#[error("progress sink failed: {0}")]
pub struct SinkError(pub String);

/// Fire-and-forget progress callback. Errors are logged by the scheduler and dropped.
pub trait ProgressSink: Send + Sync {
    fn notify(&self, progress: BatchProgress) -> Result<(), SinkError>;
}

impl<F> ProgressSink for F
where
    F: Fn(BatchProgress) -> Result<(), SinkError> + Send + Sync,
{
    fn notify(&self, progress: BatchProgress) -> Result<(), SinkError> {
        self(progress)
    }
}

/// Sink that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn notify(&self, _progress: BatchProgress) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Shared counters of one run. Only job completions mutate them.
#[derive(Debug)]
pub struct BatchJobState {
    total: usize,
    counters: Mutex<(usize, usize)>,
}

impl BatchJobState {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            counters: Mutex::new((0, 0)),
        }
    }

    /// Records one finished job and returns the snapshot taken under the same lock.
    pub fn record(&self, success: bool) -> BatchProgress {
        let mut counters = match self.counters.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if counters.0 + counters.1 < self.total {
            if success {
                counters.0 += 1;
            } else {
                counters.1 += 1;
            }
        } else {
            log::warn!("Ignoring completion beyond batch total {}", self.total);
        }
        BatchProgress {
            completed: counters.0,
            failed: counters.1,
            total: self.total,
        }
    }

    pub fn snapshot(&self) -> BatchProgress {
        let counters = match self.counters.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        BatchProgress {
            completed: counters.0,
            failed: counters.1,
            total: self.total,
        }
    }
}

/// Final state of a single job.
#[derive(Debug)]
pub enum JobOutcome<T> {
    Succeeded(T),
    Failed(RelayError),
    TimedOut(Duration),
    /// The job's task panicked or was never started
    Panicked(String),
}

impl<T> JobOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Succeeded(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            JobOutcome::Succeeded(_) => "success",
            JobOutcome::Failed(_) => "failed",
            JobOutcome::TimedOut(_) => "timeout",
            JobOutcome::Panicked(_) => "panicked",
        }
    }
}

/// Aggregate of a whole run. `succeeded + failed == total` always holds;
/// `timed_out` is the subset of `failed` that hit the per-job timeout.
#[derive(Debug)]
pub struct BatchSummary<T> {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
    /// One entry per job, in input order
    pub outcomes: Vec<JobOutcome<T>>,
}

impl<T> BatchSummary<T> {
    fn from_outcomes(outcomes: Vec<JobOutcome<T>>) -> Self {
        let total = outcomes.len();
        let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
        let timed_out = outcomes
            .iter()
            .filter(|o| matches!(o, JobOutcome::TimedOut(_)))
            .count();
        Self {
            total,
            succeeded,
            failed: total - succeeded,
            timed_out,
            outcomes,
        }
    }
}

fn notify_best_effort(sink: &dyn ProgressSink, progress: BatchProgress) {
    if let Err(e) = sink.notify(progress) {
        log::warn!("Progress notification dropped ({}): {}", progress, e);
    }
}

#[derive(Debug, Clone)]
pub struct BatchScheduler {
    config: SchedulerConfig,
}

impl BatchScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        if config.max_concurrency > MAX_CONCURRENCY_CEILING {
            log::warn!(
                "Requested concurrency {} clamped to {}",
                config.max_concurrency,
                MAX_CONCURRENCY_CEILING
            );
        }
        Self { config }
    }

    pub fn config(&self) -> SchedulerConfig {
        self.config
    }

    /// Runs every job through `work` and waits for all of them.
    ///
    /// # Arguments
    ///
    /// * `jobs` - Jobs in submission order
    /// * `work` - Builds the future for one job; it is dropped on timeout
    /// * `sink` - Receives a [`BatchProgress`] after each completion
    ///
    /// Per-job errors, timeouts and panics become counters. They never abort
    /// siblings or the run itself.
    pub async fn run_batch<T, F, Fut>(
        &self,
        jobs: Vec<BatchJob>,
        work: F,
        sink: Arc<dyn ProgressSink>,
    ) -> BatchSummary<T>
    where
        T: Send + 'static,
        F: Fn(BatchJob) -> Fut,
        Fut: Future<Output = RelayResult<T>> + Send + 'static,
    {
        let total = jobs.len();
        let concurrency = self.config.effective_concurrency();
        let per_job_timeout = self.config.per_job_timeout;
        log::info!(
            "Starting batch of {} jobs (concurrency {}, timeout {:?})",
            total,
            concurrency,
            per_job_timeout
        );

        let state = Arc::new(BatchJobState::new(total));
        let limiter = Arc::new(Semaphore::new(concurrency));
        let mut tasks = JoinSet::new();
        let mut task_index = HashMap::with_capacity(total);
        let mut slots: Vec<Option<JobOutcome<T>>> = (0..total).map(|_| None).collect();

        for job in jobs {
            let permit = match Arc::clone(&limiter).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            let index = job.index;
            let url = job.url.clone();
            let fut = work(job);
            let state = Arc::clone(&state);
            let sink = Arc::clone(&sink);

            let handle = tasks.spawn(async move {
                let _permit = permit;
                let started = Instant::now();
                log::debug!("Job {} started: {}", index, url);

                let outcome = match tokio::time::timeout(per_job_timeout, fut).await {
                    Ok(Ok(value)) => JobOutcome::Succeeded(value),
                    Ok(Err(e)) => {
                        log::warn!("Job {} failed ({}): {}", index, e.category(), e);
                        JobOutcome::Failed(e)
                    }
                    Err(_) => {
                        log::warn!("Job {} timed out after {:?}: {}", index, per_job_timeout, url);
                        JobOutcome::TimedOut(per_job_timeout)
                    }
                };

                metrics::record_job(outcome.label(), started.elapsed().as_secs_f64());
                let progress = state.record(outcome.is_success());
                notify_best_effort(sink.as_ref(), progress);
                (index, outcome)
            });
            task_index.insert(handle.id(), index);
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((_, (index, outcome))) => {
                    if let Some(slot) = slots.get_mut(index) {
                        *slot = Some(outcome);
                    }
                }
                Err(e) => {
                    let Some(&index) = task_index.get(&e.id()) else {
                        log::error!("Unknown job task failed: {}", e);
                        continue;
                    };
                    log::error!("Job {} panicked: {}", index, e);
                    metrics::record_job("panicked", 0.0);
                    let progress = state.record(false);
                    notify_best_effort(sink.as_ref(), progress);
                    if let Some(slot) = slots.get_mut(index) {
                        *slot = Some(JobOutcome::Panicked(e.to_string()));
                    }
                }
            }
        }

        let outcomes = slots
            .into_iter()
            .map(|slot| slot.unwrap_or_else(|| JobOutcome::Panicked("job was never started".to_string())))
            .collect();
        let summary = BatchSummary::from_outcomes(outcomes);
        log::info!(
            "Batch finished: {} succeeded, {} failed ({} timed out) of {}",
            summary.succeeded,
            summary.failed,
            summary.timed_out,
            summary.total
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::ExtractError;

    fn jobs(n: usize) -> Vec<BatchJob> {
        BatchJob::from_urls((0..n).map(|i| Url::parse(&format!("https://example.com/{}", i)).unwrap()))
    }

    #[test]
    fn test_concurrency_is_clamped() {
        assert_eq!(SchedulerConfig::new(0, Duration::from_secs(1)).effective_concurrency(), 1);
        assert_eq!(SchedulerConfig::new(3, Duration::from_secs(1)).effective_concurrency(), 3);
        assert_eq!(SchedulerConfig::new(50, Duration::from_secs(1)).effective_concurrency(), 5);
    }

    #[test]
    fn test_job_state_never_exceeds_total() {
        let state = BatchJobState::new(2);
        state.record(true);
        state.record(false);
        let progress = state.record(true);
        assert_eq!(progress.finished(), 2);
        assert!(progress.is_done());
    }

    #[test]
    fn test_progress_display() {
        let progress = BatchProgress {
            completed: 2,
            failed: 1,
            total: 5,
        };
        assert_eq!(progress.to_string(), "3/5 done, 1 failed");
    }

    #[tokio::test]
    async fn test_outcomes_keep_input_order() {
        let scheduler = BatchScheduler::new(SchedulerConfig::new(3, Duration::from_secs(5)));
        let summary = scheduler
            .run_batch(
                jobs(4),
                |job| async move {
                    // Later jobs finish first.
                    tokio::time::sleep(Duration::from_millis(40 - 10 * job.index as u64)).await;
                    if job.index == 2 {
                        Err(RelayError::Extraction(ExtractError::NoResult))
                    } else {
                        Ok(job.index)
                    }
                },
                Arc::new(NoopSink),
            )
            .await;

        assert_eq!(summary.total, 4);
        assert_eq!(summary.succeeded, 3);
        assert_eq!(summary.failed, 1);
        let values: Vec<Option<usize>> = summary
            .outcomes
            .iter()
            .map(|o| match o {
                JobOutcome::Succeeded(v) => Some(*v),
                _ => None,
            })
            .collect();
        assert_eq!(values, vec![Some(0), Some(1), None, Some(3)]);
    }

    #[tokio::test]
    async fn test_failing_sink_does_not_fail_jobs() {
        let scheduler = BatchScheduler::new(SchedulerConfig::new(2, Duration::from_secs(5)));
        let sink = |_p: BatchProgress| -> Result<(), SinkError> { Err(SinkError("chat gone".to_string())) };
        let summary = scheduler
            .run_batch(jobs(3), |_job| async { Ok(()) }, Arc::new(sink))
            .await;
        assert_eq!(summary.succeeded, 3);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let scheduler = BatchScheduler::new(SchedulerConfig::new(2, Duration::from_secs(1)));
        let summary: BatchSummary<()> = scheduler
            .run_batch(Vec::new(), |_job| async { Ok(()) }, Arc::new(NoopSink))
            .await;
        assert_eq!(summary.total, 0);
        assert!(summary.outcomes.is_empty());
    }
}
