//! The explicitly owned relay service.
//!
//! One `RelayService` is built at startup and shared as `Arc<RelayService>`;
//! it owns the extractor pool, the scheduler and the delivery pipeline
//! (including the recovery store). Nothing here is process-global.

use std::sync::Arc;

use url::Url;

use crate::core::config::RelayConfig;
use crate::core::error::{RelayError, RelayResult};
use crate::delivery::{DeliveryPipeline, DeliveryReport, Destination, RecoveryId, RecoveryStore, Transport};
use crate::extract::{ExtractError, ExtractionResult, ExtractorFactory, ExtractorPreferences};
use crate::pool::ExtractorPool;
use crate::scheduler::{BatchJob, BatchScheduler, BatchSummary, ProgressSink, SchedulerConfig};

pub struct RelayService {
    pool: Arc<ExtractorPool>,
    scheduler: BatchScheduler,
    pipeline: DeliveryPipeline,
    preferences: ExtractorPreferences,
}

impl RelayService {
    pub fn new(
        pool: Arc<ExtractorPool>,
        scheduler: BatchScheduler,
        pipeline: DeliveryPipeline,
        preferences: ExtractorPreferences,
    ) -> Arc<Self> {
        let concurrency = scheduler.config().effective_concurrency();
        if concurrency > pool.capacity() {
            log::warn!(
                "Scheduler concurrency {} exceeds extractor pool capacity {}; extra jobs will wait for pool permits",
                concurrency,
                pool.capacity()
            );
        }
        Arc::new(Self {
            pool,
            scheduler,
            pipeline,
            preferences,
        })
    }

    /// Wires the service from configuration.
    pub fn from_config(
        config: &RelayConfig,
        factory: Arc<dyn ExtractorFactory>,
        transport: Arc<dyn Transport>,
    ) -> Arc<Self> {
        let pool = ExtractorPool::new(factory, config.pool_capacity, config.pool_stall_warning);
        let scheduler = BatchScheduler::new(SchedulerConfig::new(config.max_concurrent_jobs, config.job_timeout));
        let recoveries = RecoveryStore::new(config.recovery_ttl, config.recovery_max_entries);
        let pipeline = DeliveryPipeline::new(transport, recoveries, config.recovery_max_rounds);
        let preferences = ExtractorPreferences {
            media_encoding: config.preferred_encoding.clone(),
        };
        Self::new(pool, scheduler, pipeline, preferences)
    }

    pub fn pool(&self) -> &Arc<ExtractorPool> {
        &self.pool
    }

    /// Runs one extraction through the pool.
    ///
    /// The extractor goes back to the pool as soon as extraction ends, before
    /// any delivery starts.
    pub async fn extract(&self, url: &Url) -> RelayResult<Arc<ExtractionResult>> {
        let extractor = self.pool.acquire(&self.preferences).await?;
        let extracted = extractor.extract(url).await;
        extractor.release();

        let result = extracted?.ok_or(RelayError::Extraction(ExtractError::NoResult))?;
        if result.is_empty() {
            return Err(RelayError::NoDownloadableMedia);
        }
        Ok(Arc::new(result))
    }

    /// Extracts and delivers a single job.
    pub async fn process_job(&self, destination: Destination, job: BatchJob) -> RelayResult<DeliveryReport> {
        let result = self.extract(&job.url).await?;
        self.pipeline.deliver(destination, job.url.as_str(), result).await
    }

    /// Runs every URL as an independent job under the scheduler's policy.
    pub async fn run_batch(
        self: &Arc<Self>,
        destination: Destination,
        urls: Vec<Url>,
        sink: Arc<dyn ProgressSink>,
    ) -> BatchSummary<DeliveryReport> {
        let service = Arc::clone(self);
        self.scheduler
            .run_batch(
                BatchJob::from_urls(urls),
                move |job| {
                    let service = Arc::clone(&service);
                    async move { service.process_job(destination, job).await }
                },
                sink,
            )
            .await
    }

    pub async fn retry_failed(&self, id: RecoveryId) -> RelayResult<DeliveryReport> {
        self.pipeline.retry_failed(id).await
    }

    pub async fn send_available(&self, id: RecoveryId) -> RelayResult<DeliveryReport> {
        self.pipeline.send_available(id).await
    }

    pub async fn cancel(&self, id: RecoveryId) -> RelayResult<DeliveryReport> {
        self.pipeline.cancel(id).await
    }

    /// Recovery offers still waiting for a decision in `destination`.
    pub async fn pending_recoveries(&self, destination: Destination) -> usize {
        self.pipeline.recoveries().pending_for(destination).await
    }

    /// Waits for in-flight extractions and tears the pool down.
    pub async fn shutdown(&self) {
        log::info!("Relay service shutting down");
        self.pool.drain_and_close().await;
    }
}
