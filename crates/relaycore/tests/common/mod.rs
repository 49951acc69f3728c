//! Mock extractor backend and transport for integration tests
//!
//! The extractor simulates latency, failures and hangs per URL path; the
//! transport records every batch and fails the parts it is told to.

#![allow(dead_code)] // Not every test binary uses every helper

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

use relaycore::delivery::{DeliveryPipeline, Destination, MediaBatch, RecoveryStore, Transport, TransportError};
use relaycore::extract::{ExtractError, ExtractionResult, Extractor, ExtractorFactory, ExtractorPreferences};
use relaycore::{ExtractorPool, MediaType};

/// What the mock extractor does for a given URL path.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Returns an image set with this many items
    Images(usize),
    /// Returns a single video
    Video,
    /// Fails with an upstream message
    Fail(String),
    /// Returns no result at all
    Nothing,
    /// Never returns
    Hang,
}

#[derive(Debug)]
pub struct MockExtractorConfig {
    pub latency: Duration,
    pub default_behavior: Behavior,
    pub overrides: HashMap<String, Behavior>,
}

impl Default for MockExtractorConfig {
    fn default() -> Self {
        Self {
            latency: Duration::from_millis(10),
            default_behavior: Behavior::Images(3),
            overrides: HashMap::new(),
        }
    }
}

impl MockExtractorConfig {
    pub fn with(mut self, path: &str, behavior: Behavior) -> Self {
        self.overrides.insert(path.to_string(), behavior);
        self
    }

    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn default_behavior(mut self, behavior: Behavior) -> Self {
        self.default_behavior = behavior;
        self
    }
}

/// Counters shared by the factory and all of its instances.
#[derive(Debug, Default)]
pub struct MockStats {
    pub constructed: AtomicUsize,
    pub destroyed: AtomicUsize,
    pub extractions: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    /// Set when one instance is used by two jobs at once
    pub double_issue: AtomicBool,
}

impl MockStats {
    pub fn constructed(&self) -> usize {
        self.constructed.load(Ordering::SeqCst)
    }

    pub fn destroyed(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn saw_double_issue(&self) -> bool {
        self.double_issue.load(Ordering::SeqCst)
    }
}

struct InFlight<'a> {
    stats: &'a MockStats,
    busy: &'a AtomicBool,
}

impl<'a> InFlight<'a> {
    fn enter(stats: &'a MockStats, busy: &'a AtomicBool) -> Self {
        if busy.swap(true, Ordering::SeqCst) {
            stats.double_issue.store(true, Ordering::SeqCst);
        }
        let now = stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        stats.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Self { stats, busy }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.stats.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.busy.store(false, Ordering::SeqCst);
    }
}

pub struct MockExtractor {
    config: Arc<MockExtractorConfig>,
    stats: Arc<MockStats>,
    busy: AtomicBool,
}

pub fn image_result(url: &Url, count: usize) -> ExtractionResult {
    ExtractionResult::new(
        MediaType::ImageSet,
        (1..=count)
            .map(|i| format!("https://cdn.example.com{}/{}.jpg", url.path(), i))
            .collect(),
        Default::default(),
    )
}

#[async_trait]
impl Extractor for MockExtractor {
    async fn extract(&self, url: &Url) -> Result<Option<ExtractionResult>, ExtractError> {
        let _guard = InFlight::enter(&self.stats, &self.busy);
        self.stats.extractions.fetch_add(1, Ordering::SeqCst);

        let behavior = self
            .config
            .overrides
            .get(url.path())
            .unwrap_or(&self.config.default_behavior)
            .clone();

        if matches!(behavior, Behavior::Hang) {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(self.config.latency).await;

        match behavior {
            Behavior::Images(count) => Ok(Some(image_result(url, count))),
            Behavior::Video => Ok(Some(ExtractionResult::new(
                MediaType::Video,
                vec![format!("https://cdn.example.com{}.mp4", url.path())],
                Default::default(),
            ))),
            Behavior::Fail(message) => Err(ExtractError::Upstream(message)),
            Behavior::Nothing | Behavior::Hang => Ok(None),
        }
    }
}

pub struct MockExtractorFactory {
    config: Arc<MockExtractorConfig>,
    pub stats: Arc<MockStats>,
    pub fail_construction: AtomicBool,
    pub construct_delay: Duration,
}

impl MockExtractorFactory {
    pub fn new(config: MockExtractorConfig) -> Arc<Self> {
        Arc::new(Self {
            config: Arc::new(config),
            stats: Arc::new(MockStats::default()),
            fail_construction: AtomicBool::new(false),
            construct_delay: Duration::from_millis(5),
        })
    }
}

#[async_trait]
impl ExtractorFactory for MockExtractorFactory {
    fn name(&self) -> &str {
        "mock"
    }

    async fn construct(&self, _preferences: &ExtractorPreferences) -> Result<Box<dyn Extractor>, ExtractError> {
        tokio::time::sleep(self.construct_delay).await;
        if self.fail_construction.load(Ordering::SeqCst) {
            return Err(ExtractError::Construct("mock login failed".to_string()));
        }
        self.stats.constructed.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockExtractor {
            config: Arc::clone(&self.config),
            stats: Arc::clone(&self.stats),
            busy: AtomicBool::new(false),
        }))
    }

    async fn destroy(&self, _extractor: Box<dyn Extractor>) -> Result<(), ExtractError> {
        self.stats.destroyed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn pool_of(factory: &Arc<MockExtractorFactory>, capacity: usize) -> Arc<ExtractorPool> {
    ExtractorPool::new(
        Arc::clone(factory) as Arc<dyn ExtractorFactory>,
        capacity,
        Duration::from_secs(30),
    )
}

/// Transport that records batches and fails selected parts.
#[derive(Default)]
pub struct MockTransport {
    sent: Mutex<Vec<(Destination, MediaBatch)>>,
    /// batch part -> remaining failures
    failures: Mutex<HashMap<usize, usize>>,
    reason: Mutex<String>,
    attempts: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            reason: Mutex::new("Bad Request: failed to get HTTP URL content".to_string()),
            ..Default::default()
        })
    }

    /// Fails batch `part` (1-based) the next `times` attempts.
    pub fn fail_part(&self, part: usize, times: usize) {
        self.failures.lock().unwrap().insert(part, times);
    }

    pub fn fail_with(&self, reason: &str) {
        *self.reason.lock().unwrap() = reason.to_string();
    }

    pub fn sent(&self) -> Vec<(Destination, MediaBatch)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_batches(&self) -> Vec<MediaBatch> {
        self.sent().into_iter().map(|(_, batch)| batch).collect()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send_batch(&self, destination: Destination, batch: &MediaBatch) -> Result<(), TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        {
            let mut failures = self.failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(&batch.part) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(TransportError::new(self.reason.lock().unwrap().clone()));
                }
            }
        }
        self.sent.lock().unwrap().push((destination, batch.clone()));
        Ok(())
    }
}

pub fn pipeline_with(transport: &Arc<MockTransport>, max_rounds: u32) -> DeliveryPipeline {
    DeliveryPipeline::new(
        Arc::clone(transport) as Arc<dyn Transport>,
        RecoveryStore::new(Duration::from_secs(60), 100),
        max_rounds,
    )
}

pub fn url(path: &str) -> Url {
    Url::parse(&format!("https://v.example.com{}", path)).unwrap()
}
