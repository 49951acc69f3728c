//! Pending recovery decisions for partially failed deliveries.
//!
//! Entries live in a bounded [`moka`] cache with a time-to-live, so offers the
//! user never answers are reclaimed instead of accumulating.

use chrono::{DateTime, Utc};
use moka::future::Cache;
use moka::notification::RemovalCause;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use super::batch::MediaBatch;
use super::transport::{Destination, FailureKind};
use crate::core::error::{RelayError, RelayResult};
use crate::extract::ExtractionResult;

/// Correlation id of one recovery offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecoveryId(Uuid);

impl RecoveryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RecoveryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecoveryId {
    // Simple form (32 hex chars) keeps callback payloads short.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for RecoveryId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(RecoveryId)
    }
}

/// A batch that failed, with the transport's reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedBatch {
    pub batch: MediaBatch,
    pub reason: String,
    pub kind: FailureKind,
}

/// Everything needed to act on a partial failure without re-extracting.
#[derive(Debug, Clone)]
pub struct PendingRecovery {
    pub id: RecoveryId,
    pub destination: Destination,
    pub source_url: String,
    /// Formatted metadata, without part markers
    pub caption: String,
    /// The result the failed attempt was built from
    pub result: Arc<ExtractionResult>,
    pub failed: Vec<FailedBatch>,
    /// 1 for the first offer, incremented on every re-offer after a retry
    pub round: u32,
    pub created_at: DateTime<Utc>,
    created: Instant,
}

impl PendingRecovery {
    pub fn new(
        destination: Destination,
        source_url: impl Into<String>,
        caption: impl Into<String>,
        result: Arc<ExtractionResult>,
        failed: Vec<FailedBatch>,
        round: u32,
    ) -> Self {
        Self {
            id: RecoveryId::new(),
            destination,
            source_url: source_url.into(),
            caption: caption.into(),
            result,
            failed,
            round,
            created_at: Utc::now(),
            created: Instant::now(),
        }
    }

    pub fn failed_items(&self) -> usize {
        self.failed.iter().map(|f| f.batch.len()).sum()
    }

    /// Classification of the first failure, used for the user message.
    pub fn kind(&self) -> FailureKind {
        self.failed.first().map(|f| f.kind).unwrap_or(FailureKind::Generic)
    }

    pub fn age(&self) -> Duration {
        self.created.elapsed()
    }
}

/// Bounded, expiring map of recovery offers.
#[derive(Clone)]
pub struct RecoveryStore {
    cache: Cache<RecoveryId, Arc<PendingRecovery>>,
    ttl: Duration,
}

impl RecoveryStore {
    pub fn new(ttl: Duration, max_entries: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .eviction_listener(|id: Arc<RecoveryId>, entry: Arc<PendingRecovery>, cause: RemovalCause| {
                if cause.was_evicted() {
                    log::info!(
                        "Recovery {} for chat {} dropped ({:?}, {} failed items)",
                        id,
                        entry.destination,
                        cause,
                        entry.failed_items()
                    );
                }
            })
            .build();
        Self { cache, ttl }
    }

    pub async fn insert(&self, entry: PendingRecovery) -> RecoveryId {
        let id = entry.id;
        log::debug!("Stored recovery {} (round {})", id, entry.round);
        self.cache.insert(id, Arc::new(entry)).await;
        id
    }

    /// Removes and returns the entry. Only one caller can win for a given id;
    /// every other caller, and any caller after expiry, gets `RecoveryExpired`.
    pub async fn take(&self, id: RecoveryId) -> RelayResult<PendingRecovery> {
        let entry = self.cache.remove(&id).await.ok_or(RelayError::RecoveryExpired(id))?;
        if entry.age() > self.ttl {
            return Err(RelayError::RecoveryExpired(id));
        }
        Ok(Arc::try_unwrap(entry).unwrap_or_else(|shared| (*shared).clone()))
    }

    pub fn contains(&self, id: RecoveryId) -> bool {
        self.cache.contains_key(&id)
    }

    /// Number of live offers for one conversation.
    pub async fn pending_for(&self, destination: Destination) -> usize {
        self.cache.run_pending_tasks().await;
        self.cache
            .iter()
            .filter(|(_, entry)| entry.destination == destination && entry.age() <= self.ttl)
            .count()
    }

    pub async fn len(&self) -> u64 {
        self.cache.run_pending_tasks().await;
        self.cache.entry_count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
