//! Per-job delivery state machine.
//!
//! ```text
//! Chunking -> Sending -> Success
//!                     -> PartialFailure -> RetryingFailed   -> Success | PartialFailure (new id) | Aborted
//!                                       -> SendingAvailable -> Success | Aborted
//!                                       -> Aborted
//! ```
//!
//! A partial failure is stored as a [`PendingRecovery`] before the report is
//! returned. Each recovery action consumes that entry first, so exactly one
//! action can apply to it.

use std::collections::HashSet;
use std::sync::Arc;

use super::batch::{build_batches, format_caption, media_items, MediaBatch};
use super::recovery::{FailedBatch, PendingRecovery, RecoveryId, RecoveryStore};
use super::transport::{Destination, FailureKind, Transport, TransportError};
use crate::core::error::{RelayError, RelayResult};
use crate::core::metrics;
use crate::extract::ExtractionResult;

/// Result of sending one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    Sent,
    Failed { reason: String, kind: FailureKind },
}

/// Details of an offered recovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialFailure {
    pub recovery_id: RecoveryId,
    pub source_url: String,
    pub sent_batches: usize,
    pub failed_batches: usize,
    pub failed_items: usize,
    pub kind: FailureKind,
    pub reason: String,
    /// 1 for the first offer
    pub round: u32,
}

impl PartialFailure {
    /// The first batch failure as a job error, for user-facing text.
    pub fn error(&self) -> RelayError {
        RelayError::Transport(TransportError::new(self.reason.clone()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// The user chose to give up
    Cancelled,
    /// Retries kept failing and the round limit was reached
    RetriesExhausted { failed_items: usize, kind: FailureKind },
    /// Every item was in a failed batch, nothing left to send
    NothingAvailable,
    /// Sending the available subset failed as well
    DeliveryFailed { kind: FailureKind },
}

/// How a delivery attempt (or recovery action) ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryReport {
    Success { sent_items: usize, skipped_items: usize },
    PartialFailure(PartialFailure),
    Aborted(AbortReason),
}

impl DeliveryReport {
    pub fn is_success(&self) -> bool {
        matches!(self, DeliveryReport::Success { .. })
    }
}

pub struct DeliveryPipeline {
    transport: Arc<dyn Transport>,
    recoveries: RecoveryStore,
    max_recovery_rounds: u32,
}

impl DeliveryPipeline {
    pub fn new(transport: Arc<dyn Transport>, recoveries: RecoveryStore, max_recovery_rounds: u32) -> Self {
        Self {
            transport,
            recoveries,
            max_recovery_rounds: max_recovery_rounds.max(1),
        }
    }

    pub fn recoveries(&self) -> &RecoveryStore {
        &self.recoveries
    }

    async fn send_one(&self, destination: Destination, batch: &MediaBatch) -> BatchOutcome {
        match self.transport.send_batch(destination, batch).await {
            Ok(()) => {
                metrics::record_batch_sent();
                log::debug!("Sent batch {}/{} ({} items) to {}", batch.part, batch.parts, batch.len(), destination);
                BatchOutcome::Sent
            }
            Err(e) => {
                let kind = e.kind();
                metrics::record_batch_failed(kind.label());
                log::warn!(
                    "Batch {}/{} to {} failed ({}): {}",
                    batch.part,
                    batch.parts,
                    destination,
                    kind.label(),
                    e
                );
                BatchOutcome::Failed {
                    reason: e.reason().to_string(),
                    kind,
                }
            }
        }
    }

    /// Sends batches in order and collects the failed ones.
    async fn send_all(&self, destination: Destination, batches: Vec<MediaBatch>) -> (usize, Vec<FailedBatch>) {
        let mut sent = 0;
        let mut failed = Vec::new();
        for batch in batches {
            match self.send_one(destination, &batch).await {
                BatchOutcome::Sent => sent += 1,
                BatchOutcome::Failed { reason, kind } => failed.push(FailedBatch { batch, reason, kind }),
            }
        }
        (sent, failed)
    }

    async fn offer_recovery(&self, entry: PendingRecovery, sent_batches: usize) -> DeliveryReport {
        let report = PartialFailure {
            recovery_id: entry.id,
            source_url: entry.source_url.clone(),
            sent_batches,
            failed_batches: entry.failed.len(),
            failed_items: entry.failed_items(),
            kind: entry.kind(),
            reason: entry.failed.first().map(|f| f.reason.clone()).unwrap_or_default(),
            round: entry.round,
        };
        log::info!(
            "Partial failure for {}: {} of {} batches failed, recovery {} (round {})",
            entry.source_url,
            report.failed_batches,
            report.failed_batches + sent_batches,
            entry.id,
            entry.round
        );
        self.recoveries.insert(entry).await;
        DeliveryReport::PartialFailure(report)
    }

    /// Chunks `result` into batches and sends them to `destination`.
    ///
    /// Returns `NoDownloadableMedia` when the result is empty. When at least
    /// one batch fails, a recovery entry is stored and its id reported.
    pub async fn deliver(
        &self,
        destination: Destination,
        source_url: &str,
        result: Arc<ExtractionResult>,
    ) -> RelayResult<DeliveryReport> {
        if result.is_empty() {
            return Err(RelayError::NoDownloadableMedia);
        }

        let caption = format_caption(&result.metadata, result.len(), source_url);
        let batches = build_batches(media_items(&result), &caption, self.transport.max_batch_size());
        log::info!(
            "Delivering {} {} in {} batches to {}",
            result.len(),
            result.media_type.label(),
            batches.len(),
            destination
        );

        let (sent, failed) = self.send_all(destination, batches).await;
        if failed.is_empty() {
            return Ok(DeliveryReport::Success {
                sent_items: result.len(),
                skipped_items: 0,
            });
        }

        let entry = PendingRecovery::new(destination, source_url, caption, result, failed, 1);
        Ok(self.offer_recovery(entry, sent).await)
    }

    /// Resends exactly the previously failed batches, unchanged.
    pub async fn retry_failed(&self, id: RecoveryId) -> RelayResult<DeliveryReport> {
        let entry = self.recoveries.take(id).await?;
        metrics::record_recovery_action("retry");
        log::info!("Retrying {} failed batches for recovery {}", entry.failed.len(), id);

        let retried = entry.failed.len();
        let batches: Vec<MediaBatch> = entry.failed.iter().map(|f| f.batch.clone()).collect();
        let (sent, still_failed) = self.send_all(entry.destination, batches).await;

        if still_failed.is_empty() {
            let sent_items = entry.failed_items();
            return Ok(DeliveryReport::Success {
                sent_items,
                skipped_items: 0,
            });
        }

        if entry.round >= self.max_recovery_rounds {
            let failed_items = still_failed.iter().map(|f| f.batch.len()).sum();
            let kind = still_failed.first().map(|f| f.kind).unwrap_or(FailureKind::Generic);
            log::warn!(
                "Recovery {} exhausted after {} rounds ({}/{} batches still failing)",
                id,
                entry.round,
                still_failed.len(),
                retried
            );
            return Ok(DeliveryReport::Aborted(AbortReason::RetriesExhausted { failed_items, kind }));
        }

        let next = PendingRecovery::new(
            entry.destination,
            entry.source_url,
            entry.caption,
            entry.result,
            still_failed,
            entry.round + 1,
        );
        Ok(self.offer_recovery(next, sent).await)
    }

    /// Sends every item that was not part of a failed batch, captioned with
    /// the number of skipped items.
    pub async fn send_available(&self, id: RecoveryId) -> RelayResult<DeliveryReport> {
        let entry = self.recoveries.take(id).await?;
        metrics::record_recovery_action("send_available");

        let failed_positions: HashSet<usize> = entry.failed.iter().flat_map(|f| f.batch.positions()).collect();
        let available: Vec<_> = media_items(&entry.result)
            .into_iter()
            .filter(|item| !failed_positions.contains(&item.position))
            .collect();

        if available.is_empty() {
            log::info!("Recovery {}: nothing available to send", id);
            return Ok(DeliveryReport::Aborted(AbortReason::NothingAvailable));
        }

        let sent_items = available.len();
        let skipped_items = entry.result.len() - sent_items;
        let caption = format!(
            "{}\nSent available media only, skipped {} of {}",
            entry.caption,
            skipped_items,
            entry.result.len()
        );
        let batches = build_batches(available, &caption, self.transport.max_batch_size());
        log::info!(
            "Recovery {}: sending {} available items in {} batches, skipping {}",
            id,
            sent_items,
            batches.len(),
            skipped_items
        );

        let (_, failed) = self.send_all(entry.destination, batches).await;
        if let Some(first) = failed.first() {
            return Ok(DeliveryReport::Aborted(AbortReason::DeliveryFailed { kind: first.kind }));
        }
        Ok(DeliveryReport::Success {
            sent_items,
            skipped_items,
        })
    }

    /// Abandons the recovery.
    pub async fn cancel(&self, id: RecoveryId) -> RelayResult<DeliveryReport> {
        let entry = self.recoveries.take(id).await?;
        metrics::record_recovery_action("cancel");
        log::info!("Recovery {} for {} cancelled", id, entry.source_url);
        Ok(DeliveryReport::Aborted(AbortReason::Cancelled))
    }
}
