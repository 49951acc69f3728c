//! Delivery of extraction results to the messaging transport.
//!
//! - `batch` - chunking and captions
//! - `transport` - the downstream interface and failure classification
//! - `recovery` - pending decisions after a partial failure
//! - `pipeline` - the per-job state machine tying them together

pub mod batch;
pub mod pipeline;
pub mod recovery;
pub mod transport;

pub use batch::{build_batches, format_caption, media_items, MediaBatch, MediaItem, MediaKind, MAX_BATCH_SIZE};
pub use pipeline::{AbortReason, BatchOutcome, DeliveryPipeline, DeliveryReport, PartialFailure};
pub use recovery::{FailedBatch, PendingRecovery, RecoveryId, RecoveryStore};
pub use transport::{Destination, FailureKind, Transport, TransportError};
