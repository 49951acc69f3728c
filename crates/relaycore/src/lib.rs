//! Relaycore - concurrent extraction and delivery engine for the media relay bot
//!
//! Takes content URLs, runs them through a bounded pool of extractor sessions
//! and relays the resulting media to a messaging transport in size-limited
//! batches, with a recovery path for partially failed deliveries.
//!
//! # Module Structure
//!
//! - `core`: Configuration, errors, logging, metrics and URL validation
//! - `extract`: Extractor traits, the parse-API backend and result normalization
//! - `pool`: Bounded pool of reusable extractor instances
//! - `scheduler`: Batch fan-out with a concurrency cap and per-job timeouts
//! - `delivery`: Batching, transport interface and recovery state machine
//! - `service`: The owned service object wiring everything together
//! - `runtime`: Sync-to-async bridge into the shared runtime

pub mod core;
pub mod delivery;
pub mod extract;
pub mod pool;
pub mod runtime;
pub mod scheduler;
pub mod service;

// Re-export commonly used types for convenience
pub use crate::core::{config, RelayConfig, RelayError, RelayResult};
pub use delivery::{DeliveryReport, Destination, MediaBatch, RecoveryId, Transport, TransportError};
pub use extract::{ExtractionResult, Extractor, ExtractorFactory, ExtractorPreferences, MediaType};
pub use pool::{ExtractorPool, PoolError, PooledExtractor};
pub use runtime::{BridgeError, RuntimeBridge};
pub use scheduler::{BatchProgress, BatchScheduler, BatchSummary, JobOutcome, ProgressSink, SchedulerConfig};
pub use service::RelayService;
