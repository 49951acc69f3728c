//! Bounded pool of reusable extractor instances.
//!
//! A counting semaphore with `capacity` permits is the real limiter: a permit is
//! taken before a handle is reused *or* constructed, so instances that are still
//! being built count against the cap as well. The idle list and busy set live
//! under one mutex and are only touched in short, non-async critical sections.
//!
//! Handles are checked out as [`PooledExtractor`] guards. Dropping the guard puts
//! the handle back and frees the permit, so every exit path of a job (error,
//! panic, timeout cancellation) returns its extractor.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{OnceCell, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use url::Url;

use crate::core::metrics;
use crate::extract::{ExtractError, ExtractionResult, Extractor, ExtractorFactory, ExtractorPreferences};

/// Identity of a live extractor instance, unique within its pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(u64);

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "extractor#{}", self.0)
    }
}

/// A live extractor plus the preferences it was built with.
///
/// Owned by the pool while idle, by exactly one job while busy. Never cloned;
/// equality is identity.
pub struct ExtractorHandle {
    id: HandleId,
    preferences: ExtractorPreferences,
    extractor: Box<dyn Extractor>,
}

impl ExtractorHandle {
    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn preferences(&self) -> &ExtractorPreferences {
        &self.preferences
    }
}

impl PartialEq for ExtractorHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ExtractorHandle {}

impl fmt::Debug for ExtractorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractorHandle")
            .field("id", &self.id)
            .field("preferences", &self.preferences)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
pub enum PoolError {
    /// `drain_and_close` has started; no more extractors are handed out
    #[error("extractor pool is closed")]
    Closed,

    /// The factory failed to build a new instance
    #[error("failed to construct extractor: {0}")]
    Construction(#[source] ExtractError),
}

/// Point-in-time view of the pool, for logs and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub capacity: usize,
    pub idle: usize,
    pub busy: usize,
    pub constructing: usize,
    pub available_permits: usize,
    /// Stall warnings raised so far by waiters in `acquire`
    pub stalls: u64,
}

#[derive(Default)]
struct PoolState {
    available: Vec<ExtractorHandle>,
    busy: HashSet<HandleId>,
    constructing: usize,
    closed: bool,
}

impl PoolState {
    fn live(&self) -> usize {
        self.available.len() + self.busy.len() + self.constructing
    }
}

pub struct ExtractorPool {
    factory: Arc<dyn ExtractorFactory>,
    capacity: usize,
    permits: Arc<Semaphore>,
    state: Mutex<PoolState>,
    next_id: AtomicU64,
    stall_warning: Duration,
    stalls: AtomicU64,
    drained: OnceCell<()>,
}

impl ExtractorPool {
    /// Creates an empty pool. Instances are built lazily on first demand.
    ///
    /// A capacity of zero is treated as one.
    pub fn new(factory: Arc<dyn ExtractorFactory>, capacity: usize, stall_warning: Duration) -> Arc<Self> {
        let capacity = capacity.max(1);
        log::info!("Extractor pool '{}' created with capacity {}", factory.name(), capacity);
        Arc::new(Self {
            factory,
            capacity,
            permits: Arc::new(Semaphore::new(capacity)),
            state: Mutex::new(PoolState::default()),
            next_id: AtomicU64::new(1),
            stall_warning: stall_warning.max(Duration::from_millis(1)),
            stalls: AtomicU64::new(0),
            drained: OnceCell::new(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.lock_state();
        PoolStats {
            capacity: self.capacity,
            idle: state.available.len(),
            busy: state.busy.len(),
            constructing: state.constructing,
            available_permits: self.permits.available_permits(),
            stalls: self.stalls.load(Ordering::Relaxed),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, PoolState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Extractor pool lock was poisoned, recovering...");
                poisoned.into_inner()
            }
        }
    }

    /// Waits for a permit, logging a stall warning every `stall_warning` while blocked.
    ///
    /// The same acquire future is polled across warnings so the waiter keeps its
    /// place in the semaphore's FIFO queue.
    async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit, PoolError> {
        let started = Instant::now();
        let acquire = Arc::clone(&self.permits).acquire_owned();
        tokio::pin!(acquire);

        loop {
            match tokio::time::timeout(self.stall_warning, &mut acquire).await {
                Ok(Ok(permit)) => return Ok(permit),
                Ok(Err(_)) => return Err(PoolError::Closed),
                Err(_) => {
                    self.stalls.fetch_add(1, Ordering::Relaxed);
                    metrics::record_pool_stall();
                    let stats = self.stats();
                    log::warn!(
                        "Extractor pool exhaustion stall: waited {:?} ({} busy, {} constructing, capacity {})",
                        started.elapsed(),
                        stats.busy,
                        stats.constructing,
                        stats.capacity
                    );
                }
            }
        }
    }

    /// Checks out an extractor built with `preferences`.
    ///
    /// Suspends until a permit is free. Reuses an idle instance with matching
    /// preferences, otherwise constructs a new one; when the pool is full of
    /// idle instances with other preferences, one of them is destroyed first.
    pub async fn acquire(self: &Arc<Self>, preferences: &ExtractorPreferences) -> Result<PooledExtractor, PoolError> {
        // A pending drain sits at the head of the permit queue; don't line up behind it.
        if self.lock_state().closed {
            return Err(PoolError::Closed);
        }
        let permit = self.acquire_permit().await?;

        let evicted = {
            let mut state = self.lock_state();
            if state.closed {
                return Err(PoolError::Closed);
            }

            if let Some(pos) = state.available.iter().position(|h| h.preferences == *preferences) {
                let handle = state.available.swap_remove(pos);
                state.busy.insert(handle.id);
                metrics::set_pool_in_use(state.busy.len());
                log::debug!("Reusing {} ({} busy)", handle.id, state.busy.len());
                return Ok(PooledExtractor::new(handle, Arc::clone(self), permit));
            }

            let evicted = if state.live() >= self.capacity {
                state.available.pop()
            } else {
                None
            };
            state.constructing += 1;
            evicted
        };
        let slot = ConstructionSlot { pool: self, armed: true };

        if let Some(old) = evicted {
            log::info!("Evicting idle {} built with {:?}", old.id, old.preferences);
            self.destroy_handle(old).await;
        }

        match self.factory.construct(preferences).await {
            Ok(extractor) => {
                let id = HandleId(self.next_id.fetch_add(1, Ordering::Relaxed));
                slot.finish(id);
                metrics::record_pool_construction();
                log::info!("Constructed {} via '{}'", id, self.factory.name());
                let handle = ExtractorHandle {
                    id,
                    preferences: preferences.clone(),
                    extractor,
                };
                Ok(PooledExtractor::new(handle, Arc::clone(self), permit))
            }
            Err(e) => {
                // Give the capacity back before the error leaves this function.
                drop(slot);
                drop(permit);
                log::error!("Failed to construct extractor via '{}': {}", self.factory.name(), e);
                Err(PoolError::Construction(e))
            }
        }
    }

    /// Returns a checked-out extractor. Equivalent to dropping the guard.
    pub fn release(&self, extractor: PooledExtractor) {
        drop(extractor);
    }

    fn return_handle(&self, handle: ExtractorHandle) {
        let mut state = self.lock_state();
        if !state.busy.remove(&handle.id) {
            log::warn!("Returned {} was not marked busy", handle.id);
        }
        log::debug!("Released {} ({} busy)", handle.id, state.busy.len());
        metrics::set_pool_in_use(state.busy.len());
        // Also kept when closed: the drain collects and destroys it.
        state.available.push(handle);
    }

    async fn destroy_handle(&self, handle: ExtractorHandle) {
        let id = handle.id;
        if let Err(e) = self.factory.destroy(handle.extractor).await {
            log::warn!("Failed to destroy {}: {}", id, e);
        }
    }

    /// Stops handing out extractors, waits for every busy one to come back,
    /// then destroys all instances.
    ///
    /// Concurrent and repeated calls all return once the first drain has
    /// finished destroying the instances.
    pub async fn drain_and_close(&self) {
        self.drained.get_or_init(|| self.drain()).await;
    }

    async fn drain(&self) {
        {
            let mut state = self.lock_state();
            state.closed = true;
            log::info!(
                "Draining extractor pool: {} busy, {} constructing, {} idle",
                state.busy.len(),
                state.constructing,
                state.available.len()
            );
        }

        let all = u32::try_from(self.capacity).unwrap_or(u32::MAX);
        match self.permits.acquire_many(all).await {
            Ok(permits) => {
                self.permits.close();
                drop(permits);
            }
            Err(_) => log::warn!("Extractor pool semaphore already closed, destroying idle instances"),
        }

        let handles = std::mem::take(&mut self.lock_state().available);
        let count = handles.len();
        for handle in handles {
            self.destroy_handle(handle).await;
        }
        metrics::set_pool_in_use(0);
        log::info!("Extractor pool closed, {} instances destroyed", count);
    }
}

/// Keeps `constructing` accurate even if the acquiring future is cancelled mid-build.
struct ConstructionSlot<'a> {
    pool: &'a ExtractorPool,
    armed: bool,
}

impl ConstructionSlot<'_> {
    fn finish(mut self, id: HandleId) {
        let mut state = self.pool.lock_state();
        state.constructing = state.constructing.saturating_sub(1);
        state.busy.insert(id);
        metrics::set_pool_in_use(state.busy.len());
        self.armed = false;
    }
}

impl Drop for ConstructionSlot<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.pool.lock_state();
            state.constructing = state.constructing.saturating_sub(1);
        }
    }
}

/// A checked-out extractor. Returns itself to the pool on drop.
pub struct PooledExtractor {
    handle: Option<ExtractorHandle>,
    pool: Arc<ExtractorPool>,
    permit: Option<OwnedSemaphorePermit>,
}

impl PooledExtractor {
    fn new(handle: ExtractorHandle, pool: Arc<ExtractorPool>, permit: OwnedSemaphorePermit) -> Self {
        Self {
            handle: Some(handle),
            pool,
            permit: Some(permit),
        }
    }

    /// Identity of the underlying instance.
    pub fn id(&self) -> Option<HandleId> {
        self.handle.as_ref().map(|h| h.id)
    }

    pub async fn extract(&self, url: &Url) -> Result<Option<ExtractionResult>, ExtractError> {
        match self.handle {
            Some(ref handle) => handle.extractor.extract(url).await,
            None => Err(ExtractError::Construct("extractor already released".to_string())),
        }
    }

    /// Gives the extractor back to its pool.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for PooledExtractor {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.pool.return_handle(handle);
        }
        // Handle first, then the permit: a waiter woken by the permit must find the handle idle.
        drop(self.permit.take());
    }
}

impl fmt::Debug for PooledExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledExtractor").field("id", &self.id()).finish()
    }
}
