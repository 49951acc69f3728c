//! Bridge for synchronous callers into the long-lived Tokio runtime.
//!
//! Blocking entry points (plain threads, sync callbacks) submit a future and
//! wait for its output here instead of building a runtime per call.

use std::future::Future;

use thiserror::Error;
use tokio::runtime::Handle;

#[derive(Debug, Error)]
pub enum BridgeError {
    /// Blocking a runtime worker on its own runtime would deadlock it
    #[error("RuntimeBridge::submit called from inside a Tokio runtime; await the future instead")]
    InsideRuntime,

    /// The submitted task panicked or was cancelled
    #[error("submitted task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("no Tokio runtime available: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}

#[derive(Debug, Clone)]
pub struct RuntimeBridge {
    handle: Handle,
}

impl RuntimeBridge {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Captures the runtime the caller is currently running in.
    pub fn current() -> Result<Self, BridgeError> {
        Ok(Self::new(Handle::try_current()?))
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Runs `fut` on the shared runtime and blocks the calling thread until it finishes.
    ///
    /// Must be called from a thread that is not driving a Tokio runtime.
    pub fn submit<F>(&self, fut: F) -> Result<F::Output, BridgeError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        if Handle::try_current().is_ok() {
            return Err(BridgeError::InsideRuntime);
        }
        let task = self.handle.spawn(fut);
        Ok(self.handle.block_on(task)?)
    }
}
