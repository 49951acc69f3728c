use std::time::Duration;
use thiserror::Error;

use crate::delivery::recovery::RecoveryId;
use crate::delivery::transport::{FailureKind, TransportError};
use crate::extract::ExtractError;
use crate::pool::PoolError;

/// Centralized error type for a relay job.
///
/// Every per-job failure ends up here; the scheduler turns it into a counter
/// and the front end turns it into a reply via [`RelayError::user_message`].
#[derive(Error, Debug)]
pub enum RelayError {
    /// The extractor failed or returned nothing usable
    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractError),

    /// Extraction succeeded but no valid media references came back
    #[error("No downloadable media found")]
    NoDownloadableMedia,

    /// A batch could not be delivered
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The job did not finish within its window
    #[error("Job timed out after {0:?}")]
    Timeout(Duration),

    /// The extractor pool refused or failed to hand out an extractor
    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),

    /// The recovery offer was already consumed or has been evicted
    #[error("Recovery {0} expired or already handled")]
    RecoveryExpired(RecoveryId),

    /// User input was not a URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// Type alias for Result with RelayError
pub type RelayResult<T> = Result<T, RelayError>;

impl RelayError {
    /// Short label for metrics and logs.
    pub fn category(&self) -> &'static str {
        match self {
            RelayError::Extraction(_) => "extraction",
            RelayError::NoDownloadableMedia => "no_media",
            RelayError::Transport(_) => "transport",
            RelayError::Timeout(_) => "timeout",
            RelayError::Pool(_) => "pool",
            RelayError::RecoveryExpired(_) => "recovery_expired",
            RelayError::InvalidUrl(_) => "invalid_url",
        }
    }

    /// Text suitable for showing to the user.
    ///
    /// Extraction failures carry the upstream message verbatim when the service sent one.
    pub fn user_message(&self) -> String {
        match self {
            RelayError::Extraction(ExtractError::Upstream(message)) => message.clone(),
            RelayError::Extraction(ExtractError::Timeout) => {
                "The parsing server timed out, please try again later.".to_string()
            }
            RelayError::Extraction(ExtractError::NoResult) => {
                "Could not parse this link, no download addresses were found.".to_string()
            }
            RelayError::Extraction(_) => {
                "Failed to reach the parsing server, please check that the service is running.".to_string()
            }
            RelayError::NoDownloadableMedia => "Parsed successfully, but no valid download links were found.".to_string(),
            RelayError::Transport(e) => match e.kind() {
                FailureKind::ContentUnavailable => "The media is unavailable or could not be fetched.".to_string(),
                FailureKind::Generic => "Failed to send the media, please try again later.".to_string(),
            },
            RelayError::Timeout(_) => "Processing took too long and was stopped.".to_string(),
            RelayError::Pool(PoolError::Closed) => "The service is shutting down, please try again later.".to_string(),
            RelayError::Pool(PoolError::Construction(_)) => {
                "Failed to reach the parsing server, please check that the service is running.".to_string()
            }
            RelayError::RecoveryExpired(_) => "This request has expired or was already handled.".to_string(),
            RelayError::InvalidUrl(_) => "That does not look like a valid URL, please check it and try again.".to_string(),
        }
    }
}
