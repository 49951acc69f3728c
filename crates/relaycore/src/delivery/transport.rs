//! Downstream messaging transport interface.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::batch::{MediaBatch, MAX_BATCH_SIZE};

/// Conversation the media is delivered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Destination(pub i64);

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transport errors that mean the media itself could not be fetched or used.
const CONTENT_UNAVAILABLE_MARKERS: &[&str] = &[
    "failed to get http url content",
    "wrong file identifier",
    "wrong type of the web page content",
    "webpage_curl_failed",
    "webpage_media_empty",
    "media_empty",
    "wrong remote file identifier",
    "file is too big",
    "photo_invalid_dimensions",
    "invalid file http url",
];

/// User-facing classification of a batch failure. Does not affect control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureKind {
    ContentUnavailable,
    Generic,
}

impl FailureKind {
    pub fn classify(reason: &str) -> Self {
        let lowered = reason.to_lowercase();
        if CONTENT_UNAVAILABLE_MARKERS.iter().any(|m| lowered.contains(m)) {
            FailureKind::ContentUnavailable
        } else {
            FailureKind::Generic
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FailureKind::ContentUnavailable => "content_unavailable",
            FailureKind::Generic => "generic",
        }
    }
}

/// A batch failed atomically; `reason` is the transport's opaque message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct TransportError {
    reason: String,
}

impl TransportError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn kind(&self) -> FailureKind {
        FailureKind::classify(&self.reason)
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Largest batch the transport accepts.
    fn max_batch_size(&self) -> usize {
        MAX_BATCH_SIZE
    }

    /// Sends one batch. Either every item arrives or the call fails.
    async fn send_batch(&self, destination: Destination, batch: &MediaBatch) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_content_unavailable() {
        for reason in [
            "Bad Request: failed to get HTTP URL content",
            "Bad Request: wrong file identifier/HTTP URL specified",
            "Bad Request: WEBPAGE_CURL_FAILED",
            "Bad Request: MEDIA_EMPTY",
        ] {
            assert_eq!(FailureKind::classify(reason), FailureKind::ContentUnavailable, "{}", reason);
        }
    }

    #[test]
    fn test_classify_generic() {
        assert_eq!(FailureKind::classify("Too Many Requests: retry after 5"), FailureKind::Generic);
        assert_eq!(FailureKind::classify("connection reset"), FailureKind::Generic);
        assert_eq!(TransportError::new("").kind(), FailureKind::Generic);
    }
}
