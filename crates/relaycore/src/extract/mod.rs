//! Extractor abstraction layer.
//!
//! An [`Extractor`] turns a content URL into an [`ExtractionResult`]. Instances are
//! expensive to build (HTTP session setup, auth) so they are created and destroyed
//! only through an [`ExtractorFactory`], which the pool owns.
//!
//! Built-in backend:
//! - `ParseApiFactory`: the HTTP content-extraction service (`PARSE_API_URL`)

pub mod normalize;
pub mod parse_api;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use url::Url;

pub use normalize::RawExtraction;
pub use parse_api::{ParseApiExtractor, ParseApiFactory};

/// Kind of media a result contains, normalized from the upstream type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MediaType {
    Video,
    ImageSet,
    Unknown,
}

impl MediaType {
    /// Maps an upstream type tag onto the enum. Unrecognized tags become `Unknown`.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_lowercase().as_str() {
            "video" | "videos" | "视频" => MediaType::Video,
            "image" | "images" | "imageset" | "photo" | "图片" | "图集" => MediaType::ImageSet,
            _ => MediaType::Unknown,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MediaType::Video => "video",
            MediaType::ImageSet => "images",
            MediaType::Unknown => "files",
        }
    }
}

/// Display fields describing the extracted work. All optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub author: Option<String>,
    pub published_at: Option<String>,
}

impl WorkMetadata {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.author.is_none() && self.published_at.is_none()
    }
}

/// Outcome of one successful extraction. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionResult {
    pub media_type: MediaType,
    /// Media references in upstream order, already filtered for validity.
    pub source_urls: Vec<String>,
    pub metadata: WorkMetadata,
}

impl ExtractionResult {
    pub fn new(media_type: MediaType, source_urls: Vec<String>, metadata: WorkMetadata) -> Self {
        Self {
            media_type,
            source_urls,
            metadata,
        }
    }

    pub fn len(&self) -> usize {
        self.source_urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source_urls.is_empty()
    }
}

/// Construction parameters for an extractor instance.
///
/// Handles are only reused for requests with equal preferences.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ExtractorPreferences {
    /// Opaque encoding hint forwarded to the extraction service.
    pub media_encoding: Option<String>,
}

impl ExtractorPreferences {
    pub fn with_encoding(encoding: impl Into<String>) -> Self {
        Self {
            media_encoding: Some(encoding.into()),
        }
    }
}

/// Errors raised by extractors and their factories.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The service answered with an explicit failure message
    #[error("{0}")]
    Upstream(String),

    /// The service answered without any usable result
    #[error("no result returned for this link")]
    NoResult,

    /// The request did not complete in time
    #[error("extraction request timed out")]
    Timeout,

    /// Non-success HTTP status from the service
    #[error("extraction service returned status {0}")]
    Status(reqwest::StatusCode),

    /// Network level failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The response body was not the expected JSON
    #[error("malformed extraction response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Building an extractor instance failed
    #[error("failed to construct extractor: {0}")]
    Construct(String),
}

/// A live extractor instance.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Extracts media references from `url`.
    ///
    /// `Ok(None)` means the service knew nothing about the link.
    async fn extract(&self, url: &Url) -> Result<Option<ExtractionResult>, ExtractError>;
}

/// Builds and tears down extractor instances. Owned by the pool.
#[async_trait]
pub trait ExtractorFactory: Send + Sync {
    /// Human-readable name of the backend (for logs)
    fn name(&self) -> &str;

    /// Performs the expensive setup of a new instance.
    async fn construct(&self, preferences: &ExtractorPreferences) -> Result<Box<dyn Extractor>, ExtractError>;

    /// Releases whatever the instance holds. Errors are logged by the caller, never escalated.
    async fn destroy(&self, extractor: Box<dyn Extractor>) -> Result<(), ExtractError>;
}
