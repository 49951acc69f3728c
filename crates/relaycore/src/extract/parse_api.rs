//! HTTP backend talking to the content-extraction service.
//!
//! Each extractor owns its own `reqwest::Client` (connection pool, proxy, TLS
//! session), which is why instances are pooled instead of built per request.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use url::Url;

use super::normalize::ParseApiResponse;
use super::{ExtractError, ExtractionResult, Extractor, ExtractorFactory, ExtractorPreferences};
use crate::core::config::RelayConfig;

/// Request body sent to the service.
#[derive(Debug, Serialize)]
struct ParseRequest<'a> {
    url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a str>,
}

/// One live session against the parse API.
pub struct ParseApiExtractor {
    client: reqwest::Client,
    endpoint: Url,
    preferences: ExtractorPreferences,
}

impl ParseApiExtractor {
    fn map_request_error(e: reqwest::Error) -> ExtractError {
        if e.is_timeout() {
            ExtractError::Timeout
        } else {
            ExtractError::Http(e)
        }
    }
}

#[async_trait]
impl Extractor for ParseApiExtractor {
    async fn extract(&self, url: &Url) -> Result<Option<ExtractionResult>, ExtractError> {
        let payload = ParseRequest {
            url: url.as_str(),
            format: self.preferences.media_encoding.as_deref(),
        };

        log::info!("Parse API request for {}", url);
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&payload)
            .send()
            .await
            .map_err(Self::map_request_error)?;

        let status = response.status();
        if !status.is_success() {
            log::warn!("Parse API returned {} for {}", status, url);
            return Err(ExtractError::Status(status));
        }

        let body = response.text().await.map_err(Self::map_request_error)?;
        let parsed: ParseApiResponse = serde_json::from_str(&body)?;
        let result = parsed.into_result()?;
        match result {
            Some(ref r) => log::info!("Parse API found {} media ({:?}) for {}", r.len(), r.media_type, url),
            None => log::info!("Parse API returned no result for {}", url),
        }
        Ok(result)
    }
}

/// Builds [`ParseApiExtractor`] sessions for the pool.
#[derive(Debug, Clone)]
pub struct ParseApiFactory {
    endpoint: Url,
    timeout: Duration,
    proxy: Option<String>,
}

impl ParseApiFactory {
    pub fn new(endpoint: Url, timeout: Duration, proxy: Option<String>) -> Self {
        Self {
            endpoint,
            timeout,
            proxy,
        }
    }

    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(
            config.parse_api_url.clone(),
            config.parse_api_timeout,
            config.proxy_url.clone(),
        )
    }
}

#[async_trait]
impl ExtractorFactory for ParseApiFactory {
    fn name(&self) -> &str {
        "parse-api"
    }

    async fn construct(&self, preferences: &ExtractorPreferences) -> Result<Box<dyn Extractor>, ExtractError> {
        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(concat!("relaycore/", env!("CARGO_PKG_VERSION")));

        if let Some(ref proxy_url) = self.proxy {
            let proxy = reqwest::Proxy::all(proxy_url.as_str())
                .map_err(|e| ExtractError::Construct(format!("invalid proxy {}: {}", proxy_url, e)))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| ExtractError::Construct(format!("HTTP client: {}", e)))?;

        log::debug!(
            "Constructed parse API session for {} (encoding: {:?})",
            self.endpoint,
            preferences.media_encoding
        );

        Ok(Box::new(ParseApiExtractor {
            client,
            endpoint: self.endpoint.clone(),
            preferences: preferences.clone(),
        }))
    }

    async fn destroy(&self, extractor: Box<dyn Extractor>) -> Result<(), ExtractError> {
        // Dropping the client closes its idle connections.
        drop(extractor);
        log::debug!("Destroyed parse API session for {}", self.endpoint);
        Ok(())
    }
}
