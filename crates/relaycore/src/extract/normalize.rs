//! Boundary conversion from the extraction service's loosely typed JSON
//! into [`ExtractionResult`].
//!
//! The service keys its fields in Chinese (`下载地址`, `作品类型`, ...); English
//! spellings used by other deployments are accepted as aliases.

use serde::Deserialize;
use serde_json::Value;

use super::{ExtractError, ExtractionResult, MediaType, WorkMetadata};
use crate::core::validation::is_valid_url;

/// Top-level envelope returned by the parse API.
#[derive(Debug, Default, Deserialize)]
pub struct ParseApiResponse {
    #[serde(default)]
    pub data: Option<RawExtraction>,
    #[serde(default)]
    pub message: Option<String>,
}

/// The `data` object exactly as the service sent it.
#[derive(Debug, Default, Deserialize)]
pub struct RawExtraction {
    #[serde(default, rename = "下载地址", alias = "download_urls", alias = "urls")]
    pub download_urls: Option<Value>,
    #[serde(default, rename = "作品类型", alias = "type", alias = "media_type")]
    pub media_type: Option<String>,
    #[serde(default, rename = "作品标题", alias = "title")]
    pub title: Option<Value>,
    #[serde(default, rename = "作品描述", alias = "desc", alias = "description")]
    pub description: Option<Value>,
    #[serde(default, rename = "作者昵称", alias = "author", alias = "nickname")]
    pub author: Option<Value>,
    #[serde(default, rename = "发布时间", alias = "published_at", alias = "create_time")]
    pub published_at: Option<Value>,
}

/// Renders a scalar JSON value as display text; empty strings count as missing.
fn display_text(value: Option<&Value>) -> Option<String> {
    let text = match value? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

impl RawExtraction {
    /// Whether the record carries a download list at all (possibly empty).
    pub fn has_download_list(&self) -> bool {
        matches!(self.download_urls, Some(Value::Array(_)) | Some(Value::String(_)))
    }

    /// Normalizes the record. Invalid media URLs are dropped here, so the
    /// result may legitimately be empty.
    pub fn normalize(&self) -> ExtractionResult {
        let candidates: Vec<&str> = match self.download_urls {
            Some(Value::Array(ref items)) => items.iter().filter_map(Value::as_str).collect(),
            Some(Value::String(ref single)) => vec![single.as_str()],
            _ => Vec::new(),
        };
        let source_urls: Vec<String> = candidates
            .into_iter()
            .map(str::trim)
            .filter(|url| is_valid_url(url))
            .map(str::to_string)
            .collect();

        let media_type = self
            .media_type
            .as_deref()
            .map(MediaType::from_tag)
            .unwrap_or(MediaType::Unknown);

        let metadata = WorkMetadata {
            title: display_text(self.title.as_ref()),
            description: display_text(self.description.as_ref()),
            author: display_text(self.author.as_ref()),
            published_at: display_text(self.published_at.as_ref()),
        };

        ExtractionResult::new(media_type, source_urls, metadata)
    }
}

impl ParseApiResponse {
    /// Converts the envelope into the extractor contract.
    ///
    /// - download list present → `Ok(Some(result))`
    /// - no list but a message → `Err(Upstream(message))`
    /// - neither → `Ok(None)`
    pub fn into_result(self) -> Result<Option<ExtractionResult>, ExtractError> {
        if let Some(ref data) = self.data {
            if data.has_download_list() {
                return Ok(Some(data.normalize()));
            }
        }
        match self.message.map(|m| m.trim().to_string()) {
            Some(message) if !message.is_empty() => Err(ExtractError::Upstream(message)),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn parse(value: Value) -> ParseApiResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_chinese_keys_are_normalized() {
        let response = parse(json!({
            "data": {
                "下载地址": ["https://cdn.example.com/1.jpg", "not a url", "https://cdn.example.com/2.jpg"],
                "作品类型": "图集",
                "作品标题": "  Sunset ",
                "作者昵称": "cat",
                "发布时间": 1700000000
            }
        }));
        let result = response.into_result().unwrap().unwrap();
        assert_eq!(result.media_type, MediaType::ImageSet);
        assert_eq!(
            result.source_urls,
            vec!["https://cdn.example.com/1.jpg".to_string(), "https://cdn.example.com/2.jpg".to_string()]
        );
        assert_eq!(result.metadata.title.as_deref(), Some("Sunset"));
        assert_eq!(result.metadata.author.as_deref(), Some("cat"));
        assert_eq!(result.metadata.published_at.as_deref(), Some("1700000000"));
        assert_eq!(result.metadata.description, None);
    }

    #[test]
    fn test_english_aliases() {
        let response = parse(json!({
            "data": { "download_urls": "https://cdn.example.com/v.mp4", "type": "video", "desc": "clip" }
        }));
        let result = response.into_result().unwrap().unwrap();
        assert_eq!(result.media_type, MediaType::Video);
        assert_eq!(result.source_urls.len(), 1);
        assert_eq!(result.metadata.description.as_deref(), Some("clip"));
    }

    #[test]
    fn test_missing_list_with_message_is_upstream_error() {
        let response = parse(json!({ "data": null, "message": "链接解析失败" }));
        match response.into_result() {
            Err(ExtractError::Upstream(msg)) => assert_eq!(msg, "链接解析失败"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_missing_everything_is_no_result() {
        assert!(parse(json!({})).into_result().unwrap().is_none());
    }

    #[test]
    fn test_all_invalid_urls_yield_empty_result() {
        let response = parse(json!({ "data": { "下载地址": ["nope", 42] } }));
        let result = response.into_result().unwrap().unwrap();
        assert!(result.is_empty());
        assert_eq!(result.media_type, MediaType::Unknown);
    }
}
