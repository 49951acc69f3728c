//! Slicing an extraction result into transport-sized media batches.

use serde::Serialize;

use crate::extract::{ExtractionResult, MediaType, WorkMetadata};

/// Hard ceiling of media items per grouped message.
pub const MAX_BATCH_SIZE: usize = 10;

/// Longest caption the transport accepts, in characters.
pub const MAX_CAPTION_CHARS: usize = 1024;

/// How a single media reference is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MediaKind {
    Photo,
    Video,
    Document,
}

impl MediaKind {
    pub fn for_media_type(media_type: MediaType) -> Self {
        match media_type {
            MediaType::Video => MediaKind::Video,
            MediaType::ImageSet => MediaKind::Photo,
            MediaType::Unknown => MediaKind::Document,
        }
    }
}

/// One media reference with its 1-based position in the full result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaItem {
    pub position: usize,
    pub url: String,
    pub kind: MediaKind,
}

/// Up to [`MAX_BATCH_SIZE`] items sent as one grouped message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaBatch {
    /// 1-based index of this batch
    pub part: usize,
    pub parts: usize,
    pub items: Vec<MediaItem>,
    /// Attached to `items[0]` only
    pub caption: Option<String>,
}

impl MediaBatch {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Caption for the item at `index`: only the first item carries one.
    pub fn caption_for(&self, index: usize) -> Option<&str> {
        if index == 0 {
            self.caption.as_deref()
        } else {
            None
        }
    }

    pub fn positions(&self) -> impl Iterator<Item = usize> + '_ {
        self.items.iter().map(|item| item.position)
    }
}

/// Lists every media reference of `result` in order.
pub fn media_items(result: &ExtractionResult) -> Vec<MediaItem> {
    let kind = MediaKind::for_media_type(result.media_type);
    result
        .source_urls
        .iter()
        .enumerate()
        .map(|(i, url)| MediaItem {
            position: i + 1,
            url: url.clone(),
            kind,
        })
        .collect()
}

/// Formats work metadata, an item count and the source link into a caption body.
pub fn format_caption(metadata: &WorkMetadata, item_count: usize, source_url: &str) -> String {
    let mut lines = Vec::new();
    if let Some(ref title) = metadata.title {
        lines.push(title.clone());
    }
    if let Some(ref description) = metadata.description {
        if metadata.title.as_ref() != Some(description) {
            lines.push(description.clone());
        }
    }
    match (&metadata.author, &metadata.published_at) {
        (Some(author), Some(published)) => lines.push(format!("by {} · {}", author, published)),
        (Some(author), None) => lines.push(format!("by {}", author)),
        (None, Some(published)) => lines.push(published.clone()),
        (None, None) => {}
    }
    if !lines.is_empty() {
        lines.push(String::new());
    }
    lines.push(format!(
        "{} file{}",
        item_count,
        if item_count == 1 { "" } else { "s" }
    ));
    lines.push(format!("Source: {}", source_url));
    lines.join("\n")
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let keep = max.saturating_sub(1);
    let mut truncated: String = text.chars().take(keep).collect();
    truncated.push('…');
    truncated
}

/// Builds the caption for batch `part` of `parts`, appending a `part i/n`
/// marker when there is more than one batch. The marker always survives
/// truncation.
pub fn batch_caption(body: &str, part: usize, parts: usize) -> String {
    if parts <= 1 {
        return truncate_chars(body, MAX_CAPTION_CHARS);
    }
    let marker = format!("part {}/{}", part, parts);
    if body.is_empty() {
        return marker;
    }
    let room = MAX_CAPTION_CHARS.saturating_sub(marker.chars().count() + 1);
    format!("{}\n{}", truncate_chars(body, room), marker)
}

/// Partitions `items` into windows of `max_size` (capped at [`MAX_BATCH_SIZE`]),
/// preserving order. Every batch gets a caption for its first item.
pub fn build_batches(items: Vec<MediaItem>, caption: &str, max_size: usize) -> Vec<MediaBatch> {
    let window = max_size.clamp(1, MAX_BATCH_SIZE);
    let parts = items.len().div_ceil(window);
    let mut batches = Vec::with_capacity(parts);
    let mut items = items.into_iter().peekable();
    let mut part = 0;

    while items.peek().is_some() {
        part += 1;
        let chunk: Vec<MediaItem> = items.by_ref().take(window).collect();
        batches.push(MediaBatch {
            part,
            parts,
            items: chunk,
            caption: Some(batch_caption(caption, part, parts)),
        });
    }
    batches
}
