//! Telegram implementation of the media transport
//!
//! Telegram's `sendMediaGroup` needs 2-10 items, so single-item batches go
//! through `sendPhoto` / `sendVideo` / `sendDocument` instead. Media are passed
//! as URLs and fetched by Telegram itself.

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{InputFile, InputMedia, InputMediaDocument, InputMediaPhoto, InputMediaVideo};
use teloxide::RequestError;
use url::Url;

use relaycore::delivery::{Destination, MediaBatch, MediaItem, MediaKind, Transport, TransportError, MAX_BATCH_SIZE};

pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    async fn send_single(&self, chat_id: ChatId, item: &MediaItem, caption: Option<&str>) -> Result<(), TransportError> {
        let file = InputFile::url(media_url(item)?);
        let sent: Result<(), RequestError> = match item.kind {
            MediaKind::Photo => {
                let mut request = self.bot.send_photo(chat_id, file);
                if let Some(text) = caption {
                    request = request.caption(text);
                }
                request.await.map(|_| ())
            }
            MediaKind::Video => {
                let mut request = self.bot.send_video(chat_id, file);
                if let Some(text) = caption {
                    request = request.caption(text);
                }
                request.await.map(|_| ())
            }
            MediaKind::Document => {
                let mut request = self.bot.send_document(chat_id, file);
                if let Some(text) = caption {
                    request = request.caption(text);
                }
                request.await.map(|_| ())
            }
        };
        sent.map_err(|e| TransportError::new(e.to_string()))
    }
}

fn media_url(item: &MediaItem) -> Result<Url, TransportError> {
    Url::parse(&item.url)
        .map_err(|e| TransportError::new(format!("wrong file identifier/HTTP URL specified: {} ({})", item.url, e)))
}

/// Builds the `InputMedia` list for a group; the caption goes on the first entry.
pub fn input_media(batch: &MediaBatch) -> Result<Vec<InputMedia>, TransportError> {
    batch
        .items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let file = InputFile::url(media_url(item)?);
            let caption = batch.caption_for(index).map(str::to_string);
            let media = match item.kind {
                MediaKind::Photo => {
                    let mut media = InputMediaPhoto::new(file);
                    if let Some(text) = caption {
                        media = media.caption(text);
                    }
                    InputMedia::Photo(media)
                }
                MediaKind::Video => {
                    let mut media = InputMediaVideo::new(file);
                    if let Some(text) = caption {
                        media = media.caption(text);
                    }
                    InputMedia::Video(media)
                }
                MediaKind::Document => {
                    let mut media = InputMediaDocument::new(file);
                    if let Some(text) = caption {
                        media = media.caption(text);
                    }
                    InputMedia::Document(media)
                }
            };
            Ok(media)
        })
        .collect()
}

#[async_trait]
impl Transport for TelegramTransport {
    fn max_batch_size(&self) -> usize {
        MAX_BATCH_SIZE
    }

    async fn send_batch(&self, destination: Destination, batch: &MediaBatch) -> Result<(), TransportError> {
        let chat_id = ChatId(destination.0);
        match batch.items.as_slice() {
            [] => Ok(()),
            [single] => self.send_single(chat_id, single, batch.caption_for(0)).await,
            _ => {
                let media = input_media(batch)?;
                self.bot
                    .send_media_group(chat_id, media)
                    .await
                    .map(|_| ())
                    .map_err(|e| TransportError::new(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaycore::delivery::MediaItem;

    fn batch(kind: MediaKind, n: usize) -> MediaBatch {
        MediaBatch {
            part: 1,
            parts: 1,
            items: (1..=n)
                .map(|position| MediaItem {
                    position,
                    url: format!("https://cdn.example.com/{}", position),
                    kind,
                })
                .collect(),
            caption: Some("Sunset".to_string()),
        }
    }

    #[test]
    fn test_caption_only_on_first_input_media() {
        let media = input_media(&batch(MediaKind::Photo, 3)).unwrap();
        assert_eq!(media.len(), 3);
        let captions: Vec<Option<String>> = media
            .iter()
            .map(|m| match m {
                InputMedia::Photo(p) => p.caption.clone(),
                _ => panic!("expected photos"),
            })
            .collect();
        assert_eq!(captions, vec![Some("Sunset".to_string()), None, None]);
    }

    #[test]
    fn test_media_kind_maps_to_input_media() {
        let videos = input_media(&batch(MediaKind::Video, 2)).unwrap();
        assert!(videos.iter().all(|m| matches!(m, InputMedia::Video(_))));
        let documents = input_media(&batch(MediaKind::Document, 2)).unwrap();
        assert!(documents.iter().all(|m| matches!(m, InputMedia::Document(_))));
    }

    #[test]
    fn test_bad_url_is_content_unavailable() {
        let mut bad = batch(MediaKind::Photo, 2);
        bad.items[1].url = "not a url".to_string();
        let err = input_media(&bad).unwrap_err();
        assert_eq!(err.kind(), relaycore::delivery::FailureKind::ContentUnavailable);
    }
}
