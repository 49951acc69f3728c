//! Batch progress shown by editing the status message
//!
//! The scheduler notifies synchronously from job tasks; notifications go into a
//! `watch` channel and a separate task edits the message, so bursts of
//! completions collapse into one edit and a slow Telegram API never blocks a job.

use std::time::Duration;

use teloxide::prelude::*;
use teloxide::types::MessageId;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use relaycore::scheduler::{BatchProgress, ProgressSink, SinkError};

use super::messages;

/// Minimum spacing between two edits of the same message.
const EDIT_INTERVAL: Duration = Duration::from_millis(1500);

pub struct TelegramProgress {
    tx: watch::Sender<BatchProgress>,
}

impl TelegramProgress {
    pub fn channel(total: usize) -> (Self, watch::Receiver<BatchProgress>) {
        let (tx, rx) = watch::channel(BatchProgress {
            completed: 0,
            failed: 0,
            total,
        });
        (Self { tx }, rx)
    }
}

impl ProgressSink for TelegramProgress {
    fn notify(&self, progress: BatchProgress) -> Result<(), SinkError> {
        self.tx
            .send(progress)
            .map_err(|_| SinkError("progress editor has stopped".to_string()))
    }
}

/// Spawns the editor task. It ends once the sink is dropped.
pub fn spawn_editor(
    bot: Bot,
    chat_id: ChatId,
    message_id: MessageId,
    mut rx: watch::Receiver<BatchProgress>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut last_text = String::new();
        while rx.changed().await.is_ok() {
            let progress = *rx.borrow_and_update();
            if progress.is_done() {
                // The final summary replaces this message anyway.
                continue;
            }
            let text = messages::progress_text(&progress);
            if text == last_text {
                continue;
            }
            if let Err(e) = bot.edit_message_text(chat_id, message_id, text.clone()).await {
                log::debug!("Failed to edit progress message in chat {}: {}", chat_id, e);
            }
            last_text = text;
            tokio::time::sleep(EDIT_INTERVAL).await;
        }
    })
}
