//! Dispatcher schema and update handlers

use std::error::Error;
use std::sync::Arc;

use teloxide::dispatching::{UpdateFilterExt, UpdateHandler};
use teloxide::prelude::*;
use teloxide::types::{CallbackQuery, Message, MessageId};
use teloxide::utils::command::BotCommands;
use teloxide::RequestError;
use tokio::task::JoinHandle;
use url::Url;

use relaycore::core::validation::parse_urls;
use relaycore::{BatchSummary, DeliveryReport, Destination, JobOutcome, RecoveryId, RelayError, RelayService};

use super::bot::Command;
use super::keyboard::{parse_callback, recovery_keyboard, RecoveryAction};
use super::messages;
use super::progress::{spawn_editor, TelegramProgress};

/// Error type for handler endpoints
pub type HandlerError = Box<dyn Error + Send + Sync>;

/// Dependencies shared by all handlers
#[derive(Clone)]
pub struct HandlerDeps {
    pub service: Arc<RelayService>,
    pub max_urls_per_message: usize,
}

impl HandlerDeps {
    pub fn new(service: Arc<RelayService>, max_urls_per_message: usize) -> Self {
        Self {
            service,
            max_urls_per_message: max_urls_per_message.max(1),
        }
    }
}

/// Creates the dispatcher schema for the bot.
///
/// # Arguments
/// * `deps` - Handler dependencies (the relay service and limits)
pub fn schema(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    let deps_commands = deps.clone();
    let deps_messages = deps.clone();
    let deps_callback = deps;

    dptree::entry()
        .branch(command_handler(deps_commands))
        .branch(message_handler(deps_messages))
        .branch(callback_handler(deps_callback))
}

fn command_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message().branch(dptree::entry().filter_command::<Command>().endpoint(
        move |bot: Bot, msg: Message, cmd: Command| {
            let deps = deps.clone();
            async move {
                log::info!("Received command {:?} from chat {}", cmd, msg.chat.id);
                match cmd {
                    Command::Start => {
                        bot.send_message(msg.chat.id, messages::START_TEXT).await?;
                    }
                    Command::Help => {
                        let descriptions = Command::descriptions().to_string();
                        bot.send_message(msg.chat.id, messages::help_text(&descriptions)).await?;
                    }
                    Command::Pending => {
                        let count = deps.service.pending_recoveries(Destination(msg.chat.id.0)).await;
                        bot.send_message(msg.chat.id, messages::pending_text(count)).await?;
                    }
                }
                Ok(())
            }
        },
    ))
}

fn message_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message()
        .filter(|msg: Message| msg.text().is_some())
        .endpoint(move |bot: Bot, msg: Message| {
            let deps = deps.clone();
            async move {
                let text = msg.text().unwrap_or_default();
                match parse_urls(text, deps.max_urls_per_message) {
                    Ok(urls) => {
                        // Detached so the chat's update queue keeps moving while the batch runs.
                        spawn_url_batch(bot, msg.chat.id, urls, deps);
                    }
                    Err(e) => {
                        log::debug!("No URL in message from chat {}: {}", msg.chat.id, e);
                        bot.send_message(msg.chat.id, e.user_message()).await?;
                    }
                }
                Ok(())
            }
        })
}

/// Runs the batch for one message in its own task.
fn spawn_url_batch(bot: Bot, chat_id: ChatId, urls: Vec<Url>, deps: HandlerDeps) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = handle_urls(&bot, chat_id, urls, &deps).await {
            log::error!("Batch for chat {} failed: {}", chat_id, e);
        }
    })
}

/// Runs a batch for the URLs of one message and reports the outcome of each job.
async fn handle_urls(bot: &Bot, chat_id: ChatId, urls: Vec<Url>, deps: &HandlerDeps) -> Result<(), HandlerError> {
    log::info!("Chat {} submitted {} URL(s)", chat_id, urls.len());
    let status = bot.send_message(chat_id, messages::processing_text(urls.len())).await?;

    let (sink, rx) = TelegramProgress::channel(urls.len());
    let editor = spawn_editor(bot.clone(), chat_id, status.id, rx);

    let summary = deps
        .service
        .run_batch(Destination(chat_id.0), urls.clone(), Arc::new(sink))
        .await;
    editor.abort();

    if let Err(e) = bot
        .edit_message_text(chat_id, status.id, messages::summary_text(&summary))
        .await
    {
        log::warn!("Failed to update status message in chat {}: {}", chat_id, e);
    }

    report_outcomes(bot, chat_id, &urls, &summary).await;
    Ok(())
}

/// Replies once per job that needs a reply. A failed reply is logged and the
/// remaining jobs are still reported. Returns the number of failed replies.
async fn report_outcomes(
    bot: &Bot,
    chat_id: ChatId,
    urls: &[Url],
    summary: &BatchSummary<DeliveryReport>,
) -> usize {
    let mut failed_replies = 0;
    for (url, outcome) in urls.iter().zip(summary.outcomes.iter()) {
        let sent = match outcome {
            JobOutcome::Succeeded(DeliveryReport::Success { .. }) => continue,
            JobOutcome::Succeeded(report) => send_report(bot, chat_id, report).await,
            JobOutcome::Failed(e) => send_text(bot, chat_id, messages::job_error_text(url.as_str(), e)).await,
            JobOutcome::TimedOut(after) => {
                let error = RelayError::Timeout(*after);
                send_text(bot, chat_id, messages::job_error_text(url.as_str(), &error)).await
            }
            JobOutcome::Panicked(reason) => {
                log::error!("Job for {} in chat {} crashed: {}", url, chat_id, reason);
                send_text(bot, chat_id, messages::job_crashed_text(url.as_str())).await
            }
        };
        if let Err(e) = sent {
            failed_replies += 1;
            log::warn!("Failed to report {} to chat {}: {}", url, chat_id, e);
        }
    }
    failed_replies
}

async fn send_text(bot: &Bot, chat_id: ChatId, text: String) -> Result<(), RequestError> {
    bot.send_message(chat_id, text).await.map(|_| ())
}

/// Sends the reply for a delivery report, with the recovery keyboard when a decision is needed.
async fn send_report(bot: &Bot, chat_id: ChatId, report: &DeliveryReport) -> Result<(), RequestError> {
    match report {
        DeliveryReport::PartialFailure(partial) => bot
            .send_message(chat_id, messages::partial_failure_text(partial))
            .reply_markup(recovery_keyboard(partial.recovery_id))
            .await
            .map(|_| ()),
        other => send_text(bot, chat_id, messages::report_text(other)).await,
    }
}

fn callback_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_callback_query().endpoint(move |bot: Bot, q: CallbackQuery| {
        let deps = deps.clone();
        async move { handle_recovery_callback(&bot, &q, &deps).await }
    })
}

async fn handle_recovery_callback(bot: &Bot, q: &CallbackQuery, deps: &HandlerDeps) -> Result<(), HandlerError> {
    // Acknowledging is cosmetic; a stale query must not block the decision.
    if let Err(e) = bot.answer_callback_query(q.id.clone()).await {
        log::debug!("Failed to answer callback query: {}", e);
    }

    let Some((action, id)) = q.data.as_deref().and_then(parse_callback) else {
        log::debug!("Ignoring unknown callback data {:?}", q.data);
        return Ok(());
    };

    let chat_id = match q.message.as_ref() {
        Some(m) => m.chat().id,
        None => ChatId(i64::try_from(q.from.id.0)?),
    };
    apply_recovery(bot, chat_id, q.message.as_ref().map(|m| m.id()), action, id, deps).await;
    Ok(())
}

/// Runs the chosen recovery action and replies with its outcome.
async fn apply_recovery(
    bot: &Bot,
    chat_id: ChatId,
    keyboard_message: Option<MessageId>,
    action: RecoveryAction,
    id: RecoveryId,
    deps: &HandlerDeps,
) {
    log::info!("Recovery action {:?} for {} from chat {}", action, id, chat_id);

    // The decision is made; drop the buttons so they can't be pressed twice.
    if let Some(message_id) = keyboard_message {
        if let Err(e) = bot.edit_message_reply_markup(chat_id, message_id).await {
            log::debug!("Failed to remove recovery keyboard: {}", e);
        }
    }

    let result = match action {
        RecoveryAction::Retry => deps.service.retry_failed(id).await,
        RecoveryAction::SendAvailable => deps.service.send_available(id).await,
        RecoveryAction::Cancel => deps.service.cancel(id).await,
    };

    let sent = match result {
        // A retry that still fails comes back as a new offer with its own keyboard.
        Ok(report) => send_report(bot, chat_id, &report).await,
        Err(RelayError::RecoveryExpired(_)) => send_text(bot, chat_id, messages::EXPIRED_TEXT.to_string()).await,
        Err(e) => {
            log::error!("Recovery action {:?} for {} failed: {}", action, id, e);
            send_text(bot, chat_id, e.user_message()).await
        }
    };
    if let Err(e) = sent {
        log::warn!("Failed to reply to recovery action {:?} in chat {}: {}", action, chat_id, e);
    }
}
