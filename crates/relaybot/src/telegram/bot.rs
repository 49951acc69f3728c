//! Bot initialization
//!
//! This module contains:
//! - Command enum definition
//! - Bot instance creation (optionally behind a proxy)
//! - Command registration in the Telegram UI

use reqwest::ClientBuilder;
use std::time::Duration;
use teloxide::prelude::*;
use teloxide::types::BotCommand;
use teloxide::utils::command::BotCommands;

use relaycore::config;

/// Bot commands enum with descriptions
#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Send me a link and I'll fetch its media. Commands:")]
pub enum Command {
    #[command(description = "introduction")]
    Start,
    #[command(description = "how to use the bot")]
    Help,
    #[command(description = "failed deliveries waiting for your decision")]
    Pending,
}

/// Creates a Bot instance, routing Telegram traffic through `proxy` when given
///
/// # Returns
/// * `Ok(Bot)` - Successfully created bot instance
/// * `Err(anyhow::Error)` - Missing token or invalid proxy
pub fn create_bot(proxy: Option<&str>) -> anyhow::Result<Bot> {
    let token = config::BOT_TOKEN.clone();
    if token.is_empty() {
        anyhow::bail!("BOT_TOKEN (or TELOXIDE_TOKEN) is not set");
    }

    // Media groups with remote URLs can take a while on Telegram's side.
    let mut builder = ClientBuilder::new().timeout(Duration::from_secs(120));
    if let Some(proxy_url) = proxy {
        log::info!("Using proxy for Telegram API: {}", proxy_url);
        builder = builder.proxy(reqwest::Proxy::all(proxy_url)?);
    }

    Ok(Bot::with_client(token, builder.build()?))
}

/// Sets up bot commands in Telegram UI
pub async fn setup_bot_commands(bot: &Bot) -> Result<(), teloxide::RequestError> {
    bot.set_my_commands(vec![
        BotCommand::new("start", "introduction"),
        BotCommand::new("help", "how to use the bot"),
        BotCommand::new("pending", "failed deliveries waiting for your decision"),
    ])
    .await?;

    Ok(())
}
