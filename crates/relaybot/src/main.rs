use std::sync::Arc;

use anyhow::Result;
use dotenvy::dotenv;
use teloxide::dispatching::Dispatcher;
use teloxide::prelude::*;
use teloxide::update_listeners::Polling;
use url::Url;

use relaybot::cli::{Cli, Commands};
use relaybot::telegram::{create_bot, schema, setup_bot_commands, HandlerDeps, TelegramTransport};
use relaycore::core::{init_logger, log_startup_configuration, metrics, metrics_server};
use relaycore::extract::ParseApiFactory;
use relaycore::{config, ExtractorPool, ExtractorPreferences, RelayConfig, RelayService};

/// Main entry point
///
/// Parses CLI arguments and dispatches to the selected subcommand.
///
/// # Errors
/// Returns an error if initialization fails (logging, configuration, bot creation).
#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env if present
    let _ = dotenv();

    let cli = Cli::parse_args();

    init_logger(&config::LOG_FILE_PATH)?;

    let relay = RelayConfig::from_env()?;
    log_startup_configuration(&relay);

    match cli.command {
        Some(Commands::Run) | None => run_bot(relay).await,
        Some(Commands::Extract { url, json }) => run_cli_extract(relay, &url, json).await,
    }
}

async fn run_bot(relay: RelayConfig) -> Result<()> {
    log::info!("Starting relay bot...");
    let bot = create_bot(relay.proxy_url.as_deref())?;

    let transport = Arc::new(TelegramTransport::new(bot.clone()));
    let factory = Arc::new(ParseApiFactory::from_config(&relay));
    let service = RelayService::from_config(&relay, factory, transport);

    if *config::metrics::ENABLED {
        metrics::init_metrics();
        let metrics_port = *config::metrics::PORT;
        let pool = Arc::clone(service.pool());
        log::info!("Starting metrics server on port {}", metrics_port);
        tokio::spawn(async move {
            if let Err(e) = metrics_server::start_metrics_server(metrics_port, Some(pool)).await {
                log::error!("Metrics server error: {}", e);
            }
        });
    }

    if let Err(e) = setup_bot_commands(&bot).await {
        log::warn!("Failed to register bot commands: {}", e);
    }

    let handler = schema(HandlerDeps::new(Arc::clone(&service), *config::MAX_URLS_PER_MESSAGE));
    let listener = Polling::builder(bot.clone()).drop_pending_updates().build();

    log::info!("Bot is running, press Ctrl+C to stop");
    Dispatcher::builder(bot, handler)
        .dependencies(DependencyMap::new())
        .enable_ctrlc_handler()
        .build()
        .dispatch_with_listener(
            listener,
            LoggingErrorHandler::with_custom_text("An error from the update listener"),
        )
        .await;

    log::info!("Dispatcher stopped, draining extractor pool");
    service.shutdown().await;
    log::info!("Shutdown complete");
    Ok(())
}

async fn run_cli_extract(relay: RelayConfig, raw_url: &str, json: bool) -> Result<()> {
    let url = Url::parse(raw_url).map_err(|e| anyhow::anyhow!("Invalid URL {}: {}", raw_url, e))?;

    let factory = Arc::new(ParseApiFactory::from_config(&relay));
    let pool = ExtractorPool::new(factory, 1, relay.pool_stall_warning);
    let preferences = ExtractorPreferences {
        media_encoding: relay.preferred_encoding.clone(),
    };

    let extracted = match pool.acquire(&preferences).await {
        Ok(extractor) => {
            let extracted = extractor.extract(&url).await;
            extractor.release();
            extracted.map_err(anyhow::Error::from)
        }
        Err(e) => Err(anyhow::Error::from(e)),
    };
    pool.drain_and_close().await;

    let Some(result) = extracted? else {
        return Err(anyhow::anyhow!("The service returned no result for {}", url));
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("Type: {}", result.media_type.label());
    if let Some(ref title) = result.metadata.title {
        println!("Title: {}", title);
    }
    if let Some(ref author) = result.metadata.author {
        println!("Author: {}", author);
    }
    if let Some(ref published) = result.metadata.published_at {
        println!("Published: {}", published);
    }
    println!("Media ({}):", result.len());
    for (index, source) in result.source_urls.iter().enumerate() {
        println!("  {:>2}. {}", index + 1, source);
    }
    Ok(())
}
