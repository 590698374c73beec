use anyhow::Result;
use std::sync::Arc;
use teloxide::prelude::*;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wb_position_bot::bot::{message_handler, AppState};
use wb_position_bot::config::{AppConfig, LogConfig};
use wb_position_bot::localization::init_localization;

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Tracing starts before the rest of the configuration is parsed
    init_tracing(LogConfig::from_env().json);

    let config = AppConfig::from_env().inspect_err(|e| error!(error = %e, "Invalid configuration"))?;
    info!(?config, "Starting Wildberries position bot");

    init_localization()?;
    info!("Localization initialized");

    let bot = Bot::new(&config.bot_token);
    let state = Arc::new(AppState::new(config)?);

    // Skip messages that piled up while the bot was offline
    bot.delete_webhook().drop_pending_updates(true).await?;
    info!("Pending updates dropped, starting dispatcher");

    let handler = Update::filter_message().endpoint(message_handler);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}
