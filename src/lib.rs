#![warn(missing_docs)]
//! A Telegram support bot.
//!
//! Users talk to the bot in private; their messages are forwarded to a log
//! channel and answered with keyword auto-replies. Admins can replicate a
//! message to every registered user, manage auto-replies and inline button
//! responses, and anyone can look up Wikipedia summaries.

/// The main handler for the bot's logic.
pub mod bot_handler;
/// Delivery of one message to every registered user.
pub mod broadcast;
/// The line-based button markup used by auto-replies.
pub mod buttons;
/// The configuration for the application.
pub mod config;
/// The dispatcher for routing updates to the correct handlers.
pub mod dispatcher;
/// The service for sending messages to the user.
pub mod messaging;
/// The storage layer for persisting data.
pub mod storage;
/// The client for the Wikipedia API.
pub mod wiki;

use std::sync::Arc;

use teloxide::prelude::*;

use crate::{
    bot_handler::BotHandler,
    broadcast::{BroadcastEngine, BroadcastSettings, DeliveryPolicy, TelegramDeliveryTransport},
    config::Config,
    messaging::TelegramMessagingService,
    storage::sqlite::SqliteStorage,
    wiki::DefaultWikiClient,
};

/// Runs the bot.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    let storage = Arc::new(SqliteStorage::new(&config.database_url).await?);
    let bot = Bot::new(config.telegram_bot_token.clone());

    if config.admins.is_empty() {
        tracing::warn!("No admins configured, admin commands are disabled.");
    }

    let messaging_service = Arc::new(TelegramMessagingService::new(bot.clone()));
    let transport = Arc::new(TelegramDeliveryTransport::new(bot.clone()));
    let settings = BroadcastSettings {
        batch_size: config.broadcast_batch_size,
        progress_interval: config.broadcast_progress_interval,
        policy: DeliveryPolicy::new(config.delivery_max_attempts),
    };
    let broadcast_engine = Arc::new(BroadcastEngine::new(
        storage.clone(),
        storage.clone(),
        transport,
        messaging_service.clone(),
        settings,
    ));
    let wiki_client = Arc::new(DefaultWikiClient::new(&config.wiki_api_url)?);

    let handler = Arc::new(
        BotHandler::new(
            messaging_service,
            storage.clone(),
            storage.clone(),
            storage,
            wiki_client,
            broadcast_engine,
            config.admins,
        )
        .with_log_channel(config.log_channel)
        .with_broadcast_cooldown(config.broadcast_cooldown),
    );
    let mut dispatcher = dispatcher::BotDispatcher::new(handler).build(bot);
    tracing::debug!("Dispatcher built successfully.");

    dispatcher.dispatch().await;

    Ok(())
}
