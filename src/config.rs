use std::{
    env::{self, VarError},
    time::Duration,
};

use teloxide::types::{ChatId, UserId};

const DEFAULT_DATABASE_URL: &str = "sqlite:data/data.db";
const DEFAULT_WIKI_API_URL: &str = "https://en.wikipedia.org";
const DEFAULT_BATCH_SIZE: usize = 10;
const DEFAULT_PROGRESS_INTERVAL: usize = 5;
const DEFAULT_MAX_ATTEMPTS: usize = 3;
const DEFAULT_BROADCAST_COOLDOWN_SECS: u64 = 10;

/// Represents the application configuration.
#[derive(Debug)]
pub struct Config {
    /// The Telegram bot token.
    pub telegram_bot_token: String,
    /// The URL of the database.
    pub database_url: String,
    /// Users allowed to run admin commands.
    pub admins: Vec<UserId>,
    /// Chat that receives a copy of every private user message.
    pub log_channel: Option<ChatId>,
    /// Number of recipients a broadcast delivers to concurrently.
    pub broadcast_batch_size: usize,
    /// Number of processed recipients between two progress updates.
    pub broadcast_progress_interval: usize,
    /// Maximum number of attempts per broadcast recipient.
    pub delivery_max_attempts: usize,
    /// Minimum time between two `/broadcast` attempts of one admin. Zero
    /// disables the cooldown.
    pub broadcast_cooldown: Duration,
    /// Base URL of the Wikipedia instance used by `/wiki`.
    pub wiki_api_url: String,
}

impl Config {
    /// Creates a new `Config` instance from environment variables.
    pub fn from_env() -> Result<Self, VarError> {
        Ok(Self {
            telegram_bot_token: env::var("TELOXIDE_TOKEN")?,
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
            admins: env::var("ADMINS").map(|v| parse_admins(&v)).unwrap_or_default(),
            log_channel: env::var("LOG_CHANNEL")
                .ok()
                .and_then(|v| v.trim().parse().ok())
                .map(ChatId),
            broadcast_batch_size: positive_var("BROADCAST_BATCH_SIZE", DEFAULT_BATCH_SIZE),
            broadcast_progress_interval: positive_var(
                "BROADCAST_PROGRESS_INTERVAL",
                DEFAULT_PROGRESS_INTERVAL,
            ),
            delivery_max_attempts: positive_var("DELIVERY_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS),
            broadcast_cooldown: Duration::from_secs(
                env::var("BROADCAST_COOLDOWN_SECS")
                    .ok()
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or(DEFAULT_BROADCAST_COOLDOWN_SECS),
            ),
            wiki_api_url: env::var("WIKI_API_URL")
                .unwrap_or_else(|_| DEFAULT_WIKI_API_URL.to_string()),
        })
    }
}

/// Parses a comma-separated list of user ids, skipping anything that is not a
/// number.
fn parse_admins(value: &str) -> Vec<UserId> {
    value.split(',').filter_map(|id| id.trim().parse().ok()).map(UserId).collect()
}

fn positive_var(name: &str, default: usize) -> usize {
    env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default).max(1)
}
