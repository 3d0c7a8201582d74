use std::time::Duration;

use async_trait::async_trait;
use backoff::{Error as BackoffError, ExponentialBackoff, future::retry};
use mockall::automock;
use teloxide::{ApiError, RequestError, prelude::*};
use thiserror::Error;
use tracing::{debug, warn};

use crate::broadcast::BroadcastTemplate;

/// Why a single delivery attempt did not go through.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// Telegram asked to wait before the next request.
    #[error("Rate limited, retry after {0:?}")]
    RateLimited(Duration),
    /// The user blocked the bot.
    #[error("Bot was blocked by the user")]
    Blocked,
    /// The account was deleted.
    #[error("User is deactivated")]
    Deactivated,
    /// The chat id does not resolve to a chat.
    #[error("Chat or user not found")]
    InvalidPeer,
    /// The bot may not write to the chat.
    #[error("Bot is not allowed to write to the chat")]
    Forbidden,
    /// Network or IO failure.
    #[error("Transient transport error: {0}")]
    Transient(String),
    /// Any other API error.
    #[error("Delivery failed: {0}")]
    Other(String),
}

impl DeliveryError {
    /// Errors worth another attempt after a backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, DeliveryError::Transient(_) | DeliveryError::RateLimited(_))
    }

    /// The outcome this error is counted as once no more attempts are made.
    pub fn outcome(&self) -> DeliveryOutcome {
        match self {
            DeliveryError::Blocked => DeliveryOutcome::Blocked,
            DeliveryError::Deactivated => DeliveryOutcome::Deactivated,
            DeliveryError::InvalidPeer => DeliveryOutcome::InvalidPeer,
            DeliveryError::Forbidden => DeliveryOutcome::Forbidden,
            DeliveryError::RateLimited(_)
            | DeliveryError::Transient(_)
            | DeliveryError::Other(_) => DeliveryOutcome::Failed,
        }
    }
}

impl From<RequestError> for DeliveryError {
    fn from(err: RequestError) -> Self {
        match err {
            RequestError::RetryAfter(seconds) => DeliveryError::RateLimited(seconds.duration()),
            RequestError::Api(ApiError::BotBlocked) => DeliveryError::Blocked,
            RequestError::Api(ApiError::UserDeactivated) => DeliveryError::Deactivated,
            RequestError::Api(ApiError::ChatNotFound | ApiError::UserNotFound) => {
                DeliveryError::InvalidPeer
            }
            RequestError::Api(
                ApiError::CantInitiateConversation
                | ApiError::CantTalkWithBots
                | ApiError::BotKicked
                | ApiError::BotKickedFromSupergroup
                | ApiError::NotEnoughRightsToPostMessages,
            ) => DeliveryError::Forbidden,
            err @ (RequestError::Network(_) | RequestError::Io(_)) => {
                DeliveryError::Transient(err.to_string())
            }
            err => DeliveryError::Other(err.to_string()),
        }
    }
}

/// Final classification of one recipient in a broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The copy was delivered.
    Sent,
    /// The user blocked the bot.
    Blocked,
    /// The account was deleted.
    Deactivated,
    /// The chat does not exist.
    InvalidPeer,
    /// The bot may not write to the chat.
    Forbidden,
    /// Any other failure, including exhausted retries.
    Failed,
}

impl DeliveryOutcome {
    /// Short human readable reason, used in admin replies.
    pub fn describe(&self) -> &'static str {
        match self {
            DeliveryOutcome::Sent => "delivered",
            DeliveryOutcome::Blocked => "the user blocked the bot",
            DeliveryOutcome::Deactivated => "the account is deactivated",
            DeliveryOutcome::InvalidPeer => "the chat was not found",
            DeliveryOutcome::Forbidden => "the bot cannot write to this chat",
            DeliveryOutcome::Failed => "delivery failed",
        }
    }
}

/// Sends a copy of the broadcast template to one recipient.
#[automock]
#[async_trait]
pub trait DeliveryTransport: Send + Sync {
    /// Makes one delivery attempt.
    async fn deliver(
        &self,
        template: &BroadcastTemplate,
        recipient: ChatId,
    ) -> Result<(), DeliveryError>;
}

/// Delivers with `copyMessage`, so the copy carries no "forwarded from" header.
pub struct TelegramDeliveryTransport {
    bot: Bot,
}

impl TelegramDeliveryTransport {
    /// Creates a transport sending through `bot`.
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl DeliveryTransport for TelegramDeliveryTransport {
    async fn deliver(
        &self,
        template: &BroadcastTemplate,
        recipient: ChatId,
    ) -> Result<(), DeliveryError> {
        self.bot
            .copy_message(recipient, template.from_chat_id, template.message_id)
            .await
            .map(|_| ())
            .map_err(DeliveryError::from)
    }
}

/// Retry rules for a single recipient.
///
/// A rate limit is honoured once inline: the attempt sleeps for the mandated
/// wait and tries again. Transient errors (including a second rate limit) are
/// retried with exponential backoff until `max_attempts` attempts were made.
/// Permanent errors are never retried.
#[derive(Debug, Clone)]
pub struct DeliveryPolicy {
    /// Attempts per recipient, the inline rate limit retry not counted.
    pub max_attempts: usize,
    /// First backoff interval.
    pub initial_backoff: Duration,
    /// Upper bound for a single backoff interval.
    pub max_backoff: Duration,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl DeliveryPolicy {
    /// Default backoff with the given number of attempts, at least one.
    pub fn new(max_attempts: usize) -> Self {
        Self { max_attempts: max_attempts.max(1), ..Default::default() }
    }

    fn backoff_config(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_backoff,
            max_interval: self.max_backoff,
            max_elapsed_time: None,
            multiplier: 2.0,
            ..Default::default()
        }
    }

    /// Delivers `template` to `recipient` and classifies the result. Never
    /// fails: every error ends up as a non-`Sent` outcome.
    pub async fn deliver(
        &self,
        transport: &dyn DeliveryTransport,
        template: &BroadcastTemplate,
        recipient: ChatId,
    ) -> DeliveryOutcome {
        let mut attempts = 0;
        let operation = || {
            attempts += 1;
            let attempt = attempts;
            async move {
                match attempt_once(transport, template, recipient).await {
                    Ok(()) => Ok(()),
                    Err(err) if err.is_transient() && attempt < self.max_attempts => {
                        warn!(recipient = recipient.0, attempt, "Transient delivery error: {err}");
                        Err(BackoffError::transient(err))
                    }
                    Err(err) => Err(BackoffError::permanent(err)),
                }
            }
        };

        match retry(self.backoff_config(), operation).await {
            Ok(()) => DeliveryOutcome::Sent,
            Err(err) => {
                debug!(recipient = recipient.0, "Delivery gave up: {err}");
                err.outcome()
            }
        }
    }
}

async fn attempt_once(
    transport: &dyn DeliveryTransport,
    template: &BroadcastTemplate,
    recipient: ChatId,
) -> Result<(), DeliveryError> {
    match transport.deliver(template, recipient).await {
        Err(DeliveryError::RateLimited(wait)) => {
            warn!(recipient = recipient.0, "Rate limited, waiting {wait:?}");
            tokio::time::sleep(wait).await;
            transport.deliver(template, recipient).await
        }
        result => result,
    }
}
