mod auto_reply;
mod callback_actions;
mod callbacks;
mod commands;
mod cooldown;
#[cfg(test)]
mod test_helpers;

use std::{collections::HashSet, sync::Arc, time::Duration};

pub use callback_actions::CallbackAction;
pub use commands::Context;
use cooldown::Cooldown;
use teloxide::{
    prelude::*,
    types::{Message, User},
    utils::command::BotCommands,
};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    broadcast::{BroadcastEngine, BroadcastError},
    buttons::parse_buttons,
    messaging::{MessagingError, MessagingService},
    storage::{ReplyStorage, StorageError, UsageLogStorage, UserStorage},
    wiki::{WikiClient, WikiError},
};

const DEFAULT_BROADCAST_COOLDOWN: Duration = Duration::from_secs(10);

/// Commands understood by the bot. The `description` attributes double as
/// variant docs and as the `/help` text.
#[allow(missing_docs)]
#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
    #[command(description = "Start the bot and show welcome message.")]
    Start,
    #[command(description = "Show this help text.")]
    Help,
    #[command(description = "Search Wikipedia, e.g. /wiki Rust.")]
    Wiki(String),
    #[command(description = "Show your Telegram name, username and ID.")]
    Id,
    #[command(description = "(admin) Show the number of users.")]
    Users,
    #[command(description = "(admin) Reply to a message to send a copy to every user.")]
    Broadcast,
    #[command(description = "(admin) Copy the replied-to message to one user: /send <user_id>.")]
    Send(String),
    #[command(description = "(admin) Save an auto-reply: /keyword <trigger> <response>.")]
    Keyword(String),
    #[command(description = "(admin) List saved keywords.")]
    Keywords,
    #[command(description = "(admin) Delete a keyword: /delkeyword <trigger>.")]
    DelKeyword(String),
    #[command(description = "(admin) Delete all keywords.")]
    ClearKeywords,
    #[command(description = "(admin) Save a button response: /save <data> <response>.")]
    Save(String),
    #[command(description = "(admin) List saved button responses.")]
    ListCallbacks,
    #[command(description = "(admin) Delete a button response: /delcallback <data>.")]
    DelCallback(String),
    #[command(description = "(admin) Delete all button responses.")]
    ClearCallbacks,
}

impl Command {
    /// Whether only configured admins may run the command.
    pub fn requires_admin(&self) -> bool {
        !matches!(self, Command::Start | Command::Help | Command::Wiki(_) | Command::Id)
    }
}

/// Errors surfaced by command and callback handlers.
#[derive(Debug, Error)]
pub enum BotHandlerError {
    /// The update lacked something the handler needs.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A reply could not be sent.
    #[error("Failed to send message: {0}")]
    SendMessageError(#[from] MessagingError),

    /// A storage operation failed.
    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    /// The Wikipedia lookup failed.
    #[error("Wikipedia error: {0}")]
    WikiError(#[from] WikiError),

    /// A broadcast could not be started.
    #[error("{0}")]
    BroadcastError(#[from] BroadcastError),
}

/// Result of a handler.
pub type BotHandlerResult<T> = Result<T, BotHandlerError>;

/// Routes commands, callback queries and plain messages to their handlers.
pub struct BotHandler {
    messaging_service: Arc<dyn MessagingService>,
    user_storage: Arc<dyn UserStorage>,
    usage_log: Arc<dyn UsageLogStorage>,
    reply_storage: Arc<dyn ReplyStorage>,
    wiki_client: Arc<dyn WikiClient>,
    broadcast_engine: Arc<BroadcastEngine>,
    admins: HashSet<UserId>,
    log_channel: Option<ChatId>,
    broadcast_cooldown: Arc<Cooldown>,
}

impl BotHandler {
    /// Creates a new `BotHandler` instance.
    pub fn new(
        messaging_service: Arc<dyn MessagingService>,
        user_storage: Arc<dyn UserStorage>,
        usage_log: Arc<dyn UsageLogStorage>,
        reply_storage: Arc<dyn ReplyStorage>,
        wiki_client: Arc<dyn WikiClient>,
        broadcast_engine: Arc<BroadcastEngine>,
        admins: Vec<UserId>,
    ) -> Self {
        Self {
            messaging_service,
            user_storage,
            usage_log,
            reply_storage,
            wiki_client,
            broadcast_engine,
            admins: admins.into_iter().collect(),
            log_channel: None,
            broadcast_cooldown: Arc::new(Cooldown::new(DEFAULT_BROADCAST_COOLDOWN)),
        }
    }

    /// Forwards incoming private messages to `log_channel`.
    pub fn with_log_channel(mut self, log_channel: Option<ChatId>) -> Self {
        self.log_channel = log_channel;
        self
    }

    /// Minimum time between two `/broadcast` attempts of the same admin.
    pub fn with_broadcast_cooldown(mut self, interval: Duration) -> Self {
        self.broadcast_cooldown = Arc::new(Cooldown::new(interval));
        self
    }

    /// Dispatches the incoming command to the appropriate handler.
    pub async fn handle_commands(&self, msg: &Message, cmd: Command) -> BotHandlerResult<()> {
        let ctx = Context { handler: self, message: msg, query: None };

        if cmd.requires_admin() && !self.is_admin(msg.from.as_ref()) {
            debug!("Rejected admin command {cmd:?} in chat {}", msg.chat.id);
            self.messaging_service.send_admin_only_msg(msg.chat.id).await?;
            return Ok(());
        }

        match cmd {
            Command::Start => commands::start::handle(ctx).await,
            Command::Help => commands::help::handle(ctx).await,
            Command::Wiki(query) => commands::wiki::handle(ctx, &query).await,
            Command::Id => commands::id::handle(ctx).await,
            Command::Users => commands::users::handle(ctx).await,
            Command::Broadcast => commands::broadcast::handle(ctx).await,
            Command::Send(args) => commands::send::handle(ctx, &args).await,
            Command::Keyword(args) => commands::keyword::save(ctx, &args).await,
            Command::Keywords => commands::keyword::list(ctx).await,
            Command::DelKeyword(keyword) => commands::keyword::delete(ctx, &keyword).await,
            Command::ClearKeywords => commands::keyword::clear(ctx).await,
            Command::Save(args) => commands::callback::save(ctx, &args).await,
            Command::ListCallbacks => commands::callback::list(ctx).await,
            Command::DelCallback(data) => commands::callback::delete(ctx, &data).await,
            Command::ClearCallbacks => commands::callback::clear(ctx).await,
        }
    }

    /// Handles a press on an inline keyboard button.
    pub async fn handle_callback_query(&self, query: &CallbackQuery) -> BotHandlerResult<()> {
        let data = query
            .data
            .as_deref()
            .ok_or_else(|| BotHandlerError::InvalidInput("Callback data is missing".to_string()))?;
        let Some(message) = query.message.as_ref().and_then(|m| m.regular_message()) else {
            // The message is too old to be edited, just clear the spinner.
            self.messaging_service.answer_callback_query(&query.id, "", false).await?;
            return Ok(());
        };

        let ctx = Context { handler: self, message, query: Some(query) };

        match CallbackAction::parse(data) {
            CallbackAction::CancelBroadcast => callbacks::cancel_broadcast::handle(ctx).await,
            CallbackAction::Close => callbacks::close::handle(ctx).await,
            CallbackAction::Popup(text) => {
                self.messaging_service.answer_callback_query(&query.id, text, true).await?;
                Ok(())
            }
            CallbackAction::WikiSuggestion(title) => {
                callbacks::wiki_suggestion::handle(ctx, title).await
            }
            CallbackAction::Stored(data) => callbacks::stored::handle(ctx, data).await,
        }
    }

    /// Handles a private text message that is not a command: forwards it to
    /// the log channel and answers with a keyword auto-reply or an
    /// acknowledgement.
    pub async fn handle_text_message(&self, msg: &Message) -> BotHandlerResult<()> {
        let Some(text) = msg.text() else {
            return Ok(());
        };
        let chat_id = msg.chat.id;

        if let Some(log_channel) = self.log_channel {
            let forwarded =
                self.messaging_service.forward_message(log_channel, chat_id, msg.id).await;
            if let Err(e) = forwarded {
                warn!("Failed to forward message to log channel: {e}");
            }
        }

        let keywords = self.reply_storage.get_keywords().await?;
        match auto_reply::find_reply(&keywords, text) {
            Some(reply) => {
                debug!("Keyword {} matched in chat {chat_id}", reply.keyword);
                let markup = parse_buttons(&reply.response);
                self.messaging_service.send_markup_msg(chat_id, &markup).await?;
            }
            None => self.messaging_service.send_received_msg(chat_id).await?,
        }

        Ok(())
    }

    fn is_admin(&self, user: Option<&User>) -> bool {
        user.is_some_and(|user| self.admins.contains(&user.id))
    }

    /// Records a usage log entry. Failures are only logged.
    async fn record_usage(&self, user_id: ChatId, action: &str) {
        if let Err(e) = self.usage_log.log_usage(user_id, action).await {
            warn!("Failed to record usage of {action}: {e}");
        }
    }
}
