mod keyboards;

use async_trait::async_trait;
use mockall::automock;
use teloxide::{
    prelude::*,
    types::{ChatId, InlineKeyboardMarkup, MessageId, ParseMode, User},
    utils::{command::BotCommands, html},
};
use thiserror::Error;

pub use self::keyboards::{
    build_cancel_broadcast_keyboard, build_close_keyboard, build_wiki_suggestions_keyboard,
    build_wiki_summary_keyboard,
};
use crate::{
    bot_handler::{BotHandlerError, Command},
    broadcast::BroadcastTally,
    buttons::ParsedMarkup,
    storage::{CallbackReply, KeywordReply},
    wiki::WikiSummary,
};

/// Errors raised while talking to Telegram.
#[derive(Debug, Error)]
pub enum MessagingError {
    /// The Bot API request failed.
    #[error("Teloxide API request failed: {0}")]
    TeloxideRequest(#[from] teloxide::RequestError),
}

type Result<T> = std::result::Result<T, MessagingError>;

/// Trait for sending messages to the user.
#[automock]
#[async_trait]
pub trait MessagingService: Send + Sync {
    /// Sends a plain text message without any formatting.
    async fn send_text_message(&self, chat_id: ChatId, text: &str) -> Result<()>;

    /// Sends an HTML message, optionally with an inline keyboard.
    async fn send_response_with_keyboard(
        &self,
        chat_id: ChatId,
        text: String,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> Result<()>;

    /// Sends user-authored markup. The text is sent as is, without a parse
    /// mode.
    async fn send_markup_msg(&self, chat_id: ChatId, markup: &ParsedMarkup) -> Result<()>;

    /// Replaces an existing message with user-authored markup.
    async fn edit_markup_msg(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        markup: &ParsedMarkup,
    ) -> Result<()>;

    /// Sends an error message to the provided chat.
    async fn send_error_msg(&self, chat_id: ChatId, error: BotHandlerError) -> Result<()>;

    /// Sends a help message to the user.
    async fn send_help_msg(&self, chat_id: ChatId) -> Result<()>;

    /// Sends a start message to the user.
    async fn send_start_msg(&self, chat_id: ChatId, first_name: &str) -> Result<()>;

    /// Tells a non-admin that the command is restricted.
    async fn send_admin_only_msg(&self, chat_id: ChatId) -> Result<()>;

    /// Acknowledges a private message no keyword matched.
    async fn send_received_msg(&self, chat_id: ChatId) -> Result<()>;

    /// Answers a callback query. With `show_alert` the text is shown as a modal
    /// alert instead of a toast.
    async fn answer_callback_query(&self, query_id: &str, text: &str, show_alert: bool)
    -> Result<()>;

    /// Deletes a message sent by the bot.
    async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> Result<()>;

    /// Forwards a message, keeping the "forwarded from" header.
    async fn forward_message(
        &self,
        to_chat_id: ChatId,
        from_chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<()>;

    /// Sends the live broadcast progress message and returns its id so it can
    /// be edited later.
    async fn send_broadcast_progress_msg(
        &self,
        chat_id: ChatId,
        tally: &BroadcastTally,
    ) -> Result<MessageId>;

    /// Updates the progress message with the current counters.
    async fn edit_broadcast_progress_msg(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        tally: &BroadcastTally,
    ) -> Result<()>;

    /// Sends the final counters of a broadcast.
    async fn send_broadcast_summary_msg(&self, chat_id: ChatId, tally: &BroadcastTally)
    -> Result<()>;

    /// Reports the number of registered users.
    async fn send_users_count_msg(&self, chat_id: ChatId, count: u64) -> Result<()>;

    /// Shows `user` their name, username and id.
    async fn send_user_id_msg(&self, chat_id: ChatId, user: &User) -> Result<()>;

    /// Confirms a saved keyword and previews its response.
    async fn send_keyword_saved_msg(
        &self,
        chat_id: ChatId,
        keyword: &str,
        markup: &ParsedMarkup,
    ) -> Result<()>;

    /// Lists keywords with their responses and buttons.
    async fn send_keyword_list_msg(&self, chat_id: ChatId, keywords: &[KeywordReply])
    -> Result<()>;

    /// Lists stored callback responses.
    async fn send_callback_list_msg(
        &self,
        chat_id: ChatId,
        callbacks: &[CallbackReply],
    ) -> Result<()>;

    /// Sends a page summary with a link to the article.
    async fn send_wiki_summary_msg(&self, chat_id: ChatId, summary: &WikiSummary) -> Result<()>;

    /// Replaces a suggestion list with the summary of the chosen page.
    async fn edit_wiki_summary_msg(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        summary: &WikiSummary,
    ) -> Result<()>;

    /// Offers search results when there is no page with the exact title.
    async fn send_wiki_suggestions_msg(
        &self,
        chat_id: ChatId,
        query: &str,
        titles: &[String],
    ) -> Result<()>;
}

/// Telegram messaging service.
pub struct TelegramMessagingService {
    bot: Bot,
}

impl TelegramMessagingService {
    /// Creates a service sending through `bot`.
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    fn format_user_id(user: &User) -> String {
        let username = user
            .username
            .as_deref()
            .map_or_else(|| "N/A".to_string(), |name| html::escape(&format!("@{name}")));

        format!(
            "🆔 {}\n\n👤 Name: {}\n📛 Username: {}\n🔢 ID: {}",
            html::bold("Your Telegram details"),
            html::escape(&user.full_name()),
            username,
            html::code_inline(&user.id.to_string())
        )
    }

    fn format_keyword_list(keywords: &[KeywordReply]) -> String {
        if keywords.is_empty() {
            return "📭 No keywords saved.".to_string();
        }

        let entries = keywords
            .iter()
            .map(|reply| {
                let markup = crate::buttons::parse_buttons(&reply.response);
                let mut entry = format!(
                    "🔑 {}\n{}",
                    html::bold(&html::escape(&reply.keyword)),
                    html::escape(&markup.text)
                );
                for row in markup.button_rows() {
                    entry.push_str(&format!("\n🔘 {}", html::code_inline(&row)));
                }
                entry
            })
            .collect::<Vec<_>>();

        format!("📋 Saved keywords ({}):\n\n{}", keywords.len(), entries.join("\n\n"))
    }

    fn format_callback_list(callbacks: &[CallbackReply]) -> String {
        if callbacks.is_empty() {
            return "📭 No callbacks saved.".to_string();
        }

        let entries = callbacks
            .iter()
            .map(|reply| {
                format!("🔹 {}\n{}", html::code_inline(&reply.data), html::escape(&reply.response))
            })
            .collect::<Vec<_>>();

        format!("📋 Saved callbacks ({}):\n\n{}", callbacks.len(), entries.join("\n\n"))
    }

    fn format_wiki_summary(summary: &WikiSummary) -> String {
        format!(
            "📚 {}\n\n{}",
            html::bold(&html::escape(&summary.title)),
            html::escape(&summary.extract)
        )
    }
}

#[async_trait]
impl MessagingService for TelegramMessagingService {
    async fn send_text_message(&self, chat_id: ChatId, text: &str) -> Result<()> {
        self.bot
            .send_message(chat_id, text)
            .await
            .map(|_| ())
            .map_err(MessagingError::TeloxideRequest)
    }

    async fn send_response_with_keyboard(
        &self,
        chat_id: ChatId,
        text: String,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> Result<()> {
        let request = self.bot.send_message(chat_id, text).parse_mode(ParseMode::Html);
        let request = match keyboard {
            Some(keyboard) => request.reply_markup(keyboard),
            None => request,
        };

        request.await.map(|_| ()).map_err(MessagingError::TeloxideRequest)
    }

    async fn send_markup_msg(&self, chat_id: ChatId, markup: &ParsedMarkup) -> Result<()> {
        let request = self.bot.send_message(chat_id, markup.text.clone());
        let request = match markup.keyboard() {
            Some(keyboard) => request.reply_markup(keyboard),
            None => request,
        };

        request.await.map(|_| ()).map_err(MessagingError::TeloxideRequest)
    }

    async fn edit_markup_msg(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        markup: &ParsedMarkup,
    ) -> Result<()> {
        let request = self.bot.edit_message_text(chat_id, message_id, markup.text.clone());
        let request = match markup.keyboard() {
            Some(keyboard) => request.reply_markup(keyboard),
            None => request,
        };

        request.await.map(|_| ()).map_err(MessagingError::TeloxideRequest)
    }

    async fn send_error_msg(&self, chat_id: ChatId, error: BotHandlerError) -> Result<()> {
        self.send_response_with_keyboard(chat_id, html::escape(&error.to_string()), None).await
    }

    async fn send_help_msg(&self, chat_id: ChatId) -> Result<()> {
        let help_text = Command::descriptions().to_string();
        self.send_text_message(chat_id, &help_text).await
    }

    async fn send_start_msg(&self, chat_id: ChatId, first_name: &str) -> Result<()> {
        let start_text = format!(
            "👋 Hello {}!\n\nSend me a message and an admin will get back to you. Use /help to \
             see what else I can do.",
            html::bold(&html::escape(first_name))
        );
        self.send_response_with_keyboard(chat_id, start_text, None).await
    }

    async fn send_admin_only_msg(&self, chat_id: ChatId) -> Result<()> {
        self.send_text_message(chat_id, "⛔ This command is for admins only.").await
    }

    async fn send_received_msg(&self, chat_id: ChatId) -> Result<()> {
        let text = "✅ Your message has been received. An admin will reply soon.";
        self.send_text_message(chat_id, text).await
    }

    async fn answer_callback_query(
        &self,
        query_id: &str,
        text: &str,
        show_alert: bool,
    ) -> Result<()> {
        self.bot
            .answer_callback_query(query_id)
            .text(text)
            .show_alert(show_alert)
            .await
            .map(|_| ())
            .map_err(MessagingError::TeloxideRequest)
    }

    async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> Result<()> {
        self.bot
            .delete_message(chat_id, message_id)
            .await
            .map(|_| ())
            .map_err(MessagingError::TeloxideRequest)
    }

    async fn forward_message(
        &self,
        to_chat_id: ChatId,
        from_chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<()> {
        self.bot
            .forward_message(to_chat_id, from_chat_id, message_id)
            .await
            .map(|_| ())
            .map_err(MessagingError::TeloxideRequest)
    }

    async fn send_broadcast_progress_msg(
        &self,
        chat_id: ChatId,
        tally: &BroadcastTally,
    ) -> Result<MessageId> {
        self.bot
            .send_message(chat_id, tally.render_progress())
            .parse_mode(ParseMode::Html)
            .reply_markup(build_cancel_broadcast_keyboard())
            .await
            .map(|msg| msg.id)
            .map_err(MessagingError::TeloxideRequest)
    }

    async fn edit_broadcast_progress_msg(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        tally: &BroadcastTally,
    ) -> Result<()> {
        self.bot
            .edit_message_text(chat_id, message_id, tally.render_progress())
            .parse_mode(ParseMode::Html)
            .reply_markup(build_cancel_broadcast_keyboard())
            .await
            .map(|_| ())
            .map_err(MessagingError::TeloxideRequest)
    }

    async fn send_broadcast_summary_msg(
        &self,
        chat_id: ChatId,
        tally: &BroadcastTally,
    ) -> Result<()> {
        self.send_response_with_keyboard(
            chat_id,
            tally.render_summary(),
            Some(build_close_keyboard()),
        )
        .await
    }

    async fn send_users_count_msg(&self, chat_id: ChatId, count: u64) -> Result<()> {
        let text = format!("👥 Total users: {}", html::code_inline(&count.to_string()));
        self.send_response_with_keyboard(chat_id, text, Some(build_close_keyboard())).await
    }

    async fn send_user_id_msg(&self, chat_id: ChatId, user: &User) -> Result<()> {
        let text = Self::format_user_id(user);
        self.send_response_with_keyboard(chat_id, text, Some(build_close_keyboard())).await
    }

    async fn send_keyword_saved_msg(
        &self,
        chat_id: ChatId,
        keyword: &str,
        markup: &ParsedMarkup,
    ) -> Result<()> {
        let confirmation =
            format!("✅ Keyword {} saved. Preview:", html::bold(&html::escape(keyword)));
        self.send_response_with_keyboard(chat_id, confirmation, None).await?;
        self.send_markup_msg(chat_id, markup).await
    }

    async fn send_keyword_list_msg(
        &self,
        chat_id: ChatId,
        keywords: &[KeywordReply],
    ) -> Result<()> {
        let text = Self::format_keyword_list(keywords);
        self.send_response_with_keyboard(chat_id, text, Some(build_close_keyboard())).await
    }

    async fn send_callback_list_msg(
        &self,
        chat_id: ChatId,
        callbacks: &[CallbackReply],
    ) -> Result<()> {
        let text = Self::format_callback_list(callbacks);
        self.send_response_with_keyboard(chat_id, text, Some(build_close_keyboard())).await
    }

    async fn send_wiki_summary_msg(&self, chat_id: ChatId, summary: &WikiSummary) -> Result<()> {
        self.send_response_with_keyboard(
            chat_id,
            Self::format_wiki_summary(summary),
            Some(build_wiki_summary_keyboard(summary.url.as_ref())),
        )
        .await
    }

    async fn edit_wiki_summary_msg(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        summary: &WikiSummary,
    ) -> Result<()> {
        self.bot
            .edit_message_text(chat_id, message_id, Self::format_wiki_summary(summary))
            .parse_mode(ParseMode::Html)
            .reply_markup(build_wiki_summary_keyboard(summary.url.as_ref()))
            .await
            .map(|_| ())
            .map_err(MessagingError::TeloxideRequest)
    }

    async fn send_wiki_suggestions_msg(
        &self,
        chat_id: ChatId,
        query: &str,
        titles: &[String],
    ) -> Result<()> {
        if titles.is_empty() {
            let text =
                format!("❌ Nothing found on Wikipedia for {}.", html::bold(&html::escape(query)));
            return self.send_response_with_keyboard(chat_id, text, None).await;
        }

        let text =
            format!("🔍 No exact match for {}. Did you mean:", html::bold(&html::escape(query)));
        self.send_response_with_keyboard(
            chat_id,
            text,
            Some(build_wiki_suggestions_keyboard(titles)),
        )
        .await
    }
}
