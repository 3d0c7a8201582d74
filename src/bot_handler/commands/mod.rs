pub mod broadcast;
pub mod callback;
pub mod help;
pub mod id;
pub mod keyword;
pub mod send;
pub mod start;
pub mod users;
pub mod wiki;

use teloxide::{prelude::*, types::Message};

use crate::bot_handler::BotHandler;

/// Context groups the data needed by all command and callback handlers.
pub struct Context<'a> {
    /// Handler owning the services.
    pub handler: &'a BotHandler,
    /// The command message, or the message carrying the pressed keyboard.
    pub message: &'a Message,
    /// Set when handling a callback query.
    pub query: Option<&'a CallbackQuery>,
}

impl Context<'_> {
    /// The chat of the user who triggered the update. Falls back to the chat
    /// the message was sent in.
    pub fn actor(&self) -> ChatId {
        match self.query {
            Some(query) => ChatId::from(query.from.id),
            None => self.message.from.as_ref().map_or(self.message.chat.id, |u| ChatId::from(u.id)),
        }
    }
}

/// Explains the button syntax accepted in stored responses.
pub(crate) const MARKUP_HELP: &str = "The response may contain buttons, one row per line:\n\
Label - https://example.com\n\
Label - callback:data\n\
Label - popup:text\n\
Label - alert:text\n\
Put several buttons in one row by separating them with &&.";

/// Splits `<key> <rest>` arguments. Both parts must be non-empty.
pub(crate) fn split_key_and_response(args: &str) -> Option<(&str, &str)> {
    let (key, response) = args.trim().split_once(char::is_whitespace)?;
    let response = response.trim();
    (!key.is_empty() && !response.is_empty()).then_some((key, response))
}
