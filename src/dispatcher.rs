use std::sync::Arc;

use teloxide::{
    dispatching::{DefaultKey, UpdateHandler},
    dptree::deps,
    prelude::*,
};

use crate::bot_handler::{BotHandler, BotHandlerError, Command};

/// Encapsulates the dispatcher logic for the bot.
pub struct BotDispatcher {
    handler: Arc<BotHandler>,
}

impl BotDispatcher {
    /// Creates a new `BotDispatcher`.
    pub fn new(handler: Arc<BotHandler>) -> Self {
        Self { handler }
    }

    /// Builds the dispatcher using the provided `bot` instance.
    #[must_use = "This function returns a Dispatcher that should not be ignored"]
    pub fn build(&self, bot: Bot) -> Dispatcher<Bot, BotHandlerError, DefaultKey> {
        Dispatcher::builder(
            bot,
            dptree::entry()
                .branch(self.build_commands_branch())
                .branch(self.build_callback_queries_branch())
                .branch(self.build_private_text_branch()),
        )
        .dependencies(deps![self.handler.clone()])
        .enable_ctrlc_handler()
        .build()
    }

    /// Builds the branch for handling text commands.
    fn build_commands_branch(&self) -> UpdateHandler<BotHandlerError> {
        Update::filter_message().filter_command::<Command>().endpoint(
            |msg: Message, cmd: Command, handler: Arc<BotHandler>| async move {
                handler.handle_commands(&msg, cmd).await
            },
        )
    }

    /// Builds the branch for inline keyboard button presses.
    fn build_callback_queries_branch(&self) -> UpdateHandler<BotHandlerError> {
        Update::filter_callback_query().endpoint(
            |query: CallbackQuery, handler: Arc<BotHandler>| async move {
                handler.handle_callback_query(&query).await
            },
        )
    }

    /// Builds the branch for plain text sent to the bot in a private chat.
    /// Unknown commands end up here too and are answered like any other text.
    fn build_private_text_branch(&self) -> UpdateHandler<BotHandlerError> {
        Update::filter_message()
            .filter(|msg: Message| msg.chat.is_private() && msg.text().is_some())
            .endpoint(|msg: Message, handler: Arc<BotHandler>| async move {
                handler.handle_text_message(&msg).await
            })
    }
}
