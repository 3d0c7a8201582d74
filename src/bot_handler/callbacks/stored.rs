use crate::{
    bot_handler::{BotHandlerError, BotHandlerResult, commands::Context},
    buttons::parse_buttons,
};

/// Replaces the message with the response stored for `data`.
pub async fn handle(ctx: Context<'_>, data: &str) -> BotHandlerResult<()> {
    let query = ctx
        .query
        .ok_or_else(|| BotHandlerError::InvalidInput("Callback query is missing".to_string()))?;
    let messaging = &ctx.handler.messaging_service;

    match ctx.handler.reply_storage.get_callback(data).await? {
        Some(response) => {
            let markup = parse_buttons(&response);
            messaging.edit_markup_msg(ctx.message.chat.id, ctx.message.id, &markup).await?;
            messaging.answer_callback_query(&query.id, "Message updated!", false).await?;
        }
        None => {
            messaging
                .answer_callback_query(&query.id, "No response found for this button.", true)
                .await?;
        }
    }

    Ok(())
}
