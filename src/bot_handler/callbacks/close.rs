use crate::bot_handler::{BotHandlerError, BotHandlerResult, commands::Context};

/// Deletes the message carrying the close button.
pub async fn handle(ctx: Context<'_>) -> BotHandlerResult<()> {
    let query = ctx
        .query
        .ok_or_else(|| BotHandlerError::InvalidInput("Callback query is missing".to_string()))?;

    ctx.handler.messaging_service.delete_message(ctx.message.chat.id, ctx.message.id).await?;
    ctx.handler.messaging_service.answer_callback_query(&query.id, "", false).await?;
    Ok(())
}
