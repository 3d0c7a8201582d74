use crate::bot_handler::{BotHandlerError, BotHandlerResult, commands::Context};

pub async fn handle(ctx: Context<'_>) -> BotHandlerResult<()> {
    let query = ctx
        .query
        .ok_or_else(|| BotHandlerError::InvalidInput("Callback query is missing".to_string()))?;
    let messaging = &ctx.handler.messaging_service;

    if !ctx.handler.is_admin(Some(&query.from)) {
        messaging
            .answer_callback_query(&query.id, "⛔ Only admins can cancel a broadcast.", true)
            .await?;
        return Ok(());
    }

    let text = if ctx.handler.broadcast_engine.cancel() {
        "🛑 Broadcast will stop after the current batch."
    } else {
        "No broadcast is running."
    };
    messaging.answer_callback_query(&query.id, text, false).await?;
    Ok(())
}
