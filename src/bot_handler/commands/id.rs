use crate::bot_handler::{BotHandlerResult, commands::Context};

/// Shows the sender their Telegram name, username and id.
pub async fn handle(ctx: Context<'_>) -> BotHandlerResult<()> {
    let Some(user) = ctx.message.from.as_ref() else {
        return Ok(());
    };

    ctx.handler.messaging_service.send_user_id_msg(ctx.message.chat.id, user).await?;
    ctx.handler.record_usage(ctx.actor(), "id").await;

    Ok(())
}
