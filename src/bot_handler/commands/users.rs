use crate::bot_handler::{BotHandlerResult, commands::Context};

pub async fn handle(ctx: Context<'_>) -> BotHandlerResult<()> {
    let count = ctx.handler.user_storage.count_users().await?;
    ctx.handler.messaging_service.send_users_count_msg(ctx.message.chat.id, count).await?;
    ctx.handler.record_usage(ctx.actor(), "users").await;
    Ok(())
}
