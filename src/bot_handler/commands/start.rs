use tracing::info;

use crate::bot_handler::{BotHandlerResult, commands::Context};

pub async fn handle(ctx: Context<'_>) -> BotHandlerResult<()> {
    let actor = ctx.actor();
    let first_name = ctx.message.from.as_ref().map_or("there", |user| user.first_name.as_str());

    if ctx.handler.user_storage.add_user(actor).await? {
        info!("New user registered: {actor}");
    }

    ctx.handler.messaging_service.send_start_msg(ctx.message.chat.id, first_name).await?;
    ctx.handler.record_usage(actor, "start").await;

    Ok(())
}
