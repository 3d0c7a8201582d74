use std::time::Instant;

use tracing::{debug, info};

use crate::{
    bot_handler::{BotHandlerResult, commands::Context},
    broadcast::{BroadcastError, BroadcastTemplate},
};

pub(crate) const COOLDOWN_MSG: &str = "🛑 Please wait before starting another broadcast.";

/// Starts a broadcast of the replied-to message. The run continues on its own
/// task so the bot keeps serving updates, including the cancel button.
///
/// Every attempt claims the admin's cooldown. The claim is dropped when the
/// run ends or when no run could start because of the user store.
pub async fn handle(ctx: Context<'_>) -> BotHandlerResult<()> {
    let chat_id = ctx.message.chat.id;
    let actor = ctx.actor();
    let cooldown = ctx.handler.broadcast_cooldown.clone();

    if !cooldown.try_acquire(actor, Instant::now()) {
        debug!("Broadcast by {actor} rejected by cooldown");
        ctx.handler.messaging_service.send_text_message(chat_id, COOLDOWN_MSG).await?;
        return Ok(());
    }

    let template = ctx
        .message
        .reply_to_message()
        .map(|reply| BroadcastTemplate { from_chat_id: reply.chat.id, message_id: reply.id });

    match ctx.handler.broadcast_engine.start(chat_id, actor, template).await {
        Ok(run) => {
            info!(recipients = run.recipients().len(), "Spawning broadcast run");
            tokio::spawn(async move {
                run.execute().await;
                cooldown.release(actor);
            });
        }
        Err(e) => {
            if matches!(e, BroadcastError::StoreUnavailable(_) | BroadcastError::NoRecipients) {
                cooldown.release(actor);
            }
            ctx.handler.messaging_service.send_text_message(chat_id, &e.to_string()).await?;
        }
    }

    Ok(())
}
