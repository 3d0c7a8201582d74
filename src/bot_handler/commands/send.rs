use teloxide::types::ChatId;
use tracing::{error, info};

use crate::{
    bot_handler::{BotHandlerResult, commands::Context},
    broadcast::{BroadcastTemplate, DeliveryOutcome},
};

pub(crate) const USAGE_MSG: &str =
    "📨 Reply to a message and provide the target user ID, e.g. /send 123456789";
pub(crate) const MISSING_ID_MSG: &str = "❌ Missing user ID. Usage: /send <user_id>";
pub(crate) const INVALID_ID_MSG: &str = "❌ Invalid user ID format. Use a number.";
pub(crate) const UNKNOWN_USER_MSG: &str = "🚫 This user has not started the bot yet!";
pub(crate) const LOOKUP_FAILED_MSG: &str = "❌ Error checking user presence.";

/// Copies the replied-to message to a single registered user.
pub async fn handle(ctx: Context<'_>, args: &str) -> BotHandlerResult<()> {
    let chat_id = ctx.message.chat.id;
    let messaging = &ctx.handler.messaging_service;

    let Some(reply) = ctx.message.reply_to_message() else {
        messaging.send_text_message(chat_id, USAGE_MSG).await?;
        return Ok(());
    };

    let Some(raw_id) = args.split_whitespace().next() else {
        messaging.send_text_message(chat_id, MISSING_ID_MSG).await?;
        return Ok(());
    };

    let Ok(target) = raw_id.parse::<i64>().map(ChatId) else {
        messaging.send_text_message(chat_id, INVALID_ID_MSG).await?;
        return Ok(());
    };

    match ctx.handler.user_storage.has_user(target).await {
        Ok(true) => {}
        Ok(false) => {
            messaging.send_text_message(chat_id, UNKNOWN_USER_MSG).await?;
            return Ok(());
        }
        Err(e) => {
            error!("Failed to look up user {target}: {e}");
            messaging.send_text_message(chat_id, LOOKUP_FAILED_MSG).await?;
            return Ok(());
        }
    }

    let template = BroadcastTemplate { from_chat_id: reply.chat.id, message_id: reply.id };
    let outcome = ctx.handler.broadcast_engine.deliver_one(&template, target).await;
    info!(recipient = target.0, ?outcome, "Direct message delivery finished");

    let text = match outcome {
        DeliveryOutcome::Sent => format!("✅ Message delivered to user {}.", target.0),
        outcome => format!(
            "❌ Failed to deliver the message to user {}: {}.",
            target.0,
            outcome.describe()
        ),
    };
    messaging.send_text_message(chat_id, &text).await?;
    ctx.handler.record_usage(ctx.actor(), "send").await;

    Ok(())
}
