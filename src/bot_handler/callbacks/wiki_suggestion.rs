use tracing::error;

use crate::bot_handler::{BotHandlerError, BotHandlerResult, commands::Context};

const NOT_FOUND: &str = "⚠️ Failed to fetch Wikipedia page for that suggestion.";

/// Turns the suggestion list into the summary of the chosen page.
pub async fn handle(ctx: Context<'_>, title: &str) -> BotHandlerResult<()> {
    let query = ctx
        .query
        .ok_or_else(|| BotHandlerError::InvalidInput("Callback query is missing".to_string()))?;
    let messaging = &ctx.handler.messaging_service;

    match ctx.handler.wiki_client.summary(title).await {
        Ok(Some(summary)) => {
            messaging.edit_wiki_summary_msg(ctx.message.chat.id, ctx.message.id, &summary).await?;
            messaging.answer_callback_query(&query.id, "", false).await?;
        }
        Ok(None) => {
            messaging.answer_callback_query(&query.id, NOT_FOUND, true).await?;
        }
        Err(e) => {
            error!("Wikipedia lookup for suggestion {title} failed: {e}");
            messaging.answer_callback_query(&query.id, NOT_FOUND, true).await?;
        }
    }

    Ok(())
}
