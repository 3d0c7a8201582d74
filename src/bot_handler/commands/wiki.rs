use tracing::error;

use crate::{
    bot_handler::{BotHandlerError, BotHandlerResult, commands::Context},
    wiki::{WikiClient, WikiError, WikiSummary},
};

const USAGE: &str = "Please provide a search query (e.g., /wiki Times of India)";

enum Lookup {
    Summary(WikiSummary),
    Suggestions(Vec<String>),
}

async fn lookup(wiki: &dyn WikiClient, query: &str) -> Result<Lookup, WikiError> {
    match wiki.summary(query).await? {
        Some(summary) => Ok(Lookup::Summary(summary)),
        None => wiki.search(query).await.map(Lookup::Suggestions),
    }
}

/// Shows the summary of the page titled `query`, or search suggestions when
/// there is no such page.
pub async fn handle(ctx: Context<'_>, query: &str) -> BotHandlerResult<()> {
    let chat_id = ctx.message.chat.id;
    let query = query.trim();
    if query.is_empty() {
        ctx.handler.messaging_service.send_text_message(chat_id, USAGE).await?;
        return Ok(());
    }

    let messaging = &ctx.handler.messaging_service;
    match lookup(ctx.handler.wiki_client.as_ref(), query).await {
        Ok(Lookup::Summary(summary)) => {
            messaging.send_wiki_summary_msg(chat_id, &summary).await?;
            ctx.handler.record_usage(ctx.actor(), "wiki").await;
        }
        Ok(Lookup::Suggestions(titles)) => {
            messaging.send_wiki_suggestions_msg(chat_id, query, &titles).await?;
            ctx.handler.record_usage(ctx.actor(), "wiki").await;
        }
        Err(e) => {
            error!("Wikipedia lookup for {query} failed: {e}");
            messaging.send_error_msg(chat_id, BotHandlerError::WikiError(e)).await?;
            ctx.handler.record_usage(ctx.actor(), "wiki_failed").await;
        }
    }

    Ok(())
}
