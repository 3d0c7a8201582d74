use crate::{
    bot_handler::{
        BotHandlerResult,
        commands::{Context, MARKUP_HELP, split_key_and_response},
    },
    buttons::parse_buttons,
};

/// Saves `<trigger> <response>` and previews the response.
pub async fn save(ctx: Context<'_>, args: &str) -> BotHandlerResult<()> {
    let chat_id = ctx.message.chat.id;
    let Some((keyword, response)) = split_key_and_response(args) else {
        let usage = format!("Usage: /keyword <trigger> <response>\n\n{MARKUP_HELP}");
        ctx.handler.messaging_service.send_text_message(chat_id, &usage).await?;
        return Ok(());
    };

    let keyword = keyword.to_lowercase();
    ctx.handler.reply_storage.save_keyword(&keyword, response).await?;

    let markup = parse_buttons(response);
    ctx.handler.messaging_service.send_keyword_saved_msg(chat_id, &keyword, &markup).await?;
    Ok(())
}

pub async fn list(ctx: Context<'_>) -> BotHandlerResult<()> {
    let keywords = ctx.handler.reply_storage.get_keywords().await?;
    ctx.handler.messaging_service.send_keyword_list_msg(ctx.message.chat.id, &keywords).await?;
    Ok(())
}

pub async fn delete(ctx: Context<'_>, keyword: &str) -> BotHandlerResult<()> {
    let chat_id = ctx.message.chat.id;
    let keyword = keyword.trim().to_lowercase();
    if keyword.is_empty() {
        ctx.handler
            .messaging_service
            .send_text_message(chat_id, "Usage: /delkeyword <trigger>")
            .await?;
        return Ok(());
    }

    let text = if ctx.handler.reply_storage.delete_keyword(&keyword).await? {
        format!("✅ Keyword '{keyword}' deleted.")
    } else {
        format!("❌ Keyword '{keyword}' not found.")
    };
    ctx.handler.messaging_service.send_text_message(chat_id, &text).await?;
    Ok(())
}

pub async fn clear(ctx: Context<'_>) -> BotHandlerResult<()> {
    let removed = ctx.handler.reply_storage.clear_keywords().await?;
    let text = format!("🗑️ Cleared {removed} keyword(s).");
    ctx.handler.messaging_service.send_text_message(ctx.message.chat.id, &text).await?;
    Ok(())
}
