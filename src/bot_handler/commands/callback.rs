use crate::bot_handler::{
    BotHandlerResult,
    commands::{Context, MARKUP_HELP, split_key_and_response},
};

/// Saves `<data> <response>` shown when a button with callback data `data`
/// is pressed.
pub async fn save(ctx: Context<'_>, args: &str) -> BotHandlerResult<()> {
    let chat_id = ctx.message.chat.id;
    let Some((data, response)) = split_key_and_response(args) else {
        let usage = format!("Usage: /save <data> <response>\n\n{MARKUP_HELP}");
        ctx.handler.messaging_service.send_text_message(chat_id, &usage).await?;
        return Ok(());
    };

    let data = data.to_lowercase();
    ctx.handler.reply_storage.save_callback(&data, response).await?;

    let text = format!("✅ Response for callback '{data}' saved.");
    ctx.handler.messaging_service.send_text_message(chat_id, &text).await?;
    Ok(())
}

pub async fn list(ctx: Context<'_>) -> BotHandlerResult<()> {
    let callbacks = ctx.handler.reply_storage.get_callbacks().await?;
    ctx.handler.messaging_service.send_callback_list_msg(ctx.message.chat.id, &callbacks).await?;
    Ok(())
}

pub async fn delete(ctx: Context<'_>, data: &str) -> BotHandlerResult<()> {
    let chat_id = ctx.message.chat.id;
    let data = data.trim().to_lowercase();
    if data.is_empty() {
        let usage = "Usage: /delcallback <data>";
        ctx.handler.messaging_service.send_text_message(chat_id, usage).await?;
        return Ok(());
    }

    let text = if ctx.handler.reply_storage.delete_callback(&data).await? {
        format!("✅ Callback '{data}' deleted.")
    } else {
        format!("❌ Callback '{data}' not found.")
    };
    ctx.handler.messaging_service.send_text_message(chat_id, &text).await?;
    Ok(())
}

pub async fn clear(ctx: Context<'_>) -> BotHandlerResult<()> {
    let removed = ctx.handler.reply_storage.clear_callbacks().await?;
    let text = format!("🗑️ Cleared {removed} callback(s).");
    ctx.handler.messaging_service.send_text_message(ctx.message.chat.id, &text).await?;
    Ok(())
}
