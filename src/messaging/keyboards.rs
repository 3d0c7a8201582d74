use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use url::Url;

use crate::bot_handler::CallbackAction;

/// Telegram rejects callback data longer than this many bytes.
const MAX_CALLBACK_DATA_LEN: usize = 64;

/// Button that stops the running broadcast.
pub fn build_cancel_broadcast_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        "Cancel Broadcast",
        CallbackAction::CancelBroadcast.to_string(),
    )]])
}

/// Single button deleting the message it is attached to.
pub fn build_close_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![close_button()]])
}

/// Link to the article, if any, next to a close button.
pub fn build_wiki_summary_keyboard(url: Option<&Url>) -> InlineKeyboardMarkup {
    let mut row = Vec::new();
    if let Some(url) = url {
        row.push(InlineKeyboardButton::url("📖 Read More", url.clone()));
    }
    row.push(close_button());

    InlineKeyboardMarkup::new(vec![row])
}

/// One button per title. Titles that do not fit into callback data are
/// skipped.
pub fn build_wiki_suggestions_keyboard(titles: &[String]) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = titles
        .iter()
        .filter_map(|title| {
            let data = CallbackAction::WikiSuggestion(title).to_string();
            (data.len() <= MAX_CALLBACK_DATA_LEN)
                .then(|| vec![InlineKeyboardButton::callback(title.clone(), data)])
        })
        .collect();
    rows.push(vec![close_button()]);

    InlineKeyboardMarkup::new(rows)
}

fn close_button() -> InlineKeyboardButton {
    InlineKeyboardButton::callback("❌ Close", CallbackAction::Close.to_string())
}
