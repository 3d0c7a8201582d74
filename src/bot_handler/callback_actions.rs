use std::fmt;

const CANCEL_BROADCAST: &str = "cancel_bcast";
const CLOSE: &str = "close";
const WIKI_SUGGESTION_PREFIX: &str = "wiki_suggest:";

/// What an inline button asks the bot to do, decoded from its callback data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction<'a> {
    /// Stop the running broadcast after the current batch.
    CancelBroadcast,
    /// Delete the message carrying the button. Matches `close` and `close_*`.
    Close,
    /// Show the text as an alert. Produced by both `popup:` and `alert:`.
    Popup(&'a str),
    /// Show the summary of the chosen search result.
    WikiSuggestion(&'a str),
    /// Anything else is looked up among the stored callback responses.
    Stored(&'a str),
}

impl<'a> CallbackAction<'a> {
    /// Decodes callback data. Never fails, unknown data is `Stored`.
    pub fn parse(data: &'a str) -> Self {
        if data == CANCEL_BROADCAST {
            return CallbackAction::CancelBroadcast;
        }
        if data == CLOSE || data.starts_with("close_") {
            return CallbackAction::Close;
        }
        if let Some(text) = data.strip_prefix("popup:").or_else(|| data.strip_prefix("alert:")) {
            return CallbackAction::Popup(text);
        }
        if let Some(title) = data.strip_prefix(WIKI_SUGGESTION_PREFIX) {
            return CallbackAction::WikiSuggestion(title);
        }
        CallbackAction::Stored(data)
    }
}

impl fmt::Display for CallbackAction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallbackAction::CancelBroadcast => f.write_str(CANCEL_BROADCAST),
            CallbackAction::Close => f.write_str(CLOSE),
            CallbackAction::Popup(text) => write!(f, "popup:{text}"),
            CallbackAction::WikiSuggestion(title) => write!(f, "{WIKI_SUGGESTION_PREFIX}{title}"),
            CallbackAction::Stored(data) => f.write_str(data),
        }
    }
}
