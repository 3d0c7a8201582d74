use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use url::Url;

/// Text shown above a keyboard when the markup contains buttons only.
pub const FALLBACK_TEXT: &str = "Select an option below:";

const CELL_SEPARATOR: &str = "&&";

lazy_static! {
    static ref URL_RULE: Regex =
        Regex::new(r"^(.*?)\s*-\s*(https?://\S+?)$").expect("valid url button regex");
    static ref CALLBACK_RULE: Regex =
        Regex::new(r"^(.*?)\s*-\s*callback:(\S+)$").expect("valid callback button regex");
    static ref POPUP_RULE: Regex =
        Regex::new(r"^(.*?)\s*-\s*(popup|alert):(.+)$").expect("valid popup button regex");
}

/// What happens when a button is pressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ButtonAction {
    /// Opens a link. `text` is the link exactly as the admin wrote it.
    Url {
        /// Parsed link handed to Telegram.
        url: Url,
        /// Original link text, rendered back unchanged.
        text: String,
    },
    /// Sends the token back as callback data.
    Callback(String),
    /// Sends `popup:<text>` or `alert:<text>` back as callback data.
    Popup(String),
}

/// A single button cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonSpec {
    /// Text shown on the button.
    pub label: String,
    /// What the button does when pressed.
    pub action: ButtonAction,
}

impl ButtonSpec {
    fn to_inline_button(&self) -> InlineKeyboardButton {
        match &self.action {
            ButtonAction::Url { url, .. } => {
                InlineKeyboardButton::url(self.label.clone(), url.clone())
            }
            ButtonAction::Callback(token) | ButtonAction::Popup(token) => {
                InlineKeyboardButton::callback(self.label.clone(), token.clone())
            }
        }
    }
}

impl fmt::Display for ButtonSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.action {
            ButtonAction::Url { text, .. } => write!(f, "{} - {}", self.label, text),
            ButtonAction::Callback(token) => write!(f, "{} - callback:{}", self.label, token),
            ButtonAction::Popup(token) => write!(f, "{} - {}", self.label, token),
        }
    }
}

/// Result of parsing a block of text with button lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMarkup {
    /// Display text with button lines removed.
    pub text: String,
    /// Button rows, `None` when the text contained no buttons.
    pub buttons: Option<Vec<Vec<ButtonSpec>>>,
}

impl ParsedMarkup {
    /// Builds the inline keyboard, if there is anything to show.
    pub fn keyboard(&self) -> Option<InlineKeyboardMarkup> {
        self.buttons.as_ref().map(|rows| {
            InlineKeyboardMarkup::new(rows.iter().map(|row| {
                row.iter().map(ButtonSpec::to_inline_button).collect::<Vec<_>>()
            }))
        })
    }

    /// Renders every button row back in markup syntax, one row per line.
    pub fn button_rows(&self) -> Vec<String> {
        self.buttons
            .iter()
            .flatten()
            .map(|row| row.iter().map(ToString::to_string).collect::<Vec<_>>().join(" && "))
            .collect()
    }
}

/// Parses text where some lines describe inline buttons.
///
/// A button line holds one or more cells separated by `&&`, each cell in one
/// of the forms `Label - https://link`, `Label - callback:token`,
/// `Label - popup:text` or `Label - alert:text`. Cells on the same line form
/// one keyboard row. A single-cell line that is not a button stays in the
/// display text as is. A line with several cells becomes a row only if every
/// cell is a button, otherwise the line is dropped.
pub fn parse_buttons(input: &str) -> ParsedMarkup {
    let mut rows = Vec::new();
    let mut text_lines = Vec::new();

    for line in input.trim().split('\n') {
        let cells: Vec<&str> = line.trim().split(CELL_SEPARATOR).collect();
        let parsed: Vec<Option<ButtonSpec>> =
            cells.iter().map(|cell| parse_cell(cell.trim())).collect();

        if parsed.iter().all(Option::is_some) {
            rows.push(parsed.into_iter().flatten().collect::<Vec<_>>());
        } else if cells.len() == 1 {
            text_lines.push(line);
        } else {
            tracing::debug!("Dropping malformed button line: {line}");
        }
    }

    let buttons = if rows.is_empty() { None } else { Some(rows) };
    let mut text = text_lines.join("\n").trim().to_string();
    if text.is_empty() && buttons.is_some() {
        text = FALLBACK_TEXT.to_string();
    }

    ParsedMarkup { text, buttons }
}

fn parse_cell(cell: &str) -> Option<ButtonSpec> {
    if let Some(caps) = URL_RULE.captures(cell) {
        let text = caps[2].trim();
        if let Ok(url) = Url::parse(text) {
            let label = caps[1].trim().to_string();
            let action = ButtonAction::Url { url, text: text.to_string() };
            return Some(ButtonSpec { label, action });
        }
    }

    if let Some(caps) = CALLBACK_RULE.captures(cell) {
        return Some(ButtonSpec {
            label: caps[1].trim().to_string(),
            action: ButtonAction::Callback(caps[2].trim().to_string()),
        });
    }

    POPUP_RULE.captures(cell).map(|caps| ButtonSpec {
        label: caps[1].trim().to_string(),
        action: ButtonAction::Popup(format!("{}:{}", &caps[2], caps[3].trim())),
    })
}
