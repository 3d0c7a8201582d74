use teloxide::utils::html;

use crate::broadcast::DeliveryOutcome;

/// Counters of a broadcast run.
///
/// `total` always equals the sum of the outcome counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastTally {
    /// Recipients processed so far.
    pub total: usize,
    /// Copies delivered.
    pub sent: usize,
    /// Recipients who blocked the bot.
    pub blocked: usize,
    /// Deleted accounts.
    pub deactivated: usize,
    /// Chat ids that do not resolve.
    pub invalid_peer: usize,
    /// Chats the bot may not write to.
    pub forbidden: usize,
    /// Any other failure.
    pub failed: usize,
}

impl BroadcastTally {
    /// Counts one processed recipient.
    pub fn record(&mut self, outcome: DeliveryOutcome) {
        self.total += 1;
        match outcome {
            DeliveryOutcome::Sent => self.sent += 1,
            DeliveryOutcome::Blocked => self.blocked += 1,
            DeliveryOutcome::Deactivated => self.deactivated += 1,
            DeliveryOutcome::InvalidPeer => self.invalid_peer += 1,
            DeliveryOutcome::Forbidden => self.forbidden += 1,
            DeliveryOutcome::Failed => self.failed += 1,
        }
    }

    /// Recipients that were not reached.
    pub fn unreachable(&self) -> usize {
        self.total - self.sent
    }

    /// HTML text of the live progress message.
    pub fn render_progress(&self) -> String {
        self.render("📢 Broadcast In Progress...")
    }

    /// HTML text of the final summary.
    pub fn render_summary(&self) -> String {
        self.render("✅ Broadcast Completed")
    }

    fn render(&self, title: &str) -> String {
        [
            html::bold(title),
            String::new(),
            format!("👥 Total: {}", html::code_inline(&self.total.to_string())),
            format!("✅ Sent: {}", html::code_inline(&self.sent.to_string())),
            format!("🚫 Blocked: {}", html::code_inline(&self.blocked.to_string())),
            format!("🗑️ Deactivated: {}", html::code_inline(&self.deactivated.to_string())),
            format!("🔍 Invalid: {}", html::code_inline(&self.invalid_peer.to_string())),
            format!("🚷 Forbidden: {}", html::code_inline(&self.forbidden.to_string())),
            format!("⚠️ Failed: {}", html::code_inline(&self.failed.to_string())),
        ]
        .join("\n")
    }
}
