mod delivery;
mod tally;
#[cfg(test)]
mod tests;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub use delivery::{
    DeliveryError, DeliveryOutcome, DeliveryPolicy, DeliveryTransport, MockDeliveryTransport,
    TelegramDeliveryTransport,
};
use futures::future::join_all;
pub use tally::BroadcastTally;
use teloxide::types::{ChatId, MessageId};
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    messaging::MessagingService,
    storage::{UsageLogStorage, UserStorage},
};

const DEFAULT_BATCH_SIZE: usize = 10;
const DEFAULT_PROGRESS_INTERVAL: usize = 5;

/// Reasons a broadcast could not be started.
#[derive(Debug, Error)]
pub enum BroadcastError {
    /// The command was not a reply to the message to send.
    #[error("❌ Reply to a message to broadcast.")]
    MissingTemplate,
    /// Another run holds the slot.
    #[error("❌ Another broadcast is in progress. Please wait.")]
    AlreadyRunning,
    /// The recipient list could not be loaded.
    #[error("❌ Failed to access user database. Please try again later.")]
    StoreUnavailable(String),
    /// Nobody has started the bot yet.
    #[error("❌ No users found to broadcast to.")]
    NoRecipients,
}

/// The message every recipient receives a copy of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastTemplate {
    /// Chat the original message lives in.
    pub from_chat_id: ChatId,
    /// Id of the original message.
    pub message_id: MessageId,
}

/// Tunables of a broadcast run.
#[derive(Debug, Clone)]
pub struct BroadcastSettings {
    /// Recipients delivered to concurrently; the next batch starts once the
    /// whole batch settled.
    pub batch_size: usize,
    /// Progress is edited every `progress_interval` processed recipients and
    /// once more at the end.
    pub progress_interval: usize,
    /// Per-recipient retry rules.
    pub policy: DeliveryPolicy,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            policy: DeliveryPolicy::default(),
        }
    }
}

type ActiveRun = Arc<Mutex<Option<CancellationToken>>>;

fn lock(active: &ActiveRun) -> MutexGuard<'_, Option<CancellationToken>> {
    active.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Ownership of the single broadcast slot. Dropping it frees the slot.
struct RunSlot {
    active: ActiveRun,
    token: CancellationToken,
}

impl Drop for RunSlot {
    fn drop(&mut self) {
        lock(&self.active).take();
        debug!("Broadcast slot released");
    }
}

/// Fans a message out to every registered user, one broadcast at a time.
pub struct BroadcastEngine {
    user_storage: Arc<dyn UserStorage>,
    usage_log: Arc<dyn UsageLogStorage>,
    transport: Arc<dyn DeliveryTransport>,
    messaging_service: Arc<dyn MessagingService>,
    settings: BroadcastSettings,
    active: ActiveRun,
}

impl BroadcastEngine {
    /// Creates an idle engine.
    pub fn new(
        user_storage: Arc<dyn UserStorage>,
        usage_log: Arc<dyn UsageLogStorage>,
        transport: Arc<dyn DeliveryTransport>,
        messaging_service: Arc<dyn MessagingService>,
        settings: BroadcastSettings,
    ) -> Self {
        Self {
            user_storage,
            usage_log,
            transport,
            messaging_service,
            settings,
            active: Arc::new(Mutex::new(None)),
        }
    }

    /// Checks the preconditions and claims the broadcast slot.
    ///
    /// On success the returned run owns the slot until it is executed or
    /// dropped. On failure no slot is held.
    pub async fn start(
        &self,
        initiator: ChatId,
        actor: ChatId,
        template: Option<BroadcastTemplate>,
    ) -> Result<BroadcastRun, BroadcastError> {
        let template = template.ok_or(BroadcastError::MissingTemplate)?;
        let slot = self.claim_slot()?;

        let recipients = self.user_storage.get_all_users().await.map_err(|e| {
            error!("Failed to load broadcast recipients: {e}");
            BroadcastError::StoreUnavailable(e.to_string())
        })?;

        if recipients.is_empty() {
            return Err(BroadcastError::NoRecipients);
        }

        info!(recipients = recipients.len(), "Broadcast started by {actor}");

        Ok(BroadcastRun {
            initiator,
            actor,
            template,
            recipients,
            user_storage: self.user_storage.clone(),
            usage_log: self.usage_log.clone(),
            transport: self.transport.clone(),
            messaging_service: self.messaging_service.clone(),
            settings: self.settings.clone(),
            slot,
        })
    }

    /// Requests cancellation of the active run. Returns `false` if nothing is
    /// running.
    pub fn cancel(&self) -> bool {
        match lock(&self.active).as_ref() {
            Some(token) => {
                token.cancel();
                info!("Broadcast cancellation requested");
                true
            }
            None => false,
        }
    }

    /// Whether a run currently holds the slot.
    pub fn is_running(&self) -> bool {
        lock(&self.active).is_some()
    }

    /// Delivers `template` to a single recipient with the broadcast retry
    /// policy. Independent of the broadcast slot.
    pub async fn deliver_one(
        &self,
        template: &BroadcastTemplate,
        recipient: ChatId,
    ) -> DeliveryOutcome {
        self.settings.policy.deliver(self.transport.as_ref(), template, recipient).await
    }

    fn claim_slot(&self) -> Result<RunSlot, BroadcastError> {
        let mut active = lock(&self.active);
        if active.is_some() {
            return Err(BroadcastError::AlreadyRunning);
        }

        let token = CancellationToken::new();
        *active = Some(token.clone());

        Ok(RunSlot { active: self.active.clone(), token })
    }
}

/// A broadcast that passed its preconditions and holds the slot.
pub struct BroadcastRun {
    initiator: ChatId,
    actor: ChatId,
    template: BroadcastTemplate,
    recipients: Vec<ChatId>,
    user_storage: Arc<dyn UserStorage>,
    usage_log: Arc<dyn UsageLogStorage>,
    transport: Arc<dyn DeliveryTransport>,
    messaging_service: Arc<dyn MessagingService>,
    settings: BroadcastSettings,
    slot: RunSlot,
}

impl BroadcastRun {
    /// Recipients loaded when the run started.
    pub fn recipients(&self) -> &[ChatId] {
        &self.recipients
    }

    /// Token observed between batches. Cancelling it stops the run after the
    /// batch in flight.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.slot.token.clone()
    }

    /// Delivers the template to every recipient and reports the result to the
    /// initiator. Per-recipient and reporting failures never abort the run.
    pub async fn execute(self) -> BroadcastTally {
        let BroadcastRun {
            initiator,
            actor,
            template,
            recipients,
            user_storage,
            usage_log,
            transport,
            messaging_service,
            settings,
            slot,
        } = self;

        let token = slot.token.clone();
        let batch_size = settings.batch_size.max(1);
        let progress_interval = settings.progress_interval.max(1);
        let mut tally = BroadcastTally::default();
        let mut cleanup = JoinSet::new();

        let progress_msg =
            match messaging_service.send_broadcast_progress_msg(initiator, &tally).await {
                Ok(message_id) => Some(message_id),
                Err(e) => {
                    warn!("Failed to send broadcast progress message: {e}");
                    None
                }
            };

        for batch in recipients.chunks(batch_size) {
            if token.is_cancelled() {
                info!(processed = tally.total, "Broadcast cancelled");
                break;
            }

            let policy = &settings.policy;
            let deliveries = batch
                .iter()
                .map(|&recipient| policy.deliver(transport.as_ref(), &template, recipient));
            let outcomes = join_all(deliveries).await;

            for (&recipient, outcome) in batch.iter().zip(outcomes) {
                tally.record(outcome);

                if outcome != DeliveryOutcome::Sent {
                    debug!(recipient = recipient.0, ?outcome, "Removing unreachable recipient");
                    let user_storage = user_storage.clone();
                    cleanup.spawn(async move {
                        user_storage.remove_user(recipient).await.map(|_| recipient)
                    });
                }

                if tally.total % progress_interval == 0 || tally.total == recipients.len() {
                    if let Some(message_id) = progress_msg {
                        if let Err(e) = messaging_service
                            .edit_broadcast_progress_msg(initiator, message_id, &tally)
                            .await
                        {
                            warn!("Failed to update broadcast progress: {e}");
                        }
                    }
                }
            }
        }

        drop(slot);

        while let Some(joined) = cleanup.join_next().await {
            match joined {
                Ok(Ok(recipient)) => debug!(recipient = recipient.0, "Recipient removed"),
                Ok(Err(e)) => error!("Failed to remove recipient: {e}"),
                Err(e) => error!("Recipient removal task failed: {e}"),
            }
        }

        if let Some(message_id) = progress_msg {
            if let Err(e) = messaging_service.delete_message(initiator, message_id).await {
                warn!("Failed to delete broadcast progress message: {e}");
            }
        }

        if let Err(e) = messaging_service.send_broadcast_summary_msg(initiator, &tally).await {
            error!("Failed to send broadcast summary: {e}");
        }

        if let Err(e) = usage_log.log_usage(actor, "broadcast").await {
            warn!("Failed to record broadcast usage: {e}");
        }

        info!(
            total = tally.total,
            sent = tally.sent,
            unreachable = tally.unreachable(),
            "Broadcast finished"
        );

        tally
    }
}
