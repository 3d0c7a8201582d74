use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use mockall::predicate::*;
use teloxide::{
    ApiError, RequestError,
    types::{ChatId, MessageId},
};
use tokio_util::sync::CancellationToken;

use super::*;
use crate::{
    messaging::{MessagingError, MockMessagingService},
    storage::{MockUsageLogStorage, MockUserStorage, StorageError},
};

const ADMIN_CHAT: ChatId = ChatId(1);
const PROGRESS_MSG: MessageId = MessageId(99);

fn template() -> Option<BroadcastTemplate> {
    Some(BroadcastTemplate { from_chat_id: ADMIN_CHAT, message_id: MessageId(7) })
}

fn recipients(count: i64) -> Vec<ChatId> {
    (100..100 + count).map(ChatId).collect()
}

fn fast_settings(batch_size: usize, progress_interval: usize) -> BroadcastSettings {
    BroadcastSettings {
        batch_size,
        progress_interval,
        policy: DeliveryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
        },
    }
}

struct Mocks {
    users: MockUserStorage,
    usage: MockUsageLogStorage,
    transport: MockDeliveryTransport,
    messaging: MockMessagingService,
}

impl Mocks {
    /// Mocks with the given recipients and permissive reporting expectations.
    fn with_recipients(list: Vec<ChatId>) -> Self {
        let mut users = MockUserStorage::new();
        users.expect_get_all_users().returning(move || Ok(list.clone()));

        let mut usage = MockUsageLogStorage::new();
        usage.expect_log_usage().returning(|_, _| Ok(()));

        Self {
            users,
            usage,
            transport: MockDeliveryTransport::new(),
            messaging: MockMessagingService::new(),
        }
    }

    fn allow_reporting(&mut self) {
        self.messaging.expect_send_broadcast_progress_msg().returning(|_, _| Ok(PROGRESS_MSG));
        self.messaging.expect_edit_broadcast_progress_msg().returning(|_, _, _| Ok(()));
        self.messaging.expect_delete_message().returning(|_, _| Ok(()));
        self.messaging.expect_send_broadcast_summary_msg().returning(|_, _| Ok(()));
    }

    fn into_engine(self, settings: BroadcastSettings) -> BroadcastEngine {
        BroadcastEngine::new(
            Arc::new(self.users),
            Arc::new(self.usage),
            Arc::new(self.transport),
            Arc::new(self.messaging),
            settings,
        )
    }

    fn into_engine_with(
        self,
        transport: Arc<dyn DeliveryTransport>,
        settings: BroadcastSettings,
    ) -> BroadcastEngine {
        BroadcastEngine::new(
            Arc::new(self.users),
            Arc::new(self.usage),
            transport,
            Arc::new(self.messaging),
            settings,
        )
    }
}

/// Holds every delivery for a moment and records what was in flight.
#[derive(Default)]
struct SlowTransport {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    events: Mutex<Vec<(&'static str, i64)>>,
}

#[async_trait]
impl DeliveryTransport for SlowTransport {
    async fn deliver(
        &self,
        _template: &BroadcastTemplate,
        recipient: ChatId,
    ) -> Result<(), DeliveryError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.events.lock().unwrap().push(("start", recipient.0));

        tokio::time::sleep(Duration::from_millis(20)).await;

        self.events.lock().unwrap().push(("end", recipient.0));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Sorted recipient ids of `events`, all of which must be of `kind`.
fn ids_of(events: &[(&'static str, i64)], kind: &str) -> Vec<i64> {
    let mut ids: Vec<i64> = events
        .iter()
        .map(|&(event, id)| {
            assert_eq!(event, kind);
            id
        })
        .collect();
    ids.sort();
    ids
}

async fn run_to_completion(engine: &BroadcastEngine) -> BroadcastTally {
    let run = engine.start(ADMIN_CHAT, ADMIN_CHAT, template()).await.unwrap();
    run.execute().await
}

#[tokio::test]
async fn test_all_recipients_sent() {
    let mut mocks = Mocks::with_recipients(recipients(3));
    mocks.allow_reporting();
    mocks.transport.expect_deliver().times(3).returning(|_, _| Ok(()));
    mocks.users.expect_remove_user().never();

    let engine = mocks.into_engine(fast_settings(10, 5));
    let tally = run_to_completion(&engine).await;

    assert_eq!(tally, BroadcastTally { total: 3, sent: 3, ..Default::default() });
    assert!(!engine.is_running());
}

#[tokio::test]
async fn test_batches_run_concurrently_and_one_after_another() {
    let mut mocks = Mocks::with_recipients(recipients(7));
    mocks.allow_reporting();
    let transport = Arc::new(SlowTransport::default());

    let engine = mocks.into_engine_with(transport.clone(), fast_settings(3, 5));
    let tally = run_to_completion(&engine).await;

    assert_eq!(tally, BroadcastTally { total: 7, sent: 7, ..Default::default() });
    assert_eq!(transport.max_in_flight.load(Ordering::SeqCst), 3);

    // Every batch starts all of its deliveries, then all of them finish
    // before the next batch starts.
    let events = transport.events.lock().unwrap().clone();
    let mut rest = events.as_slice();
    let mut batches = 0;
    for expected in [vec![100, 101, 102], vec![103, 104, 105], vec![106]] {
        let (starts, tail) = rest.split_at(expected.len());
        let (ends, tail) = tail.split_at(expected.len());
        assert_eq!(ids_of(starts, "start"), expected);
        assert_eq!(ids_of(ends, "end"), expected);
        rest = tail;
        batches += 1;
    }
    assert!(rest.is_empty());
    assert_eq!(batches, 3);
}

#[tokio::test]
async fn test_deliver_one_uses_the_retry_policy() {
    let mut mocks = Mocks::with_recipients(recipients(1));
    let mut seq = mockall::Sequence::new();
    mocks
        .transport
        .expect_deliver()
        .with(always(), eq(ChatId(500)))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Err(DeliveryError::Transient("timeout".to_string())));
    mocks
        .transport
        .expect_deliver()
        .with(always(), eq(ChatId(500)))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(()));

    let engine = mocks.into_engine(fast_settings(10, 5));
    let template = template().unwrap();

    assert_eq!(engine.deliver_one(&template, ChatId(500)).await, DeliveryOutcome::Sent);
    assert!(!engine.is_running());
}

#[tokio::test]
async fn test_outcomes_are_classified_and_unreachable_recipients_removed() {
    let mut mocks = Mocks::with_recipients(recipients(6));
    mocks.allow_reporting();
    mocks.transport.expect_deliver().returning(|_, recipient| match recipient.0 {
        100 => Ok(()),
        101 => Err(DeliveryError::Blocked),
        102 => Err(DeliveryError::Deactivated),
        103 => Err(DeliveryError::InvalidPeer),
        104 => Err(DeliveryError::Forbidden),
        _ => Err(DeliveryError::Other("Bad Request: message to copy not found".to_string())),
    });
    for id in 101..=105 {
        mocks.users.expect_remove_user().with(eq(ChatId(id))).times(1).returning(|_| Ok(true));
    }

    let engine = mocks.into_engine(fast_settings(4, 5));
    let tally = run_to_completion(&engine).await;

    assert_eq!(
        tally,
        BroadcastTally {
            total: 6,
            sent: 1,
            blocked: 1,
            deactivated: 1,
            invalid_peer: 1,
            forbidden: 1,
            failed: 1,
        }
    );
}

#[tokio::test]
async fn test_permanent_error_is_attempted_once() {
    let mut mocks = Mocks::with_recipients(recipients(1));
    mocks.allow_reporting();
    mocks.transport.expect_deliver().times(1).returning(|_, _| Err(DeliveryError::Blocked));
    mocks.users.expect_remove_user().times(1).returning(|_| Ok(true));

    let engine = mocks.into_engine(fast_settings(10, 5));
    let tally = run_to_completion(&engine).await;

    assert_eq!(tally.blocked, 1);
}

#[tokio::test]
async fn test_transient_error_is_retried_then_failed() {
    let mut mocks = Mocks::with_recipients(recipients(1));
    mocks.allow_reporting();
    mocks
        .transport
        .expect_deliver()
        .times(3)
        .returning(|_, _| Err(DeliveryError::Transient("connection reset".to_string())));
    mocks.users.expect_remove_user().times(1).returning(|_| Ok(true));

    let engine = mocks.into_engine(fast_settings(10, 5));
    let tally = run_to_completion(&engine).await;

    assert_eq!(tally, BroadcastTally { total: 1, failed: 1, ..Default::default() });
}

#[tokio::test]
async fn test_transient_error_then_success_is_sent() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut mocks = Mocks::with_recipients(recipients(1));
    mocks.allow_reporting();
    let counter = calls.clone();
    mocks.transport.expect_deliver().returning(move |_, _| {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(DeliveryError::Transient("timeout".to_string()))
        } else {
            Ok(())
        }
    });
    mocks.users.expect_remove_user().never();

    let engine = mocks.into_engine(fast_settings(10, 5));
    let tally = run_to_completion(&engine).await;

    assert_eq!(tally.sent, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_rate_limit_waits_and_retries_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut mocks = Mocks::with_recipients(recipients(1));
    mocks.allow_reporting();
    let counter = calls.clone();
    mocks.transport.expect_deliver().returning(move |_, _| {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(DeliveryError::RateLimited(Duration::from_millis(5)))
        } else {
            Ok(())
        }
    });
    mocks.users.expect_remove_user().never();

    let engine = mocks.into_engine(fast_settings(10, 5));
    let tally = run_to_completion(&engine).await;

    assert_eq!(tally, BroadcastTally { total: 1, sent: 1, ..Default::default() });
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_rate_limit_followed_by_permanent_error() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut mocks = Mocks::with_recipients(recipients(1));
    mocks.allow_reporting();
    let counter = calls.clone();
    mocks.transport.expect_deliver().returning(move |_, _| {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(DeliveryError::RateLimited(Duration::from_millis(1)))
        } else {
            Err(DeliveryError::Blocked)
        }
    });
    mocks.users.expect_remove_user().times(1).returning(|_| Ok(true));

    let engine = mocks.into_engine(fast_settings(10, 5));
    let tally = run_to_completion(&engine).await;

    assert_eq!(tally.blocked, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_progress_is_edited_at_interval_and_at_end() {
    let edits = Arc::new(Mutex::new(Vec::new()));
    let mut mocks = Mocks::with_recipients(recipients(12));
    mocks.transport.expect_deliver().returning(|_, _| Ok(()));
    mocks
        .messaging
        .expect_send_broadcast_progress_msg()
        .with(eq(ADMIN_CHAT), always())
        .times(1)
        .returning(|_, _| Ok(PROGRESS_MSG));
    let seen = edits.clone();
    mocks
        .messaging
        .expect_edit_broadcast_progress_msg()
        .with(eq(ADMIN_CHAT), eq(PROGRESS_MSG), always())
        .returning(move |_, _, tally| {
            seen.lock().unwrap().push(tally.total);
            Ok(())
        });
    mocks
        .messaging
        .expect_delete_message()
        .with(eq(ADMIN_CHAT), eq(PROGRESS_MSG))
        .times(1)
        .returning(|_, _| Ok(()));
    mocks
        .messaging
        .expect_send_broadcast_summary_msg()
        .withf(|chat_id, tally| *chat_id == ADMIN_CHAT && tally.total == 12 && tally.sent == 12)
        .times(1)
        .returning(|_, _| Ok(()));

    let engine = mocks.into_engine(fast_settings(10, 5));
    run_to_completion(&engine).await;

    assert_eq!(*edits.lock().unwrap(), vec![5, 10, 12]);
}

#[tokio::test]
async fn test_progress_failures_do_not_abort_the_run() {
    let mut mocks = Mocks::with_recipients(recipients(6));
    mocks.transport.expect_deliver().times(6).returning(|_, _| Ok(()));
    mocks.messaging.expect_send_broadcast_progress_msg().returning(|_, _| Ok(PROGRESS_MSG));
    mocks.messaging.expect_edit_broadcast_progress_msg().returning(|_, _, _| {
        Err(MessagingError::TeloxideRequest(RequestError::Api(ApiError::MessageNotModified)))
    });
    mocks.messaging.expect_delete_message().returning(|_, _| {
        Err(MessagingError::TeloxideRequest(RequestError::Api(ApiError::MessageToDeleteNotFound)))
    });
    mocks.messaging.expect_send_broadcast_summary_msg().times(1).returning(|_, _| Ok(()));

    let engine = mocks.into_engine(fast_settings(2, 1));
    let tally = run_to_completion(&engine).await;

    assert_eq!(tally.sent, 6);
}

#[tokio::test]
async fn test_run_continues_without_progress_message() {
    let mut mocks = Mocks::with_recipients(recipients(3));
    mocks.transport.expect_deliver().times(3).returning(|_, _| Ok(()));
    mocks.messaging.expect_send_broadcast_progress_msg().returning(|_, _| {
        Err(MessagingError::TeloxideRequest(RequestError::Api(ApiError::BotBlocked)))
    });
    mocks.messaging.expect_edit_broadcast_progress_msg().never();
    mocks.messaging.expect_delete_message().never();
    mocks.messaging.expect_send_broadcast_summary_msg().times(1).returning(|_, _| Ok(()));

    let engine = mocks.into_engine(fast_settings(10, 1));
    let tally = run_to_completion(&engine).await;

    assert_eq!(tally.sent, 3);
}

#[tokio::test]
async fn test_cancellation_stops_after_current_batch() {
    let token_slot: Arc<Mutex<Option<CancellationToken>>> = Arc::new(Mutex::new(None));
    let mut mocks = Mocks::with_recipients(recipients(6));
    mocks.allow_reporting();
    let slot = token_slot.clone();
    mocks.transport.expect_deliver().times(4).returning(move |_, recipient| {
        // Cancel while the second batch is in flight.
        if recipient == ChatId(102) {
            if let Some(token) = slot.lock().unwrap().as_ref() {
                token.cancel();
            }
        }
        Ok(())
    });

    let engine = mocks.into_engine(fast_settings(2, 5));
    let run = engine.start(ADMIN_CHAT, ADMIN_CHAT, template()).await.unwrap();
    *token_slot.lock().unwrap() = Some(run.cancellation_token());
    let tally = run.execute().await;

    assert_eq!(tally.total, 4);
    assert_eq!(tally.sent, 4);
    assert!(!engine.is_running());
}

#[tokio::test]
async fn test_engine_cancel() {
    let mut mocks = Mocks::with_recipients(recipients(2));
    mocks.allow_reporting();
    mocks.transport.expect_deliver().never();

    let engine = mocks.into_engine(fast_settings(1, 5));
    assert!(!engine.cancel());

    let run = engine.start(ADMIN_CHAT, ADMIN_CHAT, template()).await.unwrap();
    assert!(engine.cancel());
    let tally = run.execute().await;

    assert_eq!(tally.total, 0);
    assert!(!engine.cancel());
}

#[tokio::test]
async fn test_second_broadcast_is_rejected_while_running() {
    let mut mocks = Mocks::with_recipients(recipients(1));
    mocks.allow_reporting();
    mocks.transport.expect_deliver().returning(|_, _| Ok(()));

    let engine = mocks.into_engine(fast_settings(10, 5));
    let run = engine.start(ADMIN_CHAT, ADMIN_CHAT, template()).await.unwrap();
    assert!(engine.is_running());

    let second = engine.start(ADMIN_CHAT, ADMIN_CHAT, template()).await;
    assert!(matches!(second, Err(BroadcastError::AlreadyRunning)));

    run.execute().await;
    assert!(!engine.is_running());

    let third = engine.start(ADMIN_CHAT, ADMIN_CHAT, template()).await;
    assert!(third.is_ok());
}

#[tokio::test]
async fn test_dropping_a_run_releases_the_slot() {
    let mocks = Mocks::with_recipients(recipients(1));
    let engine = mocks.into_engine(fast_settings(10, 5));

    let run = engine.start(ADMIN_CHAT, ADMIN_CHAT, template()).await.unwrap();
    drop(run);

    assert!(!engine.is_running());
}

#[tokio::test]
async fn test_missing_template() {
    let mut mocks = Mocks::with_recipients(recipients(1));
    mocks.users.checkpoint();
    mocks.users.expect_get_all_users().never();

    let engine = mocks.into_engine(fast_settings(10, 5));
    let result = engine.start(ADMIN_CHAT, ADMIN_CHAT, None).await;

    assert!(matches!(result, Err(BroadcastError::MissingTemplate)));
    assert!(!engine.is_running());
}

#[tokio::test]
async fn test_store_unavailable_releases_slot() {
    let mut users = MockUserStorage::new();
    users
        .expect_get_all_users()
        .returning(|| Err(StorageError::DbError("unable to open database file".to_string())));
    let mocks = Mocks {
        users,
        usage: MockUsageLogStorage::new(),
        transport: MockDeliveryTransport::new(),
        messaging: MockMessagingService::new(),
    };

    let engine = mocks.into_engine(fast_settings(10, 5));
    let result = engine.start(ADMIN_CHAT, ADMIN_CHAT, template()).await;

    assert!(matches!(result, Err(BroadcastError::StoreUnavailable(_))));
    assert!(!engine.is_running());
}

#[tokio::test]
async fn test_no_recipients_releases_slot() {
    let engine = Mocks::with_recipients(vec![]).into_engine(fast_settings(10, 5));

    let result = engine.start(ADMIN_CHAT, ADMIN_CHAT, template()).await;

    assert!(matches!(result, Err(BroadcastError::NoRecipients)));
    assert!(!engine.is_running());
}

#[tokio::test]
async fn test_failed_removal_and_usage_log_are_tolerated() {
    let mut mocks = Mocks::with_recipients(recipients(2));
    mocks.allow_reporting();
    mocks.transport.expect_deliver().returning(|_, _| Err(DeliveryError::Deactivated));
    mocks
        .users
        .expect_remove_user()
        .times(2)
        .returning(|_| Err(StorageError::DbError("database is locked".to_string())));
    mocks.usage.checkpoint();
    mocks
        .usage
        .expect_log_usage()
        .with(eq(ADMIN_CHAT), eq("broadcast"))
        .times(1)
        .returning(|_, _| Err(StorageError::DbError("database is locked".to_string())));

    let engine = mocks.into_engine(fast_settings(10, 5));
    let tally = run_to_completion(&engine).await;

    assert_eq!(tally, BroadcastTally { total: 2, deactivated: 2, ..Default::default() });
}

#[test]
fn test_precondition_messages() {
    assert_eq!(BroadcastError::MissingTemplate.to_string(), "❌ Reply to a message to broadcast.");
    assert_eq!(
        BroadcastError::AlreadyRunning.to_string(),
        "❌ Another broadcast is in progress. Please wait."
    );
    assert_eq!(
        BroadcastError::StoreUnavailable("x".into()).to_string(),
        "❌ Failed to access user database. Please try again later."
    );
    assert_eq!(BroadcastError::NoRecipients.to_string(), "❌ No users found to broadcast to.");
}
