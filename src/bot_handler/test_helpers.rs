use std::sync::Arc;

use chrono::Utc;
use teloxide::types::{
    CallbackQuery, Chat, ChatId, ChatKind, ChatPrivate, MaybeInaccessibleMessage, MediaKind,
    MediaText, Message, MessageCommon, MessageId, MessageKind, User, UserId,
};

use crate::{
    bot_handler::{BotHandler, BotHandlerError, Command},
    broadcast::{BroadcastEngine, BroadcastSettings, MockDeliveryTransport},
    messaging::MockMessagingService,
    storage::{MockReplyStorage, MockUsageLogStorage, MockUserStorage},
    wiki::MockWikiClient,
};

pub const CHAT_ID: ChatId = ChatId(123);
pub const ADMIN_ID: UserId = UserId(123);
pub const USER_ID: UserId = UserId(456);
pub const LOG_CHANNEL: ChatId = ChatId(-100);

/// Mocks for every collaborator of the handler. Set expectations, then call
/// `into_handler`.
#[derive(Default)]
pub struct Mocks {
    pub messaging: MockMessagingService,
    pub users: MockUserStorage,
    pub usage: MockUsageLogStorage,
    pub replies: MockReplyStorage,
    pub wiki: MockWikiClient,
    pub transport: MockDeliveryTransport,
}

impl Mocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_handler(self) -> BotHandler {
        let messaging = Arc::new(self.messaging);
        let users = Arc::new(self.users);
        let usage = Arc::new(self.usage);
        let engine = Arc::new(BroadcastEngine::new(
            users.clone(),
            usage.clone(),
            Arc::new(self.transport),
            messaging.clone(),
            BroadcastSettings::default(),
        ));

        BotHandler::new(
            messaging,
            users,
            usage,
            Arc::new(self.replies),
            Arc::new(self.wiki),
            engine,
            vec![ADMIN_ID],
        )
    }
}

// Simulates an admin sending a command in their private chat.
pub async fn handle_admin_command(
    handler: &BotHandler,
    command: Command,
) -> Result<(), BotHandlerError> {
    let msg = mock_message_from(CHAT_ID, ADMIN_ID, "/command");
    handler.handle_commands(&msg, command).await
}

// Simulates a regular user sending a command.
pub async fn handle_user_command(
    handler: &BotHandler,
    command: Command,
) -> Result<(), BotHandlerError> {
    let msg = mock_message_from(CHAT_ID, USER_ID, "/command");
    handler.handle_commands(&msg, command).await
}

pub fn mock_user(user_id: UserId) -> User {
    User {
        id: user_id,
        is_bot: false,
        first_name: "Test".to_string(),
        last_name: None,
        username: Some("testuser".to_string()),
        language_code: None,
        is_premium: false,
        added_to_attachment_menu: false,
    }
}

// Helper to create a mock teloxide message to reduce boilerplate in tests
pub fn mock_message(chat_id: ChatId, text: &str) -> Message {
    Message {
        id: MessageId(1),
        date: Utc::now(),
        chat: Chat {
            id: chat_id,
            kind: ChatKind::Private(ChatPrivate {
                username: Some("test".to_string()),
                first_name: Some("Test".to_string()),
                last_name: None,
            }),
        },
        kind: MessageKind::Common(MessageCommon {
            media_kind: MediaKind::Text(MediaText {
                text: text.to_string(),
                entities: vec![],
                link_preview_options: None,
            }),
            reply_to_message: None,
            reply_markup: None,
            edit_date: None,
            author_signature: None,
            has_protected_content: false,
            is_automatic_forward: false,
            effect_id: None,
            forward_origin: None,
            external_reply: None,
            quote: None,
            reply_to_story: None,
            sender_boost_count: None,
            is_from_offline: false,
            business_connection_id: None,
        }),
        from: None,
        is_topic_message: false,
        sender_business_bot: None,
        sender_chat: None,
        thread_id: None,
        via_bot: None,
    }
}

pub fn mock_message_from(chat_id: ChatId, user_id: UserId, text: &str) -> Message {
    let mut msg = mock_message(chat_id, text);
    msg.from = Some(mock_user(user_id));
    msg
}

// Helper to create a message replying to another one.
pub fn mock_reply(chat_id: ChatId, user_id: UserId, text: &str, replied: Message) -> Message {
    let mut msg = mock_message_from(chat_id, user_id, text);
    if let MessageKind::Common(common) = &mut msg.kind {
        common.reply_to_message = Some(Box::new(replied));
    }
    msg
}

// Helper to create a mock callback query pressed by `user_id`.
pub fn mock_callback_query(chat_id: ChatId, user_id: UserId, data: &str) -> CallbackQuery {
    let msg = mock_message(chat_id, "This is a message with a keyboard.");
    CallbackQuery {
        id: "test_callback_id".to_string(),
        from: mock_user(user_id),
        message: Some(MaybeInaccessibleMessage::Regular(Box::new(msg))),
        inline_message_id: None,
        chat_instance: "test_instance".to_string(),
        data: Some(data.to_string()),
        game_short_name: None,
    }
}
