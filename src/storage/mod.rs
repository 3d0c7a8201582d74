pub mod sqlite;

use async_trait::async_trait;
use mockall::automock;
use teloxide::types::ChatId;
use thiserror::Error;

/// Errors raised by the storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A query or connection failed.
    #[error("Database error: {0}")]
    DbError(String),
    /// The schema could not be migrated.
    #[error("Migration error: {0}")]
    MigrationError(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        StorageError::DbError(err.to_string())
    }
}

/// Result of a storage operation.
pub type StorageResult<T> = Result<T, StorageError>;

/// An auto-reply triggered when a private message contains `keyword`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordReply {
    /// Lowercase trigger.
    pub keyword: String,
    /// Response in button markup syntax.
    pub response: String,
}

/// A stored response for a callback button with data `data`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackReply {
    /// Lowercase callback data.
    pub data: String,
    /// Response in button markup syntax.
    pub response: String,
}

/// Users who started the bot. These are the broadcast recipients.
#[automock]
#[async_trait]
pub trait UserStorage: Send + Sync {
    /// Registers a user. Returns `false` if the user was already known.
    async fn add_user(&self, user_id: ChatId) -> StorageResult<bool>;

    /// Removes a user. Removing an unknown user is not an error, `false` is
    /// returned instead.
    async fn remove_user(&self, user_id: ChatId) -> StorageResult<bool>;

    /// Whether the user has started the bot.
    async fn has_user(&self, user_id: ChatId) -> StorageResult<bool>;

    /// Get all registered users.
    async fn get_all_users(&self) -> StorageResult<Vec<ChatId>>;

    /// Number of registered users.
    async fn count_users(&self) -> StorageResult<u64>;
}

/// Append-only log of who used which feature.
#[automock]
#[async_trait]
pub trait UsageLogStorage: Send + Sync {
    /// Appends a usage record for `action` performed by `user_id`.
    async fn log_usage(&self, user_id: ChatId, action: &str) -> StorageResult<()>;
}

/// Admin-managed keyword auto-replies and callback button responses.
#[automock]
#[async_trait]
pub trait ReplyStorage: Send + Sync {
    /// Inserts or replaces the response for a keyword. The keyword is stored
    /// lowercase.
    async fn save_keyword(&self, keyword: &str, response: &str) -> StorageResult<()>;

    /// All keywords in the order they were first saved.
    async fn get_keywords(&self) -> StorageResult<Vec<KeywordReply>>;

    /// Deletes a keyword, `false` if it did not exist.
    async fn delete_keyword(&self, keyword: &str) -> StorageResult<bool>;

    /// Deletes every keyword, returning how many were removed.
    async fn clear_keywords(&self) -> StorageResult<u64>;

    /// Inserts or replaces the response for callback data. The data is stored
    /// lowercase.
    async fn save_callback(&self, data: &str, response: &str) -> StorageResult<()>;

    /// Response stored for callback data, matched case-insensitively.
    async fn get_callback(&self, data: &str) -> StorageResult<Option<String>>;

    /// All callback responses in the order they were first saved.
    async fn get_callbacks(&self) -> StorageResult<Vec<CallbackReply>>;

    /// Deletes a callback response, `false` if it did not exist.
    async fn delete_callback(&self, data: &str) -> StorageResult<bool>;

    /// Deletes every callback response, returning how many were removed.
    async fn clear_callbacks(&self) -> StorageResult<u64>;
}
