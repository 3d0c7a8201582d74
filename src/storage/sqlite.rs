use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{
    Pool, Row, Sqlite, SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use teloxide::types::ChatId;
use tracing::debug;

use crate::storage::{
    CallbackReply, KeywordReply, ReplyStorage, StorageError, StorageResult, UsageLogStorage,
    UserStorage,
};

/// SQLite backed implementation of every storage trait.
pub struct SqliteStorage {
    pool: Pool<Sqlite>,
}

impl SqliteStorage {
    /// Opens (creating if needed) and migrates the database.
    pub async fn new(database_url: &str) -> StorageResult<Self> {
        debug!("Connecting to SQLite database: {}", database_url);
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool: SqlitePool = SqlitePoolOptions::new().connect_with(options).await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StorageError::MigrationError(e.to_string()))?;
        debug!("SQLite database migrated");

        Ok(Self { pool })
    }
}

#[async_trait]
impl UserStorage for SqliteStorage {
    async fn add_user(&self, user_id: ChatId) -> StorageResult<bool> {
        debug!("Adding user to SQLite: {}", user_id);

        let result = sqlx::query("INSERT OR IGNORE INTO users (user_id) VALUES (?)")
            .bind(user_id.0)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn remove_user(&self, user_id: ChatId) -> StorageResult<bool> {
        debug!("Removing user from SQLite: {}", user_id);

        let result = sqlx::query("DELETE FROM users WHERE user_id = ?")
            .bind(user_id.0)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn has_user(&self, user_id: ChatId) -> StorageResult<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM users WHERE user_id = ?")
            .bind(user_id.0)
            .fetch_optional(&self.pool)
            .await?;

        Ok(found.is_some())
    }

    async fn get_all_users(&self) -> StorageResult<Vec<ChatId>> {
        debug!("Getting all users from SQLite");

        let ids: Vec<i64> = sqlx::query_scalar("SELECT user_id FROM users ORDER BY rowid")
            .fetch_all(&self.pool)
            .await?;

        Ok(ids.into_iter().map(ChatId).collect())
    }

    async fn count_users(&self) -> StorageResult<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM users").fetch_one(&self.pool).await?;

        Ok(count as u64)
    }
}

#[async_trait]
impl UsageLogStorage for SqliteStorage {
    async fn log_usage(&self, user_id: ChatId, action: &str) -> StorageResult<()> {
        debug!("Logging usage of {} by {}", action, user_id);

        sqlx::query("INSERT INTO usage_logs (user_id, command, timestamp) VALUES (?, ?, ?)")
            .bind(user_id.0)
            .bind(action)
            .bind(Utc::now().timestamp())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl ReplyStorage for SqliteStorage {
    async fn save_keyword(&self, keyword: &str, response: &str) -> StorageResult<()> {
        debug!("Saving keyword to SQLite: {}", keyword);

        // Upsert in place so the keyword keeps its original position.
        sqlx::query(
            "INSERT INTO keywords (keyword, response) VALUES (?, ?)
             ON CONFLICT(keyword) DO UPDATE SET response = excluded.response",
        )
        .bind(keyword.to_lowercase())
        .bind(response)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_keywords(&self) -> StorageResult<Vec<KeywordReply>> {
        let rows = sqlx::query("SELECT keyword, response FROM keywords ORDER BY rowid")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| -> StorageResult<KeywordReply> {
                Ok(KeywordReply {
                    keyword: row.try_get("keyword")?,
                    response: row.try_get("response")?,
                })
            })
            .collect()
    }

    async fn delete_keyword(&self, keyword: &str) -> StorageResult<bool> {
        debug!("Deleting keyword from SQLite: {}", keyword);

        let result = sqlx::query("DELETE FROM keywords WHERE keyword = ?")
            .bind(keyword.to_lowercase())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn clear_keywords(&self) -> StorageResult<u64> {
        let result = sqlx::query("DELETE FROM keywords").execute(&self.pool).await?;

        Ok(result.rows_affected())
    }

    async fn save_callback(&self, data: &str, response: &str) -> StorageResult<()> {
        debug!("Saving callback to SQLite: {}", data);

        sqlx::query(
            "INSERT INTO callbacks (data, response) VALUES (?, ?)
             ON CONFLICT(data) DO UPDATE SET response = excluded.response",
        )
        .bind(data.to_lowercase())
        .bind(response)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_callback(&self, data: &str) -> StorageResult<Option<String>> {
        let response: Option<String> =
            sqlx::query_scalar("SELECT response FROM callbacks WHERE data = ?")
                .bind(data.to_lowercase())
                .fetch_optional(&self.pool)
                .await?;

        Ok(response)
    }

    async fn get_callbacks(&self) -> StorageResult<Vec<CallbackReply>> {
        let rows = sqlx::query("SELECT data, response FROM callbacks ORDER BY rowid")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| -> StorageResult<CallbackReply> {
                Ok(CallbackReply { data: row.try_get("data")?, response: row.try_get("response")? })
            })
            .collect()
    }

    async fn delete_callback(&self, data: &str) -> StorageResult<bool> {
        debug!("Deleting callback from SQLite: {}", data);

        let result = sqlx::query("DELETE FROM callbacks WHERE data = ?")
            .bind(data.to_lowercase())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn clear_callbacks(&self) -> StorageResult<u64> {
        let result = sqlx::query("DELETE FROM callbacks").execute(&self.pool).await?;

        Ok(result.rows_affected())
    }
}
