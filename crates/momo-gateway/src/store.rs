use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;

use momo_db::Database;
use momo_db::models::{MessageRow, NewMessageRow};
use momo_types::models::{Message, NewMessage};
use momo_types::{ConversationId, UserId};

use crate::error::GatewayError;

/// The persistence operations the messaging core relies on.
pub trait MessageStore: Clone + Send + Sync + 'static {
    /// Write a message durably and return it with id and timestamps filled in.
    fn append_message(
        &self,
        msg: NewMessage,
    ) -> impl Future<Output = Result<Message, GatewayError>> + Send;

    /// Every message of a conversation, oldest first.
    fn list_messages(
        &self,
        conversation_id: ConversationId,
    ) -> impl Future<Output = Result<Vec<Message>, GatewayError>> + Send;

    fn resolve_display_name(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = Result<String, GatewayError>> + Send;

    fn user_exists(&self, user_id: UserId) -> impl Future<Output = Result<bool, GatewayError>> + Send;
}

/// [`MessageStore`] over the SQLite database. Each call runs on the blocking
/// pool so the connection mutex never stalls the async runtime.
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Database>,
}

impl SqliteStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    async fn blocking<F, T>(&self, f: F) -> Result<T, GatewayError>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| GatewayError::Storage(anyhow::anyhow!("spawn_blocking join error: {}", e)))?
            .map_err(GatewayError::Storage)
    }
}

impl MessageStore for SqliteStore {
    async fn append_message(&self, msg: NewMessage) -> Result<Message, GatewayError> {
        let row = self
            .blocking(move |db| {
                db.append_message(&NewMessageRow {
                    conv_id: msg.conversation_id,
                    user_id: msg.user_id,
                    user_name: &msg.user_name,
                    text: &msg.text,
                    kind: msg.kind,
                })
            })
            .await?;
        Ok(message_from_row(row))
    }

    async fn list_messages(&self, conversation_id: ConversationId) -> Result<Vec<Message>, GatewayError> {
        let rows = self.blocking(move |db| db.list_messages(conversation_id)).await?;
        Ok(rows.into_iter().map(message_from_row).collect())
    }

    async fn resolve_display_name(&self, user_id: UserId) -> Result<String, GatewayError> {
        self.blocking(move |db| db.get_username_by_id(user_id))
            .await?
            .ok_or_else(|| GatewayError::NotFound(format!("user {} not found", user_id)))
    }

    async fn user_exists(&self, user_id: UserId) -> Result<bool, GatewayError> {
        self.blocking(move |db| db.user_exists(user_id)).await
    }
}

fn message_from_row(row: MessageRow) -> Message {
    let created_at = row
        .created_at
        .parse::<DateTime<Utc>>()
        .unwrap_or_else(|e| {
            warn!("Corrupt created_at '{}' on message {}: {}", row.created_at, row.id, e);
            DateTime::default()
        });

    Message {
        id: row.id,
        conversation_id: row.conv_id,
        user_id: row.user_id,
        user_name: row.user_name,
        created_at,
        time: row.fmt_time,
        text: row.text,
        kind: row.kind,
    }
}
