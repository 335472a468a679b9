use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ConversationId, UserId};

/// A persisted chat message. Immutable once the store has assigned its id.
///
/// Serializes directly as the outbound message frame; `created_at` stays
/// server-side and only `time` goes over the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub conversation_id: ConversationId,
    pub user_id: UserId,
    pub user_name: String,
    #[serde(skip)]
    pub created_at: DateTime<Utc>,
    pub time: String,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: i32,
}

/// A message accepted from a client but not yet written. The store assigns
/// `id`, `created_at` and `time`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub conversation_id: ConversationId,
    pub user_id: UserId,
    pub user_name: String,
    pub text: String,
    pub kind: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: ConversationId,
    pub owner_id: UserId,
    pub name: String,
}
