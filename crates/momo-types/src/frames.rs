use serde::{Deserialize, Serialize};

use crate::ConversationId;

/// Frame sent FROM client TO server on a message stream.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    pub text: String,
    #[serde(default, rename = "type")]
    pub kind: i32,
}

/// Error frame sent to a single client. Shared by the message and
/// discovery streams.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorFrame {
    pub error: String,
}

/// Discovery request: which conversation do I share with this user?
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryRequest {
    #[serde(alias = "target_id")]
    pub target_user_id: i64,
}

/// Discovery response, either the resolved id or an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DiscoveryReply {
    Resolved { conversation_id: ConversationId },
    Error { error: String },
}

impl DiscoveryReply {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }
}
