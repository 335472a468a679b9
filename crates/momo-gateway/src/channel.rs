use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, warn};

use momo_types::ConversationId;
use momo_types::models::{Message, NewMessage};

use crate::error::GatewayError;
use crate::registry::{ConnectionRegistry, Outbound};
use crate::store::MessageStore;

/// Outcome of delivering one message to a conversation's subscribers.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FanOut {
    /// Subscribers in the snapshot.
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
}

/// Replay and fan-out for a single conversation.
#[derive(Clone)]
pub struct ConversationChannel<S> {
    conversation_id: ConversationId,
    store: S,
    registry: ConnectionRegistry,
}

impl<S: MessageStore> ConversationChannel<S> {
    pub fn new(conversation_id: ConversationId, store: S, registry: ConnectionRegistry) -> Self {
        Self {
            conversation_id,
            store,
            registry,
        }
    }

    pub fn id(&self) -> ConversationId {
        self.conversation_id
    }

    /// Persisted history, oldest first, for a joining subscriber.
    pub async fn history(&self) -> Result<Vec<Message>, GatewayError> {
        self.store.list_messages(self.conversation_id).await
    }

    /// Persist, then broadcast. Nothing is broadcast if the write fails.
    pub async fn publish(&self, draft: NewMessage) -> Result<(Message, FanOut), GatewayError> {
        let stored = self.store.append_message(draft).await?;
        let fan_out = self.fan_out(&stored);
        Ok((stored, fan_out))
    }

    /// Queue `msg` on every current subscriber, the author included.
    ///
    /// Each enqueue is non-blocking and independent. A subscriber whose queue
    /// is full is told to disconnect; a closed queue just counts as failed.
    pub fn fan_out(&self, msg: &Message) -> FanOut {
        let item = match Outbound::message(msg) {
            Ok(item) => item,
            Err(e) => {
                error!("Failed to encode message {}: {}", msg.id, e);
                return FanOut::default();
            }
        };

        let subscribers = self.registry.snapshot(self.conversation_id);
        let mut report = FanOut {
            attempted: subscribers.len(),
            ..FanOut::default()
        };

        for subscriber in &subscribers {
            match subscriber.deliver(item.clone()) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(
                        "Outbound queue full for user {} (conn {}) in conversation {}, disconnecting",
                        subscriber.user_id(),
                        subscriber.id(),
                        self.conversation_id
                    );
                    subscriber.disconnect();
                    report.failed += 1;
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(
                        "Subscriber {} left conversation {} before message {} was queued",
                        subscriber.id(),
                        self.conversation_id,
                        msg.id
                    );
                    report.failed += 1;
                }
            }
        }

        report
    }
}
