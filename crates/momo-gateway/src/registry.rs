use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use axum::extract::ws::{Message as WsMessage, Utf8Bytes};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use momo_types::models::Message;
use momo_types::{ConversationId, UserId};

pub type ConnectionId = Uuid;

/// One item in a connection's outbound queue.
#[derive(Debug, Clone)]
pub enum Outbound {
    /// A persisted message, serialized once per fan-out and shared by every
    /// subscriber.
    Message { id: i64, frame: Utf8Bytes },
    /// An error meant for this connection only.
    Error(Utf8Bytes),
}

impl Outbound {
    pub fn message(msg: &Message) -> Result<Self, serde_json::Error> {
        let json = serde_json::to_string(msg)?;
        Ok(Self::Message {
            id: msg.id,
            frame: json.into(),
        })
    }

    pub fn error(text: &str) -> Self {
        Self::Error(serde_json::json!({ "error": text }).to_string().into())
    }

    pub fn into_ws(self) -> WsMessage {
        match self {
            Self::Message { frame, .. } | Self::Error(frame) => WsMessage::Text(frame),
        }
    }
}

/// Handle to one live connection: where to queue its frames and how to make
/// it hang up. Cheap to clone; the registry hands out clones in snapshots.
#[derive(Debug, Clone)]
pub struct Subscriber {
    id: ConnectionId,
    user_id: UserId,
    tx: mpsc::Sender<Outbound>,
    closer: CancellationToken,
}

impl Subscriber {
    /// New handle with a bounded outbound queue. The receiver belongs to the
    /// connection's writer.
    pub fn new(user_id: UserId, capacity: usize) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let subscriber = Self {
            id: Uuid::new_v4(),
            user_id,
            tx,
            closer: CancellationToken::new(),
        };
        (subscriber, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Queue a frame without waiting.
    pub fn deliver(&self, item: Outbound) -> Result<(), TrySendError<Outbound>> {
        self.tx.try_send(item)
    }

    /// Ask the owning session to shut down.
    pub fn disconnect(&self) {
        self.closer.cancel();
    }

    pub fn close_signal(&self) -> &CancellationToken {
        &self.closer
    }
}

type Subscribers = HashMap<ConnectionId, Subscriber>;

/// Which connections are subscribed to which conversation.
///
/// Register/deregister take the write lock, snapshots the read lock. Every
/// critical section is a single map operation plus clones; nothing awaits
/// or does I/O while holding the lock.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<HashMap<ConversationId, Subscribers>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a connection. The returned guard deregisters it when dropped.
    ///
    /// Registering a handle that is already present leaves the set unchanged.
    pub fn register(&self, conversation_id: ConversationId, subscriber: Subscriber) -> Subscription {
        let connection_id = subscriber.id();
        self.write()
            .entry(conversation_id)
            .or_default()
            .insert(connection_id, subscriber);

        Subscription {
            registry: self.clone(),
            conversation_id,
            connection_id,
            active: true,
        }
    }

    /// Remove a connection. Drops the conversation entry once its last
    /// subscriber is gone. Returns whether anything was removed.
    pub fn deregister(&self, conversation_id: ConversationId, connection_id: ConnectionId) -> bool {
        let mut conversations = self.write();
        let Some(subscribers) = conversations.get_mut(&conversation_id) else {
            return false;
        };

        let removed = subscribers.remove(&connection_id).is_some();
        if subscribers.is_empty() {
            conversations.remove(&conversation_id);
        }
        removed
    }

    /// Copy of the current subscribers. May be stale as soon as it returns.
    pub fn snapshot(&self, conversation_id: ConversationId) -> Vec<Subscriber> {
        self.read()
            .get(&conversation_id)
            .map(|subscribers| subscribers.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn subscriber_count(&self, conversation_id: ConversationId) -> usize {
        self.read().get(&conversation_id).map_or(0, HashMap::len)
    }

    /// Number of conversations with at least one subscriber.
    pub fn conversation_count(&self) -> usize {
        self.read().len()
    }

    // Poisoning can only interrupt a single insert/remove, which leaves the
    // map valid, so the guard is recovered instead of propagating the panic.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<ConversationId, Subscribers>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ConversationId, Subscribers>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Registration guard. Deregisters exactly once: on [`Subscription::close`]
/// or on drop, whichever comes first.
pub struct Subscription {
    registry: ConnectionRegistry,
    conversation_id: ConversationId,
    connection_id: ConnectionId,
    active: bool,
}

impl Subscription {
    pub fn conversation_id(&self) -> ConversationId {
        self.conversation_id
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if std::mem::take(&mut self.active) {
            self.registry.deregister(self.conversation_id, self.connection_id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}
