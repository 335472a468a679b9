#![allow(dead_code)]

use std::collections::HashMap;
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::Message as WsMessage;
use chrono::Utc;
use futures_util::Stream;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::PollSender;

use momo_gateway::{
    ConnectionRegistry, GatewayError, MessageStore, SessionConfig, SessionContext, SessionReport,
    run_session,
};
use momo_types::models::{Message, NewMessage};
use momo_types::{ConversationId, UserId};

pub const TIMEOUT: Duration = Duration::from_secs(2);

/// In-memory store with switchable failures.
#[derive(Clone, Default)]
pub struct FakeStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    messages: Vec<Message>,
    users: HashMap<UserId, String>,
    next_id: i64,
    fail_appends: bool,
    fail_lists: bool,
    list_gate: Option<Arc<Notify>>,
}

impl FakeStore {
    pub fn with_users(users: &[(UserId, &str)]) -> Self {
        let store = Self::default();
        {
            let mut inner = store.inner.lock().unwrap();
            for (id, name) in users {
                inner.users.insert(*id, name.to_string());
            }
        }
        store
    }

    pub fn seed(&self, conversation_id: ConversationId, user_id: UserId, text: &str) -> Message {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let msg = Message {
            id: inner.next_id,
            conversation_id,
            user_id,
            user_name: inner.users.get(&user_id).cloned().unwrap_or_default(),
            created_at: Utc::now(),
            time: "2026-01-01 00:00:00".into(),
            text: text.into(),
            kind: 0,
        };
        inner.messages.push(msg.clone());
        msg
    }

    pub fn messages(&self, conversation_id: ConversationId) -> Vec<Message> {
        let inner = self.inner.lock().unwrap();
        inner
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect()
    }

    pub fn fail_appends(&self, fail: bool) {
        self.inner.lock().unwrap().fail_appends = fail;
    }

    pub fn fail_lists(&self, fail: bool) {
        self.inner.lock().unwrap().fail_lists = fail;
    }

    /// Make `list_messages` wait until the returned notify fires.
    pub fn gate_lists(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.inner.lock().unwrap().list_gate = Some(gate.clone());
        gate
    }
}

impl MessageStore for FakeStore {
    async fn append_message(&self, msg: NewMessage) -> Result<Message, GatewayError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_appends {
            return Err(GatewayError::Storage(anyhow::anyhow!("disk full")));
        }
        inner.next_id += 1;
        let stored = Message {
            id: inner.next_id,
            conversation_id: msg.conversation_id,
            user_id: msg.user_id,
            user_name: msg.user_name,
            created_at: Utc::now(),
            time: "2026-01-01 00:00:00".into(),
            text: msg.text,
            kind: msg.kind,
        };
        inner.messages.push(stored.clone());
        Ok(stored)
    }

    async fn list_messages(&self, conversation_id: ConversationId) -> Result<Vec<Message>, GatewayError> {
        let gate = self.inner.lock().unwrap().list_gate.take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.inner.lock().unwrap().fail_lists {
            return Err(GatewayError::Storage(anyhow::anyhow!("connection reset")));
        }
        Ok(self.messages(conversation_id))
    }

    async fn resolve_display_name(&self, user_id: UserId) -> Result<String, GatewayError> {
        self.inner
            .lock()
            .unwrap()
            .users
            .get(&user_id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("user {} not found", user_id)))
    }

    async fn user_exists(&self, user_id: UserId) -> Result<bool, GatewayError> {
        Ok(self.inner.lock().unwrap().users.contains_key(&user_id))
    }
}

pub type Inbound = Pin<Box<dyn Stream<Item = Result<WsMessage, Infallible>> + Send>>;

/// Client side of an in-process stream: what the test sends in, what the
/// server writes out.
pub struct Pipe {
    pub inbound_tx: mpsc::Sender<Result<WsMessage, Infallible>>,
    pub outbound_rx: mpsc::Receiver<WsMessage>,
}

/// Returns the server-side halves and the test-side `Pipe`.
pub fn pipe(outbound_capacity: usize) -> (Inbound, PollSender<WsMessage>, Pipe) {
    let (inbound_tx, inbound_rx) = mpsc::channel(16);
    let (outbound_tx, outbound_rx) = mpsc::channel(outbound_capacity);

    let inbound: Inbound = Box::pin(futures_util::stream::unfold(inbound_rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    }));

    (
        inbound,
        PollSender::new(outbound_tx),
        Pipe {
            inbound_tx,
            outbound_rx,
        },
    )
}

impl Pipe {
    pub async fn send_text(&self, text: &str) {
        self.inbound_tx
            .send(Ok(WsMessage::Text(text.to_string().into())))
            .await
            .unwrap();
    }

    /// Next text frame as JSON, skipping heartbeat pings.
    pub async fn recv_json(&mut self) -> serde_json::Value {
        loop {
            let frame = tokio::time::timeout(TIMEOUT, self.outbound_rx.recv())
                .await
                .expect("timed out waiting for a frame")
                .expect("stream closed");
            if let WsMessage::Text(text) = frame {
                return serde_json::from_str(text.as_str()).unwrap();
            }
        }
    }

    /// Every remaining text frame until the server closes the stream.
    pub async fn drain_json(&mut self) -> Vec<serde_json::Value> {
        drain_json(&mut self.outbound_rx).await
    }
}

async fn drain_json(rx: &mut mpsc::Receiver<WsMessage>) -> Vec<serde_json::Value> {
    let mut frames = Vec::new();
    while let Ok(Some(frame)) = tokio::time::timeout(TIMEOUT, rx.recv()).await {
        if let WsMessage::Text(text) = frame {
            frames.push(serde_json::from_str(text.as_str()).unwrap());
        }
    }
    frames
}

/// A running session plus its test-side pipe.
pub struct Client {
    pub pipe: Pipe,
    pub handle: JoinHandle<SessionReport>,
}

impl Client {
    pub fn connect(
        store: &FakeStore,
        registry: &ConnectionRegistry,
        conversation_id: ConversationId,
        user_id: UserId,
    ) -> Self {
        Self::connect_with(store, registry, conversation_id, user_id, SessionConfig::default(), 64)
    }

    pub fn connect_with(
        store: &FakeStore,
        registry: &ConnectionRegistry,
        conversation_id: ConversationId,
        user_id: UserId,
        config: SessionConfig,
        socket_capacity: usize,
    ) -> Self {
        let (inbound, outbound, pipe) = pipe(socket_capacity);
        let ctx = SessionContext {
            conversation_id,
            user_id,
            store: store.clone(),
            registry: registry.clone(),
            config,
        };
        let handle = tokio::spawn(run_session(ctx, inbound, outbound));
        Self { pipe, handle }
    }

    /// End the inbound stream and collect whatever the server still wrote.
    pub async fn close(self) -> (SessionReport, Vec<serde_json::Value>) {
        let Client { pipe, handle } = self;
        let Pipe {
            inbound_tx,
            mut outbound_rx,
        } = pipe;
        drop(inbound_tx);
        let report = tokio::time::timeout(TIMEOUT, handle)
            .await
            .expect("session did not finish")
            .unwrap();
        let frames = drain_json(&mut outbound_rx).await;
        (report, frames)
    }
}

/// Wait until `n` connections are registered on `conversation_id`.
pub async fn wait_for_subscribers(registry: &ConnectionRegistry, conversation_id: ConversationId, n: usize) {
    tokio::time::timeout(TIMEOUT, async {
        while registry.subscriber_count(conversation_id) != n {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("subscribers never registered");
}
