use std::fmt::Display;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::Message as WsMessage;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use momo_types::frames::InboundMessage;
use momo_types::models::{Message, NewMessage};
use momo_types::{ConversationId, UserId};

use crate::channel::ConversationChannel;
use crate::conversation::pair_members;
use crate::error::GatewayError;
use crate::registry::{ConnectionRegistry, Outbound, Subscriber};
use crate::store::MessageStore;

pub const DEFAULT_OUTBOUND_CAPACITY: usize = 256;

/// Server sends a Ping this often. Two intervals without a Pong drop the
/// connection.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);
const MAX_MISSED_HEARTBEATS: u8 = 2;

/// How long a closing session waits for already-queued frames to flush.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub outbound_capacity: usize,
    pub heartbeat_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }
}

/// Lifecycle of one message stream. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    Connecting,
    Subscribed,
    Draining,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Client sent a Close frame.
    ClientClosed,
    /// Inbound stream ended without a Close frame.
    StreamEnded,
    ReadError,
    /// Outbound writer stopped: send failure or heartbeat timeout.
    WriterStopped,
    /// Disconnected by the server, e.g. outbound queue overflow.
    Disconnected,
}

/// Everything a session needs besides its socket.
pub struct SessionContext<S> {
    pub conversation_id: ConversationId,
    pub user_id: UserId,
    pub store: S,
    pub registry: ConnectionRegistry,
    pub config: SessionConfig,
}

/// Summary returned when a session ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub conversation_id: ConversationId,
    pub user_id: UserId,
    pub state: SessionState,
    pub exit: Option<ExitReason>,
    pub replayed: usize,
    pub accepted: usize,
    pub rejected: usize,
}

impl SessionReport {
    fn new(conversation_id: ConversationId, user_id: UserId) -> Self {
        Self {
            conversation_id,
            user_id,
            state: SessionState::Connecting,
            exit: None,
            replayed: 0,
            accepted: 0,
            rejected: 0,
        }
    }

    fn advance(&mut self, next: SessionState) {
        debug_assert!(next > self.state, "session state went {:?} -> {:?}", self.state, next);
        trace!(
            "User {} conversation {}: {:?} -> {:?}",
            self.user_id, self.conversation_id, self.state, next
        );
        self.state = next;
    }
}

/// Run one message stream to completion.
///
/// Registers the connection, replays history straight to `outbound`, then
/// starts the outbound writer and reads `inbound` until the client goes away.
/// Live messages fanned out during replay wait in the connection's queue and
/// are written after the replay batch; any of them already covered by the
/// replay are skipped.
pub async fn run_session<S, R, E, W>(
    ctx: SessionContext<S>,
    mut inbound: R,
    mut outbound: W,
) -> SessionReport
where
    S: MessageStore,
    R: Stream<Item = Result<WsMessage, E>> + Unpin,
    E: Display,
    W: Sink<WsMessage> + Unpin + Send + 'static,
    W::Error: Display + Send,
{
    let SessionContext {
        conversation_id,
        user_id,
        store,
        registry,
        config,
    } = ctx;
    let mut report = SessionReport::new(conversation_id, user_id);

    let (subscriber, queue) = Subscriber::new(user_id, config.outbound_capacity);
    let closer = subscriber.close_signal().clone();
    let subscription = registry.register(conversation_id, subscriber.clone());
    report.advance(SessionState::Subscribed);

    match pair_members(conversation_id) {
        Some((a, b)) => info!(
            "User {} joined direct conversation {} ({} <-> {})",
            user_id, conversation_id, a, b
        ),
        None => info!("User {} joined conversation {}", user_id, conversation_id),
    }

    let channel = ConversationChannel::new(conversation_id, store.clone(), registry.clone());
    let replayed_through = replay(&channel, &mut outbound, &mut report).await;

    let pong_received = Arc::new(AtomicBool::new(true));
    let mut writer = tokio::spawn(write_outbound(
        outbound,
        queue,
        replayed_through,
        closer.clone(),
        pong_received.clone(),
        config.heartbeat_interval,
    ));

    let exit = loop {
        tokio::select! {
            _ = closer.cancelled() => break ExitReason::Disconnected,
            _ = &mut writer => break ExitReason::WriterStopped,
            frame = inbound.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    match accept(&channel, &store, user_id, text.as_str()).await {
                        Ok(msg) => {
                            report.accepted += 1;
                            trace!("User {} stored message {} in {}", user_id, msg.id, conversation_id);
                        }
                        Err(e) => {
                            report.rejected += 1;
                            reject(&subscriber, user_id, conversation_id, e);
                        }
                    }
                }
                Some(Ok(WsMessage::Pong(_))) => pong_received.store(true, Ordering::Release),
                Some(Ok(WsMessage::Close(_))) => break ExitReason::ClientClosed,
                Some(Ok(WsMessage::Binary(data))) => {
                    debug!("User {} sent {} byte binary frame, ignoring", user_id, data.len());
                }
                Some(Ok(WsMessage::Ping(_))) => {}
                Some(Err(e)) => {
                    debug!("User {} read error in conversation {}: {}", user_id, conversation_id, e);
                    break ExitReason::ReadError;
                }
                None => break ExitReason::StreamEnded,
            }
        }
    };

    report.advance(SessionState::Draining);
    report.exit = Some(exit);
    subscription.close();
    // Last long-lived sender: once it and the registry entry are gone the
    // writer sees the end of its queue after flushing what is left.
    drop(subscriber);

    match exit {
        ExitReason::WriterStopped => {}
        ExitReason::Disconnected => writer.abort(),
        _ => {
            if tokio::time::timeout(DRAIN_TIMEOUT, &mut writer).await.is_err() {
                warn!("User {} outbound writer did not drain in time, aborting", user_id);
                writer.abort();
            }
        }
    }

    report.advance(SessionState::Closed);
    info!(
        "User {} left conversation {} ({:?}; {} replayed, {} accepted, {} rejected)",
        user_id, conversation_id, exit, report.replayed, report.accepted, report.rejected
    );
    report
}

/// Write the persisted history to the client, oldest first. Returns the
/// highest message id in that history (0 if none or if it could not be read).
async fn replay<S, W>(
    channel: &ConversationChannel<S>,
    outbound: &mut W,
    report: &mut SessionReport,
) -> i64
where
    S: MessageStore,
    W: Sink<WsMessage> + Unpin,
    W::Error: Display,
{
    let history = match channel.history().await {
        Ok(history) => history,
        Err(e) => {
            warn!("History replay for conversation {} failed: {}", channel.id(), e);
            return 0;
        }
    };

    let replayed_through = history.iter().map(|m| m.id).max().unwrap_or(0);
    for msg in &history {
        let item = match Outbound::message(msg) {
            Ok(item) => item,
            Err(e) => {
                warn!("Skipping unencodable message {} in replay: {}", msg.id, e);
                continue;
            }
        };
        if let Err(e) = outbound.send(item.into_ws()).await {
            warn!("History replay for conversation {} interrupted: {}", channel.id(), e);
            break;
        }
        report.replayed += 1;
    }

    replayed_through
}

/// Validate one inbound text frame, persist it and fan it out.
async fn accept<S: MessageStore>(
    channel: &ConversationChannel<S>,
    store: &S,
    user_id: UserId,
    text: &str,
) -> Result<Message, GatewayError> {
    let inbound: InboundMessage = serde_json::from_str(text)
        .map_err(|e| GatewayError::validation(format!("invalid message format: {}", e)))?;

    if inbound.text.trim().is_empty() {
        return Err(GatewayError::validation("empty message content"));
    }

    // Best effort: an unknown name never blocks the message.
    let user_name = match store.resolve_display_name(user_id).await {
        Ok(name) => name,
        Err(e) => {
            warn!("Display name lookup for user {} failed: {}", user_id, e);
            String::new()
        }
    };

    let (stored, fan_out) = channel
        .publish(NewMessage {
            conversation_id: channel.id(),
            user_id,
            user_name,
            text: inbound.text,
            kind: inbound.kind,
        })
        .await?;

    debug!(
        "Message {} in conversation {} delivered to {}/{} subscribers",
        stored.id, stored.conversation_id, fan_out.delivered, fan_out.attempted
    );
    Ok(stored)
}

fn reject(subscriber: &Subscriber, user_id: UserId, conversation_id: ConversationId, e: GatewayError) {
    match e {
        GatewayError::Validation(_) => {
            warn!("User {} sent a rejected frame to {}: {}", user_id, conversation_id, e);
            if subscriber.deliver(Outbound::error(&e.client_message())).is_err() {
                debug!("Could not queue error frame for user {}", user_id);
            }
        }
        _ => warn!(
            "Message from user {} to {} not delivered: {}",
            user_id, conversation_id, e
        ),
    }
}

/// Drain the connection's outbound queue into the socket and keep the
/// heartbeat going. Stops on send failure, heartbeat timeout, disconnect, or
/// once every sender of the queue is gone.
async fn write_outbound<W>(
    mut sink: W,
    mut queue: mpsc::Receiver<Outbound>,
    replayed_through: i64,
    closer: CancellationToken,
    pong_received: Arc<AtomicBool>,
    heartbeat_interval: Duration,
) where
    W: Sink<WsMessage> + Unpin,
    W::Error: Display,
{
    let mut heartbeat = tokio::time::interval(heartbeat_interval);
    heartbeat.tick().await;
    let mut missed_heartbeats: u8 = 0;

    loop {
        tokio::select! {
            _ = closer.cancelled() => break,
            item = queue.recv() => {
                let Some(item) = item else { break };
                if let Outbound::Message { id, .. } = &item {
                    if *id <= replayed_through {
                        trace!("Message {} already replayed, skipping", id);
                        continue;
                    }
                }
                if let Err(e) = sink.send(item.into_ws()).await {
                    debug!("Outbound send failed: {}", e);
                    break;
                }
            }
            _ = heartbeat.tick() => {
                if pong_received.swap(false, Ordering::AcqRel) {
                    missed_heartbeats = 0;
                } else {
                    missed_heartbeats += 1;
                    if missed_heartbeats >= MAX_MISSED_HEARTBEATS {
                        warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                        break;
                    }
                }
                if sink.send(WsMessage::Ping(Default::default())).await.is_err() {
                    break;
                }
            }
        }
    }

    let _ = sink.close().await;
}
