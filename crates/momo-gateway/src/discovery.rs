use std::fmt::Display;

use axum::extract::ws::Message as WsMessage;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tracing::{debug, info, warn};

use momo_types::frames::{DiscoveryReply, DiscoveryRequest};
use momo_types::{ConversationId, UserId};

use crate::conversation::pair_conversation_id;
use crate::error::GatewayError;
use crate::store::MessageStore;

/// Answer conversation-id lookups for `user_id` until the client leaves.
/// Bad requests get an error frame; the stream stays open. Returns the
/// number of requests answered.
pub async fn run_discovery<S, R, E, W>(
    user_id: UserId,
    store: S,
    mut inbound: R,
    mut outbound: W,
) -> usize
where
    S: MessageStore,
    R: Stream<Item = Result<WsMessage, E>> + Unpin,
    E: Display,
    W: Sink<WsMessage> + Unpin,
    W::Error: Display,
{
    info!("User {} opened conversation discovery", user_id);
    let mut answered = 0;

    while let Some(frame) = inbound.next().await {
        let text = match frame {
            Ok(WsMessage::Text(text)) => text,
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!("User {} discovery read error: {}", user_id, e);
                break;
            }
        };

        let reply = resolve_request(&store, user_id, text.as_str()).await;
        let json = match serde_json::to_string(&reply) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to encode discovery reply: {}", e);
                continue;
            }
        };
        if let Err(e) = outbound.send(WsMessage::Text(json.into())).await {
            debug!("User {} discovery send failed: {}", user_id, e);
            break;
        }
        answered += 1;
    }

    info!("User {} closed conversation discovery ({} requests)", user_id, answered);
    answered
}

/// Handle one raw request frame.
pub async fn resolve_request<S: MessageStore>(store: &S, user_id: UserId, text: &str) -> DiscoveryReply {
    match lookup(store, user_id, text).await {
        Ok(conversation_id) => DiscoveryReply::Resolved { conversation_id },
        Err(e) => {
            warn!("User {} discovery request rejected: {}", user_id, e);
            DiscoveryReply::error(e.client_message())
        }
    }
}

async fn lookup<S: MessageStore>(
    store: &S,
    user_id: UserId,
    text: &str,
) -> Result<ConversationId, GatewayError> {
    let request: DiscoveryRequest = serde_json::from_str(text)
        .map_err(|_| GatewayError::validation("invalid request format"))?;

    let target = request.target_user_id;
    if target <= 0 {
        return Err(GatewayError::validation("invalid target user id"));
    }
    if !store.user_exists(target).await? {
        return Err(GatewayError::NotFound(format!("user {} does not exist", target)));
    }

    pair_conversation_id(user_id, target)
}
