//! WebSocket upgrade handlers for the message and discovery streams.

use axum::{
    Extension, Json,
    extract::{
        Query, State,
        ws::{WebSocket, WebSocketUpgrade, rejection::WebSocketUpgradeRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::StreamExt;
use serde::Deserialize;
use tracing::{debug, info};

use momo_gateway::{SessionContext, parse_conversation_id, run_discovery, run_session};
use momo_types::api::Claims;
use momo_types::frames::ErrorFrame;
use momo_types::{ConversationId, UserId};

use crate::auth::AppState;

#[derive(Debug, Deserialize)]
pub struct MessageStreamQuery {
    pub conv_id: Option<String>,
}

/// `GET /api/v1/ws/message?conv_id=N`. The conversation id is checked before
/// the upgrade so a bad id gets a plain 400.
pub async fn message_stream(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<MessageStreamQuery>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let conversation_id = match parse_conversation_id(query.conv_id.as_deref()) {
        Ok(id) => id,
        Err(e) => {
            debug!("User {} rejected before upgrade: {}", claims.sub, e);
            let frame = ErrorFrame {
                error: e.client_message(),
            };
            return (StatusCode::BAD_REQUEST, Json(frame)).into_response();
        }
    };

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    ws.on_upgrade(move |socket| handle_message_socket(socket, state, claims.sub, conversation_id))
}

async fn handle_message_socket(
    socket: WebSocket,
    state: AppState,
    user_id: UserId,
    conversation_id: ConversationId,
) {
    let (sink, stream) = socket.split();
    let ctx = SessionContext {
        conversation_id,
        user_id,
        store: state.store(),
        registry: state.registry.clone(),
        config: state.session,
    };

    let report = run_session(ctx, stream, sink).await;
    info!(
        "User {} left conversation {} ({:?}): replayed {}, accepted {}, rejected {}",
        report.user_id,
        report.conversation_id,
        report.exit,
        report.replayed,
        report.accepted,
        report.rejected
    );
}

/// `GET /api/v1/ws/convid`.
pub async fn discovery_stream(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        let user_id = claims.sub;
        let (sink, stream) = socket.split();
        let answered = run_discovery(user_id, state.store(), stream, sink).await;
        info!("User {} closed conversation discovery after {} lookups", user_id, answered);
    })
}
