//! WebSocket Gateway
//!
//! Real-time presence, typing indicators and message delivery.
//!
//! Each connection runs one receive loop, so its client events are handled
//! to completion in arrival order. Outbound events go through a bounded
//! queue drained by a dedicated sender task.

mod events;
mod fanout;
pub mod relay;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};
use uuid::Uuid;

pub use events::{ClientEvent, ServerEvent};
pub use fanout::Fanout;

use crate::{api::AppState, auth::jwt, presence::ConnectionHandle};

/// WebSocket connection query params.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// JWT access token for authentication
    pub token: String,
}

/// WebSocket upgrade handler.
pub async fn handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
) -> Response {
    // Validate token before upgrade
    let Ok(claims) = jwt::validate_access_token(&query.token, &state.config.jwt_secret) else {
        return (StatusCode::UNAUTHORIZED, "Invalid token").into_response();
    };

    let Ok(user_id) = Uuid::parse_str(&claims.sub) else {
        return (StatusCode::UNAUTHORIZED, "Invalid user ID in token").into_response();
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, user_id))
}

/// Handle WebSocket connection.
async fn handle_socket(socket: WebSocket, state: AppState, user_id: Uuid) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Channel for sending events to the WebSocket
    let (tx, mut rx) = mpsc::channel::<ServerEvent>(state.config.ws_outbound_buffer);
    let handle = ConnectionHandle::new(user_id, tx);

    // Spawn task to forward events to WebSocket
    let sender_handle = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    error!(error = %e, event = event.name(), "Failed to serialize event");
                    continue;
                }
            };

            if ws_sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let mut session = state.fanout.connect(handle.clone()).await;

    // Handle incoming messages
    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientEvent>(text.as_str()) {
                Ok(event) => state.fanout.dispatch(&handle, &mut session, event).await,
                Err(e) => {
                    warn!(user_id = %user_id, error = %e, "Malformed client event");
                    handle.send(ServerEvent::Error {
                        code: "invalid_event".to_string(),
                        message: e.to_string(),
                    });
                }
            },
            Ok(Message::Ping(_)) => {
                // Axum answers pings
                debug!(user_id = %user_id, "Received ping");
            }
            Ok(Message::Close(_)) => break,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "WebSocket error");
                break;
            }
            _ => {}
        }
    }

    // Cleanup
    state.fanout.disconnect(&mut session).await;
    sender_handle.abort();
}
