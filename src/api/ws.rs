//! Realtime sockets for drivers and riders.
//!
//! Each socket registers a bounded outbound queue in the connection
//! registry. A writer task drains that queue to the peer with a send
//! timeout; the read loop forwards driver frames as location events.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    response::IntoResponse,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

use super::auth::user_from_token;
use super::error::ApiError;
use super::validation::validate_peer_key;
use crate::db::UserRole;
use crate::realtime::PeerRole;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct WsAuthQuery {
    token: Option<String>,
}

/// Enforce `realtime.require_token`: the token's role must match the socket
/// role, admins may open either.
async fn authorize(state: &AppState, role: PeerRole, query: &WsAuthQuery) -> Result<(), ApiError> {
    if !state.config.realtime.require_token {
        return Ok(());
    }

    let token = query
        .token
        .as_deref()
        .ok_or_else(|| ApiError::unauthorized("Missing token"))?;
    let user = user_from_token(state, token).await?;

    let allowed = match (role, user.role_enum()) {
        (_, UserRole::Admin) => true,
        (PeerRole::Driver, UserRole::Driver) => true,
        (PeerRole::Rider, UserRole::Rider) => true,
        _ => false,
    };
    if !allowed {
        return Err(ApiError::forbidden(format!("Token does not belong to a {}", role)));
    }
    Ok(())
}

/// GET /ws/driver/:driver_key
pub async fn driver_ws(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(driver_key): Path<String>,
    Query(query): Query<WsAuthQuery>,
) -> Result<impl IntoResponse, ApiError> {
    upgrade(ws, state, PeerRole::Driver, driver_key, query).await
}

/// GET /ws/rider/:rider_key
pub async fn rider_ws(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(rider_key): Path<String>,
    Query(query): Query<WsAuthQuery>,
) -> Result<impl IntoResponse, ApiError> {
    upgrade(ws, state, PeerRole::Rider, rider_key, query).await
}

async fn upgrade(
    ws: WebSocketUpgrade,
    state: Arc<AppState>,
    role: PeerRole,
    key: String,
    query: WsAuthQuery,
) -> Result<impl IntoResponse, ApiError> {
    validate_peer_key(&key).map_err(|e| ApiError::validation_field("key", e))?;
    authorize(&state, role, &query).await?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, role, key)))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, role: PeerRole, key: String) {
    let (sender, receiver) = socket.split();
    run_session(sender, receiver, state, role, key).await;
}

/// Drive one registered peer until either side goes away.
async fn run_session<S, R>(mut sender: S, mut receiver: R, state: Arc<AppState>, role: PeerRole, key: String)
where
    S: Sink<Message> + Unpin + Send + 'static,
    S::Error: std::fmt::Display,
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let (conn_id, mut outbound) = state.registry.connect(role, &key);
    info!(%role, key = %key, conn_id, "Realtime peer connected");

    let send_timeout = Duration::from_millis(state.config.realtime.send_timeout_ms);
    let writer_key = key.clone();

    // Ends when the registry drops our sender (deregistered or replaced by
    // a newer socket for the same key) or when the peer stops reading.
    let mut writer = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            match timeout(send_timeout, sender.send(Message::Text(message.to_string()))).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    debug!(%role, key = %writer_key, "Realtime send failed: {}", e);
                    break;
                }
                Err(_) => {
                    warn!(%role, key = %writer_key, "Realtime send timed out, closing socket");
                    break;
                }
            }
        }
        let _ = sender.close().await;
    });

    loop {
        tokio::select! {
            _ = &mut writer => break,
            frame = receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if role == PeerRole::Driver {
                        state.broadcaster.driver_location(&key, &text);
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    debug!(%role, key = %key, "Realtime receive error: {}", e);
                    break;
                }
                // Pings are answered by the protocol layer; riders only keep
                // the socket alive.
                Some(Ok(_)) => {}
            }
        }
    }

    writer.abort();
    state.registry.deregister_connection(role, &key, conn_id);
    info!(%role, key = %key, conn_id, "Realtime peer disconnected");
}
