/// Live updates over WebSocket
///
/// ```text
/// GET /v1/ws?token=<jwt>
/// ```
///
/// Browsers cannot set headers on a WebSocket handshake, so the token may be
/// passed as `?token=`. A Bearer header works as well.
///
/// # Protocol
///
/// Client to server:
///
/// ```json
/// { "type": "subscribe", "entities": ["call", "dial_session"] }
/// { "type": "ping" }
/// ```
///
/// Server to client:
///
/// ```json
/// { "type": "change", "id": "...", "entity": "call", "action": "updated", ... }
/// { "type": "lagged", "skipped": 12 }
/// { "type": "pong" }
/// { "type": "error", "message": "..." }
/// ```
///
/// A connection receives every entity kind of its own tenant until it sends
/// a `subscribe`; an empty list restores the default.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::Response,
};
use dialdesk_shared::{
    auth::middleware::{authenticate, bearer_token, AuthContext},
    events::{ChangeEvent, EntityKind},
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tokio::sync::broadcast::{self, error::RecvError};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe { entities: Vec<EntityKind> },
    Ping,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Change(ChangeEvent),
    Lagged { skipped: u64 },
    Pong,
    Error { message: String },
}

/// Whether a connection of `tenant_id` with the given entity filter sees `event`
pub fn should_forward(
    event: &ChangeEvent,
    tenant_id: Uuid,
    entities: &Option<HashSet<EntityKind>>,
) -> bool {
    event.tenant_id == tenant_id
        && entities
            .as_ref()
            .map_or(true, |set| set.contains(&event.entity))
}

pub async fn ws_handler(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let token = match query.token.as_deref().filter(|t| !t.is_empty()) {
        Some(token) => token.to_string(),
        None => bearer_token(&headers)?.to_string(),
    };
    let auth = authenticate(&state.auth, &token).await?;

    let ws = ws.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    // Subscribe before the upgrade so nothing emitted in between is missed
    let rx = state.hub.subscribe();

    tracing::info!(
        tenant_id = %auth.tenant_id,
        user_id = %auth.user_id,
        "WebSocket connection opened"
    );

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, auth, rx)))
}

async fn send(
    sender: &mut futures::stream::SplitSink<WebSocket, Message>,
    message: &ServerMessage,
) -> Result<(), axum::Error> {
    match serde_json::to_string(message) {
        Ok(text) => sender.send(Message::Text(text)).await,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize WebSocket message");
            Ok(())
        }
    }
}

async fn handle_socket(
    socket: WebSocket,
    auth: AuthContext,
    mut rx: broadcast::Receiver<ChangeEvent>,
) {
    let (mut sender, mut receiver) = socket.split();
    let mut entities: Option<HashSet<EntityKind>> = None;

    loop {
        tokio::select! {
            event = rx.recv() => {
                let outgoing = match event {
                    Ok(event) if should_forward(&event, auth.tenant_id, &entities) => {
                        ServerMessage::Change(event)
                    }
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(tenant_id = %auth.tenant_id, skipped, "WebSocket client lagged");
                        ServerMessage::Lagged { skipped }
                    }
                    Err(RecvError::Closed) => break,
                };

                if send(&mut sender, &outgoing).await.is_err() {
                    break;
                }
            }

            incoming = receiver.next() => {
                let text = match incoming {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        tracing::debug!(error = %e, "WebSocket receive failed");
                        break;
                    }
                };

                let reply = match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(ClientMessage::Ping) => Some(ServerMessage::Pong),
                    Ok(ClientMessage::Subscribe { entities: kinds }) => {
                        entities = if kinds.is_empty() {
                            None
                        } else {
                            Some(kinds.into_iter().collect())
                        };
                        None
                    }
                    Err(e) => Some(ServerMessage::Error {
                        message: format!("Invalid message: {}", e),
                    }),
                };

                if let Some(reply) = reply {
                    if send(&mut sender, &reply).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    tracing::info!(
        tenant_id = %auth.tenant_id,
        user_id = %auth.user_id,
        "WebSocket connection closed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use dialdesk_shared::events::ChangeAction;
    use serde_json::json;

    fn event(tenant_id: Uuid, entity: EntityKind) -> ChangeEvent {
        ChangeEvent::new(
            "api-test",
            tenant_id,
            entity,
            ChangeAction::Updated,
            Uuid::new_v4(),
            json!({}),
        )
    }

    #[test]
    fn test_other_tenants_are_never_forwarded() {
        let mine = Uuid::new_v4();
        let theirs = Uuid::new_v4();

        assert!(should_forward(&event(mine, EntityKind::Call), mine, &None));
        assert!(!should_forward(&event(theirs, EntityKind::Call), mine, &None));

        let all: HashSet<EntityKind> = [EntityKind::Call].into_iter().collect();
        assert!(!should_forward(&event(theirs, EntityKind::Call), mine, &Some(all)));
    }

    #[test]
    fn test_entity_filter() {
        let tenant = Uuid::new_v4();
        let filter: HashSet<EntityKind> = [EntityKind::Call, EntityKind::DialSession]
            .into_iter()
            .collect();
        let filter = Some(filter);

        assert!(should_forward(&event(tenant, EntityKind::DialSession), tenant, &filter));
        assert!(!should_forward(&event(tenant, EntityKind::Contact), tenant, &filter));
    }

    #[test]
    fn test_client_messages() {
        assert_eq!(
            serde_json::from_str::<ClientMessage>(r#"{"type":"ping"}"#).unwrap(),
            ClientMessage::Ping
        );
        assert_eq!(
            serde_json::from_str::<ClientMessage>(
                r#"{"type":"subscribe","entities":["call","dial_session"]}"#
            )
            .unwrap(),
            ClientMessage::Subscribe {
                entities: vec![EntityKind::Call, EntityKind::DialSession]
            }
        );
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"subscribe","entities":["task"]}"#).is_err());
    }

    #[test]
    fn test_server_messages() {
        let tenant = Uuid::new_v4();
        let change = serde_json::to_value(ServerMessage::Change(event(tenant, EntityKind::Lead))).unwrap();
        assert_eq!(change["type"], "change");
        assert_eq!(change["entity"], "lead");
        assert_eq!(change["tenant_id"], tenant.to_string());

        assert_eq!(
            serde_json::to_value(ServerMessage::Lagged { skipped: 3 }).unwrap(),
            json!({"type": "lagged", "skipped": 3})
        );
        assert_eq!(
            serde_json::to_value(ServerMessage::Pong).unwrap(),
            json!({"type": "pong"})
        );
    }
}
