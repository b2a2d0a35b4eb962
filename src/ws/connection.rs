//! WebSocket connection state machine.
//!
//! Handles the read/write loop for a single WebSocket connection,
//! dispatching incoming commands and forwarding filtered events.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;

use super::messages::{WsCommand, WsMessage, WsMessageType};
use super::subscription::SubscriptionManager;
use crate::domain::{EventId, LedgerEvent, MemberId};
use crate::service::BalanceProjector;

/// Runs the read/write loop for a single WebSocket connection.
///
/// - Reads commands from the client and dispatches them.
/// - Forwards matching events from the [`broadcast::Receiver`] to the client.
pub async fn run_connection(
    socket: WebSocket,
    mut event_rx: broadcast::Receiver<LedgerEvent>,
    projector: Arc<BalanceProjector>,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut subs = SubscriptionManager::new();

    loop {
        tokio::select! {
            // Incoming message from client
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let response = handle_text_message(&text, &mut subs, &projector).await;
                        if let Some(resp_json) = response
                            && ws_tx.send(Message::text(resp_json)).await.is_err() {
                                break;
                            }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    _ => {}
                }
            }
            // Event from EventBus
            event = event_rx.recv() => {
                match event {
                    Ok(ledger_event) => {
                        if subs.matches(&ledger_event) {
                            let msg = WsMessage {
                                id: uuid::Uuid::new_v4().to_string(),
                                msg_type: WsMessageType::Event,
                                timestamp: chrono::Utc::now(),
                                payload: serde_json::to_value(&ledger_event).unwrap_or_default(),
                            };
                            let json = serde_json::to_string(&msg).unwrap_or_default();
                            if ws_tx.send(Message::text(json)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(lagged = n, "ws client lagged behind event bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    tracing::debug!("ws connection closed");
}

/// Handles a text message from the client, returning an optional JSON response.
async fn handle_text_message(
    text: &str,
    subs: &mut SubscriptionManager,
    projector: &BalanceProjector,
) -> Option<String> {
    let Ok(msg) = serde_json::from_str::<WsMessage>(text) else {
        let err = WsMessage {
            id: String::new(),
            msg_type: WsMessageType::Error,
            timestamp: chrono::Utc::now(),
            payload: serde_json::json!({
                "code": 400,
                "message": "malformed JSON"
            }),
        };
        return serde_json::to_string(&err).ok();
    };

    let Ok(command) = serde_json::from_value::<WsCommand>(msg.payload.clone()) else {
        let err = WsMessage {
            id: msg.id,
            msg_type: WsMessageType::Error,
            timestamp: chrono::Utc::now(),
            payload: serde_json::json!({
                "code": 404,
                "message": "unknown command"
            }),
        };
        return serde_json::to_string(&err).ok();
    };

    let response = match command {
        WsCommand::Subscribe {
            member_ids,
            event_ids,
        } => {
            let (member_uuids, member_wildcard) = parse_id_list(&member_ids);
            let (event_uuids, event_wildcard) = parse_id_list(&event_ids);
            let members: Vec<MemberId> =
                member_uuids.into_iter().map(MemberId::from_uuid).collect();
            let events: Vec<EventId> = event_uuids.into_iter().map(EventId::from_uuid).collect();
            subs.subscribe(&members, &events, member_wildcard || event_wildcard);
            WsMessage {
                id: msg.id,
                msg_type: WsMessageType::Response,
                timestamp: chrono::Utc::now(),
                payload: serde_json::json!({
                    "subscribed_members": members.iter().map(ToString::to_string).collect::<Vec<_>>(),
                    "subscribed_events": events.iter().map(ToString::to_string).collect::<Vec<_>>(),
                    "count": subs.count(),
                    "wildcard": subs.is_subscribed_all(),
                }),
            }
        }
        WsCommand::Unsubscribe {
            member_ids,
            event_ids,
        } => {
            let (member_uuids, _) = parse_id_list(&member_ids);
            let (event_uuids, _) = parse_id_list(&event_ids);
            let members: Vec<MemberId> =
                member_uuids.into_iter().map(MemberId::from_uuid).collect();
            let events: Vec<EventId> = event_uuids.into_iter().map(EventId::from_uuid).collect();
            subs.unsubscribe(&members, &events);
            WsMessage {
                id: msg.id,
                msg_type: WsMessageType::Response,
                timestamp: chrono::Utc::now(),
                payload: serde_json::json!({
                    "remaining_count": subs.count(),
                }),
            }
        }
        WsCommand::GetBalance { member_id } => {
            let Ok(uuid) = member_id.parse::<uuid::Uuid>() else {
                let err = WsMessage {
                    id: msg.id,
                    msg_type: WsMessageType::Error,
                    timestamp: chrono::Utc::now(),
                    payload: serde_json::json!({
                        "code": 400,
                        "message": "invalid member id"
                    }),
                };
                return serde_json::to_string(&err).ok();
            };
            match projector.balance_of(MemberId::from_uuid(uuid)).await {
                Ok(balance) => WsMessage {
                    id: msg.id,
                    msg_type: WsMessageType::Response,
                    timestamp: chrono::Utc::now(),
                    payload: serde_json::to_value(balance).unwrap_or_default(),
                },
                Err(err) => WsMessage {
                    id: msg.id,
                    msg_type: WsMessageType::Error,
                    timestamp: chrono::Utc::now(),
                    payload: serde_json::json!({
                        "code": err.error_code(),
                        "message": err.to_string(),
                    }),
                },
            }
        }
    };
    serde_json::to_string(&response).ok()
}

/// Splits raw ID strings into parsed UUIDs and a wildcard flag.
///
/// Unparseable IDs are dropped silently; a lone `"*"` turns the whole
/// subscription into a wildcard.
fn parse_id_list(raw: &[String]) -> (Vec<uuid::Uuid>, bool) {
    let mut ids = Vec::new();
    let mut wildcard = false;
    for s in raw {
        if s == "*" {
            wildcard = true;
        } else if let Ok(uuid) = s.parse::<uuid::Uuid>() {
            ids.push(uuid);
        }
    }
    (ids, wildcard)
}
