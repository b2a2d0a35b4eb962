//! WebSocket message types: envelope and client commands.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Top-level WebSocket message envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsMessage {
    /// Client-provided ID for requests; server-generated for events.
    pub id: String,
    /// Message type discriminator.
    #[serde(rename = "type")]
    pub msg_type: WsMessageType,
    /// ISO-8601 timestamp.
    pub timestamp: DateTime<Utc>,
    /// Variant-specific payload.
    pub payload: serde_json::Value,
}

/// Discriminator for WebSocket message types.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WsMessageType {
    /// Client → Server command.
    Command,
    /// Server → Client response to a command.
    Response,
    /// Server → Client broadcast event.
    Event,
    /// Server → Client error.
    Error,
}

/// Commands that a client can send over WebSocket.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum WsCommand {
    /// Subscribe to member- and event-scoped ledger events.
    Subscribe {
        /// Member IDs to follow. Use `["*"]` for everything.
        #[serde(default)]
        member_ids: Vec<String>,
        /// Event IDs to follow. Use `["*"]` for everything.
        #[serde(default)]
        event_ids: Vec<String>,
    },
    /// Drop previously subscribed member and event IDs.
    Unsubscribe {
        /// Member IDs to stop following.
        #[serde(default)]
        member_ids: Vec<String>,
        /// Event IDs to stop following.
        #[serde(default)]
        event_ids: Vec<String>,
    },
    /// Read a member's balance over the socket.
    GetBalance {
        /// Member to fold.
        member_id: String,
    },
}
