//! JSON wire format for the relay socket.
//!
//! Every frame is a text frame of the shape `{"event": <name>, "data": <payload>}`.
//! Connect and disconnect are not frames; they come from the socket lifecycle.

use axum::extract::ws::Message;
use serde::{Deserialize, Serialize};

use crate::chat::relay::{Relay, RelayEvent};
use crate::ws::ConnectionId;

/// Payload of an inbound `sendMessage` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendRequest {
    pub from: String,
    pub to: String,
    pub message: String,
}

/// Payload of both `receiveMessage` and `messageSent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveredMessage {
    pub from: String,
    pub to: String,
    pub message: String,
    /// Server-local wall clock at dispatch, e.g. `3:04:05 PM`
    pub timestamp: String,
}

/// Frames a client may send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientMessage {
    Register(String),
    SendMessage(SendRequest),
}

/// Frames the server sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Full list of registered usernames, pushed to everyone on every change
    UserList(Vec<String>),
    ReceiveMessage(DeliveredMessage),
    MessageSent(DeliveredMessage),
    Error(String),
}

pub fn decode_client_message(text: &str) -> Result<ClientMessage, serde_json::Error> {
    serde_json::from_str(text)
}

/// Encode a server frame as a WebSocket text message.
pub fn encode_server_message(message: &ServerMessage) -> Option<Message> {
    match serde_json::to_string(message) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to encode server message");
            None
        }
    }
}

/// Handle an incoming text frame: decode it and hand the event to the relay.
/// Frames that do not decode are logged and dropped.
pub fn handle_text_message(text: &str, connection_id: ConnectionId, relay: &Relay) {
    let client_message = match decode_client_message(text) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::warn!(
                connection_id = %connection_id,
                error = %e,
                "Failed to decode client frame"
            );
            return;
        }
    };

    let event = match client_message {
        ClientMessage::Register(username) => RelayEvent::Register { username },
        ClientMessage::SendMessage(request) => RelayEvent::Send(request),
    };
    relay.handle(connection_id, event);
}
