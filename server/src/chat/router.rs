//! Point-to-point routing of direct messages by username.
//!
//! `route` is pure: given the registry and a send request it decides where the
//! message goes. The relay performs the actual sends.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chat::registry::Registry;
use crate::ws::protocol::{DeliveredMessage, SendRequest, ServerMessage};
use crate::ws::ConnectionId;

/// The only user-visible failure of a send.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("User \"{username}\" is not online")]
    RecipientUnavailable { username: String },
}

/// How the `from` field of a send request is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderIdentity {
    /// Replace `from` with the sender's registered username, when it has one
    #[default]
    Bound,
    /// Relay `from` exactly as the client sent it
    Claimed,
}

/// A resolved send: the recipient's connection and the payload both sides get.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub recipient: ConnectionId,
    pub message: DeliveredMessage,
}

impl Delivery {
    /// Frame for the recipient.
    pub fn receive_event(&self) -> ServerMessage {
        ServerMessage::ReceiveMessage(self.message.clone())
    }

    /// Confirmation frame for the sender.
    pub fn sent_event(&self) -> ServerMessage {
        ServerMessage::MessageSent(self.message.clone())
    }
}

/// Resolve `request.to` and build the delivery, or report the recipient offline.
pub fn route(
    registry: &Registry,
    sender: ConnectionId,
    request: SendRequest,
    timestamp: String,
    sender_identity: SenderIdentity,
) -> Result<Delivery, RouteError> {
    let recipient = registry
        .find_connection_by_username(&request.to)
        .ok_or_else(|| RouteError::RecipientUnavailable {
            username: request.to.clone(),
        })?;

    let from = match (sender_identity, registry.username_of(&sender)) {
        (SenderIdentity::Bound, Some(registered)) => registered.to_string(),
        _ => request.from,
    };

    Ok(Delivery {
        recipient,
        message: DeliveredMessage {
            from,
            to: request.to,
            message: request.message,
            timestamp,
        },
    })
}

/// Human-readable server-local time of day, e.g. `3:04:05 PM`.
pub fn dispatch_timestamp() -> String {
    chrono::Local::now().format("%-I:%M:%S %p").to_string()
}
