//! Presence broadcast: every change to the registry pushes the full user list
//! to every live connection. No diffs, no debouncing.

use crate::chat::registry::Registry;
use crate::ws::broadcast::broadcast_to_all;
use crate::ws::protocol::ServerMessage;
use crate::ws::ConnectionMap;

/// Snapshot of who is online, as sent on the wire.
pub fn user_list_event(registry: &Registry) -> ServerMessage {
    ServerMessage::UserList(registry.list_usernames())
}

/// Push the current user list to all connections.
pub fn broadcast_user_list(registry: &Registry, connections: &ConnectionMap) {
    let event = user_list_event(registry);
    tracing::debug!(
        online = registry.len(),
        recipients = connections.len(),
        "Broadcasting user list"
    );
    broadcast_to_all(connections, &event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::ConnectionId;
    use axum::extract::ws::Message;
    use tokio::sync::mpsc;

    #[test]
    fn test_broadcast_reaches_unregistered_connections() {
        let mut registry = Registry::new();
        let mut connections = ConnectionMap::new();

        let registered = ConnectionId::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel::<Message>();
        let (tx2, mut rx2) = mpsc::unbounded_channel::<Message>();
        connections.insert(registered, tx1);
        connections.insert(ConnectionId::new(), tx2);
        registry.register(registered, "alice");

        broadcast_user_list(&registry, &connections);

        for rx in [&mut rx1, &mut rx2] {
            match rx.try_recv() {
                Ok(Message::Text(text)) => {
                    let msg: ServerMessage = serde_json::from_str(text.as_str()).unwrap();
                    assert_eq!(msg, ServerMessage::UserList(vec!["alice".to_string()]));
                }
                other => panic!("Expected user list, got: {:?}", other),
            }
            assert!(rx.try_recv().is_err());
        }
    }

    #[test]
    fn test_user_list_event_empty_registry() {
        assert_eq!(
            user_list_event(&Registry::new()),
            ServerMessage::UserList(vec![])
        );
    }
}
