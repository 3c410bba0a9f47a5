//! The relay service: single writer over the registry and the set of live
//! connections.
//!
//! Each event runs to completion under one lock, so a broadcast always carries
//! the state as of its own mutation and a lookup never races a registration
//! or disconnect.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::chat::presence::broadcast_user_list;
use crate::chat::registry::Registry;
use crate::chat::router::{self, SenderIdentity};
use crate::ws::broadcast::send_to_connection;
use crate::ws::protocol::{SendRequest, ServerMessage};
use crate::ws::{ConnectionId, ConnectionMap, ConnectionSender};

/// Everything the transport can tell the relay about a connection.
#[derive(Debug)]
pub enum RelayEvent {
    Connect(ConnectionSender),
    Register { username: String },
    Send(SendRequest),
    Disconnect,
}

#[derive(Debug, Default)]
struct RelayState {
    registry: Registry,
    connections: ConnectionMap,
}

#[derive(Debug)]
pub struct Relay {
    state: Mutex<RelayState>,
    sender_identity: SenderIdentity,
}

impl Relay {
    pub fn new(sender_identity: SenderIdentity) -> Self {
        Self {
            state: Mutex::new(RelayState::default()),
            sender_identity,
        }
    }

    /// Apply one transport event for a connection.
    pub fn handle(&self, connection_id: ConnectionId, event: RelayEvent) {
        let mut guard = self.lock();
        let state = &mut *guard;

        match event {
            RelayEvent::Connect(tx) => {
                state.connections.insert(connection_id, tx);
                tracing::info!(connection_id = %connection_id, "New client connected");
            }
            RelayEvent::Register { username } => {
                let previous = state.registry.register(connection_id, username.clone());
                tracing::info!(
                    connection_id = %connection_id,
                    username = %username,
                    previous = ?previous,
                    "User registered"
                );
                broadcast_user_list(&state.registry, &state.connections);
            }
            RelayEvent::Send(request) => {
                self.send_message(state, connection_id, request);
            }
            RelayEvent::Disconnect => {
                state.connections.remove(&connection_id);
                let username = state.registry.unregister(&connection_id);
                tracing::info!(
                    connection_id = %connection_id,
                    username = ?username,
                    "User disconnected"
                );
                broadcast_user_list(&state.registry, &state.connections);
            }
        }
    }

    /// Usernames currently online, in registration order.
    pub fn online_usernames(&self) -> Vec<String> {
        self.lock().registry.list_usernames()
    }

    /// Number of live connections, registered or not.
    pub fn connection_count(&self) -> usize {
        self.lock().connections.len()
    }

    fn send_message(&self, state: &RelayState, sender: ConnectionId, request: SendRequest) {
        tracing::info!(
            connection_id = %sender,
            from = %request.from,
            to = %request.to,
            "Relaying message"
        );

        let routed = router::route(
            &state.registry,
            sender,
            request,
            router::dispatch_timestamp(),
            self.sender_identity,
        );

        match routed {
            Ok(delivery) => {
                send_to_connection(
                    &state.connections,
                    &delivery.recipient,
                    &delivery.receive_event(),
                );
                send_to_connection(&state.connections, &sender, &delivery.sent_event());
            }
            Err(err) => {
                tracing::debug!(connection_id = %sender, error = %err, "Message not delivered");
                let error = ServerMessage::Error(err.to_string());
                send_to_connection(&state.connections, &sender, &error);
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, RelayState> {
        // State stays consistent even if a holder panicked mid-send
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Relay {
    fn default() -> Self {
        Self::new(SenderIdentity::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::protocol::DeliveredMessage;
    use axum::extract::ws::Message;
    use tokio::sync::mpsc;

    struct TestClient {
        id: ConnectionId,
        rx: mpsc::UnboundedReceiver<Message>,
    }

    impl TestClient {
        fn connect(relay: &Relay) -> Self {
            let id = ConnectionId::new();
            let (tx, rx) = mpsc::unbounded_channel();
            relay.handle(id, RelayEvent::Connect(tx));
            Self { id, rx }
        }

        fn register(&self, relay: &Relay, username: &str) {
            relay.handle(
                self.id,
                RelayEvent::Register {
                    username: username.to_string(),
                },
            );
        }

        fn send(&self, relay: &Relay, from: &str, to: &str, message: &str) {
            relay.handle(
                self.id,
                RelayEvent::Send(SendRequest {
                    from: from.to_string(),
                    to: to.to_string(),
                    message: message.to_string(),
                }),
            );
        }

        fn disconnect(self, relay: &Relay) {
            relay.handle(self.id, RelayEvent::Disconnect);
        }

        fn drain(&mut self) -> Vec<ServerMessage> {
            let mut out = Vec::new();
            while let Ok(msg) = self.rx.try_recv() {
                match msg {
                    Message::Text(text) => {
                        out.push(serde_json::from_str(text.as_str()).unwrap());
                    }
                    other => panic!("Expected text frame, got: {:?}", other),
                }
            }
            out
        }
    }

    fn user_list(names: &[&str]) -> ServerMessage {
        ServerMessage::UserList(names.iter().map(|n| n.to_string()).collect())
    }

    #[test]
    fn test_connect_alone_sends_nothing() {
        let relay = Relay::default();
        let mut c1 = TestClient::connect(&relay);
        assert!(c1.drain().is_empty());
        assert_eq!(relay.connection_count(), 1);
        assert!(relay.online_usernames().is_empty());
    }

    #[test]
    fn test_scenario_register_send_disconnect() {
        let relay = Relay::default();

        let mut c1 = TestClient::connect(&relay);
        c1.register(&relay, "alice");
        assert_eq!(c1.drain(), vec![user_list(&["alice"])]);

        let mut c2 = TestClient::connect(&relay);
        c2.register(&relay, "bob");
        assert_eq!(c1.drain(), vec![user_list(&["alice", "bob"])]);
        assert_eq!(c2.drain(), vec![user_list(&["alice", "bob"])]);

        c1.send(&relay, "alice", "bob", "hello");
        let received = c2.drain();
        let sent = c1.drain();
        assert_eq!(received.len(), 1);
        assert_eq!(sent.len(), 1);
        match (&received[0], &sent[0]) {
            (ServerMessage::ReceiveMessage(r), ServerMessage::MessageSent(s)) => {
                assert_eq!(r, s);
                assert_eq!(r.from, "alice");
                assert_eq!(r.to, "bob");
                assert_eq!(r.message, "hello");
                assert!(!r.timestamp.is_empty());
            }
            other => panic!("Unexpected frames: {:?}", other),
        }

        c2.disconnect(&relay);
        assert_eq!(c1.drain(), vec![user_list(&["alice"])]);

        c1.send(&relay, "alice", "bob", "hello again");
        assert_eq!(
            c1.drain(),
            vec![ServerMessage::Error("User \"bob\" is not online".to_string())]
        );
    }

    #[test]
    fn test_unreachable_recipient_only_errors_at_sender() {
        let relay = Relay::default();
        let mut c1 = TestClient::connect(&relay);
        let mut c2 = TestClient::connect(&relay);
        c1.register(&relay, "alice");
        c2.register(&relay, "bob");
        c1.drain();
        c2.drain();

        c1.send(&relay, "alice", "carol", "anyone?");

        assert_eq!(
            c1.drain(),
            vec![ServerMessage::Error("User \"carol\" is not online".to_string())]
        );
        assert!(c2.drain().is_empty());
    }

    #[test]
    fn test_broadcast_matches_registry_after_every_event() {
        let relay = Relay::default();
        let mut observer = TestClient::connect(&relay);
        let a = TestClient::connect(&relay);
        let b = TestClient::connect(&relay);

        a.register(&relay, "alice");
        b.register(&relay, "bob");
        a.register(&relay, "alicia");
        b.disconnect(&relay);

        assert_eq!(
            observer.drain(),
            vec![
                user_list(&["alice"]),
                user_list(&["alice", "bob"]),
                user_list(&["bob", "alicia"]),
                user_list(&["alicia"]),
            ]
        );
        assert_eq!(relay.online_usernames(), vec!["alicia".to_string()]);
    }

    #[test]
    fn test_disconnect_without_register_is_harmless() {
        let relay = Relay::default();
        let mut c1 = TestClient::connect(&relay);
        c1.register(&relay, "alice");
        c1.drain();

        let c2 = TestClient::connect(&relay);
        let c2_id = c2.id;
        c2.disconnect(&relay);
        relay.handle(c2_id, RelayEvent::Disconnect);

        // One broadcast per disconnect event, registry untouched
        assert_eq!(
            c1.drain(),
            vec![user_list(&["alice"]), user_list(&["alice"])]
        );
        assert_eq!(relay.online_usernames(), vec!["alice".to_string()]);
        assert_eq!(relay.connection_count(), 1);
    }

    #[test]
    fn test_bound_sender_identity_rewrites_from() {
        let relay = Relay::new(SenderIdentity::Bound);
        let mut c1 = TestClient::connect(&relay);
        let mut c2 = TestClient::connect(&relay);
        c1.register(&relay, "mallory");
        c2.register(&relay, "bob");
        c1.drain();
        c2.drain();

        c1.send(&relay, "alice", "bob", "trust me");

        match c2.drain().as_slice() {
            [ServerMessage::ReceiveMessage(DeliveredMessage { from, .. })] => {
                assert_eq!(from, "mallory");
            }
            other => panic!("Unexpected frames: {:?}", other),
        }
    }

    #[test]
    fn test_claimed_sender_identity_relays_from() {
        let relay = Relay::new(SenderIdentity::Claimed);
        let mut c1 = TestClient::connect(&relay);
        let mut c2 = TestClient::connect(&relay);
        c1.register(&relay, "mallory");
        c2.register(&relay, "bob");
        c1.drain();
        c2.drain();

        c1.send(&relay, "alice", "bob", "trust me");

        match c2.drain().as_slice() {
            [ServerMessage::ReceiveMessage(DeliveredMessage { from, .. })] => {
                assert_eq!(from, "alice");
            }
            other => panic!("Unexpected frames: {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_name_delivers_to_first_registered() {
        let relay = Relay::default();
        let mut sender = TestClient::connect(&relay);
        let mut first = TestClient::connect(&relay);
        let mut second = TestClient::connect(&relay);
        first.register(&relay, "bob");
        second.register(&relay, "bob");
        sender.drain();
        first.drain();
        second.drain();

        sender.send(&relay, "alice", "bob", "which bob?");

        assert_eq!(first.drain().len(), 1);
        assert!(second.drain().is_empty());
    }
}
