use super::protocol::{encode_server_message, ServerMessage};
use super::{ConnectionId, ConnectionMap};

/// Broadcast a server frame to every live connection.
pub fn broadcast_to_all(connections: &ConnectionMap, message: &ServerMessage) {
    let Some(msg) = encode_server_message(message) else {
        return;
    };

    for sender in connections.values() {
        let _ = sender.send(msg.clone());
    }
}

/// Send a server frame to a single connection. Unknown ids are ignored.
pub fn send_to_connection(
    connections: &ConnectionMap,
    connection_id: &ConnectionId,
    message: &ServerMessage,
) {
    let Some(sender) = connections.get(connection_id) else {
        return;
    };
    if let Some(msg) = encode_server_message(message) {
        let _ = sender.send(msg);
    }
}
