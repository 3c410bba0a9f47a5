use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};

use crate::chat::relay::RelayEvent;
use crate::state::AppState;
use crate::ws::protocol;
use crate::ws::{ConnectionId, ConnectionSender};

/// Close code sent when a client stops answering pings ("going away").
const CLOSE_GOING_AWAY: u16 = 1001;

/// How long the writer may take to flush after the connection is torn down.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Run the actor-per-connection pattern for a relay WebSocket.
///
/// Splits the WebSocket into reader and writer halves:
/// - Writer task: owns the sink, forwards messages from an mpsc channel
/// - Keep-alive task: pings periodically and closes on missing pongs
/// - Reader loop: decodes incoming frames and hands them to the relay
///
/// The relay holds a clone of the mpsc sender, so broadcasts and deliveries
/// reach this client without touching the socket directly.
pub async fn run_connection(socket: WebSocket, state: AppState, peer: SocketAddr) {
    let connection_id = ConnectionId::new();
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();

    state.relay.handle(connection_id, RelayEvent::Connect(tx.clone()));

    tracing::info!(
        connection_id = %connection_id,
        peer = %peer,
        "WebSocket actor started"
    );

    // Spawn writer task: forwards mpsc messages to WebSocket sink
    let mut writer_handle = tokio::spawn(writer_task(ws_sender, rx));

    // Track pong reception
    let (pong_tx, pong_rx) = mpsc::unbounded_channel::<()>();
    let mut ping_handle = tokio::spawn(keep_alive_task(
        tx.clone(),
        pong_rx,
        state.ping_interval,
        state.pong_timeout,
    ));

    // Reader loop: process incoming WebSocket messages until the peer goes away
    // or the keep-alive task gives up on it
    loop {
        let next = tokio::select! {
            next = ws_receiver.next() => next,
            _ = &mut ping_handle => {
                tracing::info!(
                    connection_id = %connection_id,
                    "Keep-alive expired, dropping connection"
                );
                break;
            }
        };

        match next {
            Some(Ok(msg)) => match msg {
                Message::Text(text) => {
                    protocol::handle_text_message(text.as_str(), connection_id, &state.relay);
                }
                Message::Binary(data) => {
                    tracing::debug!(
                        connection_id = %connection_id,
                        len = data.len(),
                        "Ignoring binary frame"
                    );
                }
                Message::Pong(_) => {
                    let _ = pong_tx.send(());
                }
                Message::Ping(data) => {
                    let _ = tx.send(Message::Pong(data));
                }
                Message::Close(frame) => {
                    tracing::info!(
                        connection_id = %connection_id,
                        reason = ?frame,
                        "Client initiated close"
                    );
                    break;
                }
            },
            Some(Err(e)) => {
                tracing::warn!(
                    connection_id = %connection_id,
                    error = %e,
                    "WebSocket receive error"
                );
                break;
            }
            None => {
                tracing::info!(connection_id = %connection_id, "WebSocket stream ended");
                break;
            }
        }
    }

    ping_handle.abort();

    // Drops the relay's sender, unregisters and broadcasts the new user list
    state.relay.handle(connection_id, RelayEvent::Disconnect);

    // With every sender gone the writer flushes what is queued (a pending
    // Close frame included) and exits; a stalled peer gets cut off
    drop(tx);
    if timeout(WRITER_DRAIN_TIMEOUT, &mut writer_handle).await.is_err() {
        writer_handle.abort();
    }

    tracing::info!(
        connection_id = %connection_id,
        online = state.relay.online_usernames().len(),
        connections = state.relay.connection_count(),
        "WebSocket actor stopped"
    );
}

/// Writer task: receives messages from mpsc channel and forwards them to the WebSocket sink.
async fn writer_task(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        if ws_sender.send(msg).await.is_err() {
            // WebSocket send failed, connection is broken
            break;
        }
    }
}

/// Keep-alive task: pings every `ping_interval` and asks the writer to close the
/// socket if no pong arrives within `pong_timeout`.
///
/// Returns only when the connection should be dropped; the reader loop watches
/// for that and tears the connection down.
async fn keep_alive_task(
    tx: ConnectionSender,
    mut pong_rx: mpsc::UnboundedReceiver<()>,
    ping_interval: Duration,
    pong_timeout: Duration,
) {
    let mut ping_timer = interval(ping_interval);
    // Skip the first immediate tick
    ping_timer.tick().await;

    loop {
        ping_timer.tick().await;

        // Unsolicited pongs must not satisfy the next ping
        while pong_rx.try_recv().is_ok() {}

        if tx.send(Message::Ping(vec![1, 2, 3, 4].into())).is_err() {
            // Writer task has died, connection is gone
            break;
        }

        match timeout(pong_timeout, pong_rx.recv()).await {
            Ok(Some(())) => {}
            _ => {
                tracing::warn!("Pong timeout, closing connection");
                let _ = tx.send(Message::Close(Some(CloseFrame {
                    code: CLOSE_GOING_AWAY,
                    reason: "Pong timeout".into(),
                })));
                break;
            }
        }
    }
}
