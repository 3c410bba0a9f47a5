use std::sync::Arc;
use std::time::Duration;

use crate::chat::relay::Relay;
use crate::config::RelayConfig;

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// Registry of online users and live connections
    pub relay: Arc<Relay>,
    /// How often each connection is pinged
    pub ping_interval: Duration,
    /// How long a ping may go unanswered before the connection is closed
    pub pong_timeout: Duration,
}

impl AppState {
    pub fn new(config: &RelayConfig) -> Self {
        Self {
            relay: Arc::new(Relay::new(config.sender_identity)),
            // tokio intervals reject a zero period
            ping_interval: Duration::from_secs(config.ping_interval_secs.max(1)),
            pong_timeout: Duration::from_secs(config.pong_timeout_secs.max(1)),
        }
    }
}
