//! Realtime client configuration.

use pillion_core::ReconnectConfig;
use serde::{Deserialize, Serialize};

/// Configuration for the realtime client.
///
/// Injected by the host application; every field has a sensible default
/// so partial JSON configs deserialize cleanly.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RealtimeConfig {
    /// WebSocket endpoint base, e.g. `"ws://127.0.0.1:8000/api"`.
    pub endpoint: String,
    /// How long one open attempt (TCP + WebSocket handshake) may take, in ms.
    pub handshake_timeout_ms: u64,
    /// Capacity of the command queue into the connection actor.
    pub command_buffer: usize,
    /// Capacity of the outbound frame queue per connection.
    pub outbound_buffer: usize,
    /// Capacity of the inbound frame queue per connection.
    pub inbound_buffer: usize,
    /// Reconnect behavior.
    pub reconnect: ReconnectConfig,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://127.0.0.1:8000/api".into(),
            handshake_timeout_ms: 10_000,
            command_buffer: 64,
            outbound_buffer: 32,
            inbound_buffer: 64,
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl RealtimeConfig {
    /// Build the connection target for a bearer token.
    ///
    /// The token rides in the URL path, as agreed with the server:
    /// `{endpoint}/ws/{token}`.
    #[must_use]
    pub fn ws_url(&self, token: &str) -> String {
        let base = self.endpoint.trim_end_matches('/');
        format!("{base}/ws/{token}")
    }
}
