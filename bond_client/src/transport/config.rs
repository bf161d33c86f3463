//! Connection settings for `HubConnection`.
use std::time::Duration;

use bond_common::hub::{DEFAULT_HUB_URL, KEEP_ALIVE_INTERVAL, PEER_TIMEOUT};

/// Delays between automatic reconnect attempts, in seconds.
pub const DEFAULT_RECONNECT_DELAYS_SECS: [u64; 4] = [0, 2, 10, 30];

/// Settings for one hub connection.
#[derive(Debug, Clone, PartialEq)]
pub struct HubConfig {
    /// Hub endpoint (`http`, `https`, `ws` or `wss`).
    pub url: String,
    /// Connect the WebSocket directly instead of calling `/negotiate` first.
    pub skip_negotiation: bool,
    /// Wait before each reconnect attempt; an empty schedule disables reconnecting.
    pub reconnect_delays: Vec<Duration>,
    /// Interval between client pings.
    pub keep_alive_interval: Duration,
    /// Silence after which the server is considered gone.
    pub server_timeout: Duration,
    /// Upper bound for opening a connection: TCP connect, upgrade and handshake.
    pub handshake_timeout: Duration,
    /// Socket read timeout; bounds how long outbound records wait to be written.
    pub poll_interval: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_HUB_URL.to_string(),
            skip_negotiation: false,
            reconnect_delays: DEFAULT_RECONNECT_DELAYS_SECS
                .iter()
                .map(|secs| Duration::from_secs(*secs))
                .collect(),
            keep_alive_interval: KEEP_ALIVE_INTERVAL,
            server_timeout: PEER_TIMEOUT,
            handshake_timeout: Duration::from_secs(15),
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl HubConfig {
    /// Default settings for `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Open the WebSocket directly when `skip` is set.
    pub fn with_skip_negotiation(mut self, skip: bool) -> Self {
        self.skip_negotiation = skip;
        self
    }

    /// Replace the reconnect delay schedule.
    pub fn with_automatic_reconnect(mut self, delays: Vec<Duration>) -> Self {
        self.reconnect_delays = delays;
        self
    }

    /// Never reconnect once an established connection drops.
    pub fn without_reconnect(mut self) -> Self {
        self.reconnect_delays.clear();
        self
    }

    /// Interval between client pings.
    pub fn with_keep_alive_interval(mut self, interval: Duration) -> Self {
        self.keep_alive_interval = interval;
        self
    }

    /// Silence tolerated before the connection counts as lost.
    pub fn with_server_timeout(mut self, timeout: Duration) -> Self {
        self.server_timeout = timeout;
        self
    }

    /// Bound for TCP connect, WebSocket upgrade and protocol handshake together.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Socket read timeout of the I/O thread.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}
