//! Names that make up the hub's wire contract, plus endpoint defaults.
//!
//! Channel and request names are case-sensitive and must match the remote hub exactly.
use std::time::Duration;

use strum_macros::{Display, EnumString};

/// Endpoint used when nothing else is configured.
pub const DEFAULT_HUB_URL: &str = "https://localhost:8802/bondmonitorhub";
/// Address the development hub binds to by default.
pub const DEFAULT_HUB_BIND: &str = "127.0.0.1:8802";

/// The only outbound request the monitor issues.
pub const SUBSCRIBE_REQUEST: &str = "SubscribeToInstruments";

/// Instruments requested when the caller does not supply any.
pub const DEFAULT_INSTRUMENTS: [&str; 2] = ["instrumentId1", "instrumentId2"];

/// Interval between keep-alive pings sent by either side.
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);
/// Silence after which a peer is considered gone.
pub const PEER_TIMEOUT: Duration = Duration::from_secs(30);

/// Inbound notification channels pushed by the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
pub enum Channel {
    /// Acknowledges a subscribe request; payload is a `SubscriptionResponse`.
    SubscriptionSuccessful,
    /// Pushes quotes for a subscription; payload is a `SubscriptionNotification`.
    SubscriptionNotification,
}

impl Channel {
    /// Every channel the router binds, in registration order.
    pub const ALL: [Channel; 2] = [Channel::SubscriptionSuccessful, Channel::SubscriptionNotification];
}
