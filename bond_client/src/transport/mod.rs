//! Transport session consumed by the monitor core.
//!
//! The core only relies on the `HubTransport` surface: register one handler per
//! inbound channel, start the connection once, invoke named requests, stop. The
//! production implementation is `HubConnection`, which speaks the JSON hub protocol
//! over a WebSocket with negotiation, keep-alive and automatic reconnect.
use bond_common::Result;
use serde_json::Value;

pub mod config;
pub mod connection;
#[cfg(test)]
pub(crate) mod fake;
pub mod negotiate;

pub use config::HubConfig;
pub use connection::HubConnection;

/// Callback receiving the raw, undecoded payload of one inbound delivery.
pub type Handler = Box<dyn Fn(&str) + Send + Sync>;

/// Persistent connection to the remote hub.
pub trait HubTransport: Send + Sync {
    /// Register the handler for `channel`, replacing any previous one.
    fn on(&self, channel: &str, handler: Handler) -> Result<()>;

    /// Open the connection; succeeds or fails exactly once per call.
    fn start(&self) -> Result<()>;

    /// Send a named request with positional arguments and wait for its completion.
    fn invoke(&self, request: &str, arguments: Vec<Value>) -> Result<Value>;

    /// Release the connection. Calling it again is a no-op.
    fn stop(&self) -> Result<()>;
}
