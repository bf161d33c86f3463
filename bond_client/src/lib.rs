//! Bond monitor client.
//!
//! Keeps a reconnecting session with the bond monitor hub, subscribes to instrument
//! updates and turns the pushed notifications into an append-only message log.
//!
//! - `transport` — `HubTransport` contract and the WebSocket `HubConnection`.
//! - `model` — connection status machine, message log and the view-facing `SessionState`.
//! - `router` — binds the two hub channels and appends decoded messages to the log.
//! - `subscription` — `SubscriptionClient`, the `SubscribeToInstruments` request.
//! - `session` — activation/deactivation lifecycle tying the pieces together.
//! - `view` — console rendering and operator commands.
//! - `args` — command-line interface.
pub mod args;
pub mod model;
pub mod router;
pub mod session;
pub mod subscription;
pub mod transport;
pub mod view;

pub use model::state::{SessionState, ViewUpdate};
pub use model::status::ConnectionStatus;
pub use session::Session;
pub use subscription::SubscriptionClient;
pub use transport::{HubConfig, HubConnection, HubTransport};
