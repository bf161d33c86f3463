//! Common types and utilities shared by the bond monitor client and the development hub.
//!
//! This crate aggregates:
//! - `error` — unified error type `MonitorError` used across the workspace.
//! - `result` — handy `Result<T, MonitorError>` alias.
//! - `hub` — channel and request names of the hub contract, endpoint defaults.
//! - `messages` — notification payloads and the log lines derived from them.
//! - `instruments` — instrument identifier list parsing.
//! - `protocol` — JSON hub protocol records and WebSocket polling helpers.
#![warn(missing_docs)]
pub mod error;
pub mod hub;
pub mod instruments;
pub mod messages;
pub mod protocol;
pub mod result;

pub use error::MonitorError;
pub use hub::Channel;
pub use messages::{InboundMessage, InstrumentQuote, SubscriptionNotification, SubscriptionResponse};
pub use result::Result;
