//! Error types shared between the monitor client and the development hub.
//!
//! The `MonitorError` enum unifies the failure cases of the transport (sockets,
//! WebSocket, negotiation, handshake), payload decoding, channel communication and
//! the connection lifecycle, so every crate can propagate a single error type.
use std::io;
use std::sync::PoisonError;

use thiserror::Error;

/// Unified error type shared by client and hub.
#[derive(Error, Debug)]
pub enum MonitorError {
    /// I/O error originating from sockets or files.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Generic formatting/validation error with a human-readable message.
    #[error("Format error: {0}")]
    Format(String),

    /// The endpoint URL could not be parsed.
    #[error("Invalid endpoint URL: {0}")]
    Url(#[from] url::ParseError),

    /// Failure while encoding/decoding JSON via serde_json.
    #[error("JSON serialization/deserialization error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    /// Failure reported by the WebSocket layer.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// The negotiate round trip failed or offered nothing usable.
    #[error("Negotiation failed: {0}")]
    Negotiate(String),

    /// The remote side rejected or never answered the protocol handshake.
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// An operation needed a live connection and there was none.
    #[error("Connection is not in the Connected state")]
    NotConnected,

    /// The connection went away while an operation was in flight.
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// The remote side completed an invocation with an error.
    #[error("Invocation of {target} failed: {reason}")]
    Invocation {
        /// Name of the invoked hub method.
        target: String,
        /// Error text returned by the hub.
        reason: String,
    },

    /// An inbound channel name that the router does not know about.
    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    /// A connection status change that the lifecycle does not allow.
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        /// Status before the attempted change.
        from: String,
        /// Requested status.
        to: String,
    },

    /// Error while parsing an instrument list into identifiers.
    #[error("Parse instruments error: {0}")]
    ParseInstruments(String),

    /// Crossbeam channel send failed (e.g., receiver dropped).
    #[error("Channel send failed: {0}")]
    ChannelSend(String),

    /// Crossbeam channel receive failed (e.g., sender closed).
    #[error("Channel receive failed: {0}")]
    ChannelRecv(String),

    /// Error indicating a poisoned mutex/lock was encountered.
    #[error("Mutex Lock Poisoned: {0}")]
    MutexLock(String),
}

impl<T> From<PoisonError<T>> for MonitorError {
    fn from(err: PoisonError<T>) -> Self {
        MonitorError::MutexLock(err.to_string())
    }
}
