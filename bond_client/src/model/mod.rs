//! View-facing state of a monitor session.
//!
//! - `status` — one-shot `ConnectionStatus` state machine.
//! - `message_log` — append-only `MessageLog`.
//! - `state` — `SessionState` combining both and publishing `ViewUpdate`s.
pub mod message_log;
pub mod state;
pub mod status;
