//! Domain models and utilities for the development hub.
//!
//! - `keep_alive` — in-memory activity tracker that closes silent connections.
//! - `quote_generator` — background bid/offer generator and `QuoteEvent` broadcasting.

pub mod keep_alive;
pub mod quote_generator;
