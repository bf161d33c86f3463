//! One-shot connection status state machine.
//!
//! Each activation walks `Uninitialised → Initialising → {Connected | Error}` and
//! never comes back to `Initialising`. Reconnects performed inside the transport are
//! not reflected here.
use std::sync::Mutex;

use bond_common::{MonitorError, Result};
use strum_macros::Display;

/// Connection status shown to the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
pub enum ConnectionStatus {
    /// Nothing attempted yet.
    #[default]
    Uninitialised,
    /// Activation started; the transport is being built and connected.
    Initialising,
    /// The initial connect succeeded.
    Connected,
    /// Setup or the initial connect failed.
    Error,
}

impl ConnectionStatus {
    /// Whether the lifecycle allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: ConnectionStatus) -> bool {
        matches!(
            (self, next),
            (Self::Uninitialised, Self::Initialising)
                | (Self::Initialising, Self::Connected)
                | (Self::Initialising, Self::Error)
        )
    }

    /// `Connected` and `Error` end the lifecycle of an activation.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Connected | Self::Error)
    }
}

/// Thread-safe holder that only accepts lifecycle-conforming transitions.
#[derive(Debug, Default)]
pub struct StatusMachine {
    current: Mutex<ConnectionStatus>,
}

impl StatusMachine {
    /// Machine in the `Uninitialised` state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current status.
    pub fn current(&self) -> Result<ConnectionStatus> {
        Ok(*self.current.lock()?)
    }

    /// Move to `next`, returning the previous status.
    pub fn transition(&self, next: ConnectionStatus) -> Result<ConnectionStatus> {
        let mut current = self.current.lock()?;
        if !current.can_transition_to(next) {
            return Err(MonitorError::InvalidTransition {
                from: current.to_string(),
                to: next.to_string(),
            });
        }
        let previous = *current;
        *current = next;
        Ok(previous)
    }
}
