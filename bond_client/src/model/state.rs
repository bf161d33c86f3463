//! State observed by the view: connection status, message log, request failures.
//!
//! `SessionState` owns both pieces of view state and fans every change out to the
//! registered watchers over `crossbeam_channel`. A watcher whose receiver has been
//! dropped is removed on the next publish.
use std::sync::Mutex;

use bond_common::Result;
use crossbeam_channel::{Receiver, Sender, unbounded};
use log::debug;

use crate::model::message_log::MessageLog;
use crate::model::status::{ConnectionStatus, StatusMachine};

/// Change notification delivered to view watchers.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewUpdate {
    /// The connection status moved to a new value.
    Status(ConnectionStatus),
    /// Lines appended to the message log, in log order.
    Appended(Vec<String>),
    /// An outbound request failed.
    RequestFailed {
        /// Request name.
        request: String,
        /// Failure description.
        cause: String,
    },
}

/// Status and log shared between the lifecycle, the router and the view.
#[derive(Debug, Default)]
pub struct SessionState {
    status: StatusMachine,
    log: MessageLog,
    watchers: Mutex<Vec<Sender<ViewUpdate>>>,
}

impl SessionState {
    /// Fresh state: `Uninitialised`, empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a watcher that receives every subsequent change.
    pub fn watch(&self) -> Result<Receiver<ViewUpdate>> {
        let (tx, rx) = unbounded();
        self.watchers.lock()?.push(tx);
        Ok(rx)
    }

    /// Current connection status.
    pub fn status(&self) -> Result<ConnectionStatus> {
        self.status.current()
    }

    /// Apply a lifecycle transition and notify watchers.
    pub fn set_status(&self, next: ConnectionStatus) -> Result<()> {
        let mut watchers = self.watchers.lock()?;
        self.status.transition(next)?;
        Self::notify(&mut watchers, ViewUpdate::Status(next));
        Ok(())
    }

    /// Copy of the message log.
    pub fn messages(&self) -> Result<Vec<String>> {
        self.log.snapshot()
    }

    /// Append lines to the message log and notify watchers.
    pub fn append_messages(&self, lines: Vec<String>) -> Result<()> {
        if lines.is_empty() {
            return Ok(());
        }
        let mut watchers = self.watchers.lock()?;
        self.log.append(&lines)?;
        Self::notify(&mut watchers, ViewUpdate::Appended(lines));
        Ok(())
    }

    /// Surface a failed outbound request to watchers.
    pub fn report_request_failure(&self, request: &str, cause: String) -> Result<()> {
        let mut watchers = self.watchers.lock()?;
        Self::notify(
            &mut watchers,
            ViewUpdate::RequestFailed {
                request: request.to_string(),
                cause,
            },
        );
        Ok(())
    }

    // Callers hold the watcher lock across the state change so updates reach
    // watchers in the same order the changes were applied.
    fn notify(watchers: &mut Vec<Sender<ViewUpdate>>, update: ViewUpdate) {
        watchers.retain(|watcher| watcher.send(update.clone()).is_ok());
        debug!("View update published to {} watcher(s)", watchers.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watchers_see_status_and_lines() {
        let state = SessionState::new();
        let rx = state.watch().unwrap();

        state.set_status(ConnectionStatus::Initialising).unwrap();
        state.append_messages(vec!["one".to_string()]).unwrap();

        assert_eq!(rx.try_recv().unwrap(), ViewUpdate::Status(ConnectionStatus::Initialising));
        assert_eq!(rx.try_recv().unwrap(), ViewUpdate::Appended(vec!["one".to_string()]));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_rejected_transition_publishes_nothing() {
        let state = SessionState::new();
        let rx = state.watch().unwrap();
        assert!(state.set_status(ConnectionStatus::Connected).is_err());
        assert!(rx.try_recv().is_err());
        assert_eq!(state.status().unwrap(), ConnectionStatus::Uninitialised);
    }

    #[test]
    fn test_dropped_watcher_is_pruned() {
        let state = SessionState::new();
        let kept = state.watch().unwrap();
        drop(state.watch().unwrap());

        state.append_messages(vec!["x".to_string()]).unwrap();
        assert_eq!(state.watchers.lock().unwrap().len(), 1);
        assert_eq!(kept.try_recv().unwrap(), ViewUpdate::Appended(vec!["x".to_string()]));
    }

    #[test]
    fn test_request_failure_is_published() {
        let state = SessionState::new();
        let rx = state.watch().unwrap();
        state
            .report_request_failure("SubscribeToInstruments", "not connected".to_string())
            .unwrap();
        assert!(matches!(rx.try_recv().unwrap(), ViewUpdate::RequestFailed { .. }));
        assert!(state.messages().unwrap().is_empty());
    }
}
