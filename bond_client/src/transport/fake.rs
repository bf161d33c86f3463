//! In-memory `HubTransport` used by unit tests.
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};

use bond_common::{MonitorError, Result};
use serde_json::Value;

use crate::transport::{Handler, HubTransport};

#[derive(Default)]
pub(crate) struct FakeTransport {
    handlers: RwLock<HashMap<String, Handler>>,
    invocations: Mutex<Vec<(String, Vec<Value>)>>,
    connected: AtomicBool,
    start_error: Option<String>,
    reject_invocations: Option<String>,
    stop_calls: AtomicUsize,
}

impl FakeTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn failing_start(cause: &str) -> Self {
        Self {
            start_error: Some(cause.to_string()),
            ..Self::default()
        }
    }

    pub(crate) fn rejecting_invocations(cause: &str) -> Self {
        Self {
            reject_invocations: Some(cause.to_string()),
            ..Self::default()
        }
    }

    /// Push a raw payload through the handler registered for `channel`.
    pub(crate) fn deliver(&self, channel: &str, payload: &str) -> bool {
        let handlers = self.handlers.read().unwrap();
        match handlers.get(channel) {
            Some(handler) => {
                handler(payload);
                true
            }
            None => false,
        }
    }

    pub(crate) fn registered_channels(&self) -> Vec<String> {
        let mut channels: Vec<String> = self.handlers.read().unwrap().keys().cloned().collect();
        channels.sort();
        channels
    }

    pub(crate) fn invocations(&self) -> Vec<(String, Vec<Value>)> {
        self.invocations.lock().unwrap().clone()
    }

    pub(crate) fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }
}

impl HubTransport for FakeTransport {
    fn on(&self, channel: &str, handler: Handler) -> Result<()> {
        self.handlers.write()?.insert(channel.to_string(), handler);
        Ok(())
    }

    fn start(&self) -> Result<()> {
        if let Some(cause) = &self.start_error {
            return Err(MonitorError::ConnectionClosed(cause.clone()));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn invoke(&self, request: &str, arguments: Vec<Value>) -> Result<Value> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(MonitorError::NotConnected);
        }
        self.invocations
            .lock()?
            .push((request.to_string(), arguments));
        match &self.reject_invocations {
            Some(reason) => Err(MonitorError::Invocation {
                target: request.to_string(),
                reason: reason.clone(),
            }),
            None => Ok(Value::Null),
        }
    }

    fn stop(&self) -> Result<()> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}
