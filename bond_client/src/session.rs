//! Connection lifecycle of one activation.
//!
//! `Session::activate` drives the status machine through
//! `Uninitialised → Initialising → {Connected | Error}`: it builds the transport,
//! binds the router and starts the connection. A failure at any of those steps,
//! whether building, registering or connecting, lands in `Error` and is logged with
//! the endpoint and the cause. The session owns the transport handle and passes it
//! explicitly to the `SubscriptionClient`; `deactivate` releases it exactly once.
use std::sync::Arc;

use bond_common::Result;
use log::{error, info};

use crate::model::state::SessionState;
use crate::model::status::ConnectionStatus;
use crate::router::Router;
use crate::subscription::SubscriptionClient;
use crate::transport::{HubConfig, HubConnection, HubTransport};

/// A live activation: transport, router and the state they feed.
pub struct Session {
    endpoint: String,
    state: Arc<SessionState>,
    transport: Option<Arc<dyn HubTransport>>,
    router: Option<Router>,
}

impl Session {
    /// Activate against the WebSocket hub described by `config`.
    pub fn connect(config: HubConfig, state: Arc<SessionState>) -> Result<Self> {
        let endpoint = config.url.clone();
        Self::activate(endpoint, state, move || {
            Ok(Arc::new(HubConnection::new(config)?) as Arc<dyn HubTransport>)
        })
    }

    /// Activate with a transport produced by `build`.
    ///
    /// Only fails if `state` refuses the `Initialising` transition (e.g. it already
    /// served an activation); setup failures are reflected in the status instead.
    pub fn activate<F>(endpoint: impl Into<String>, state: Arc<SessionState>, build: F) -> Result<Self>
    where
        F: FnOnce() -> Result<Arc<dyn HubTransport>>,
    {
        state.set_status(ConnectionStatus::Initialising)?;
        let mut session = Self {
            endpoint: endpoint.into(),
            state,
            transport: None,
            router: None,
        };

        match session.setup(build) {
            Ok(()) => {
                info!("Hub connection to {} initialised successfully", session.endpoint);
                session.state.set_status(ConnectionStatus::Connected)?;
            }
            Err(e) => {
                error!("Error initialising hub connection to URL {}: {}", session.endpoint, e);
                session.state.set_status(ConnectionStatus::Error)?;
            }
        }
        Ok(session)
    }

    fn setup<F>(&mut self, build: F) -> Result<()>
    where
        F: FnOnce() -> Result<Arc<dyn HubTransport>>,
    {
        let transport = build()?;
        self.transport = Some(Arc::clone(&transport));
        self.router = Some(Router::bind(transport.as_ref(), Arc::clone(&self.state))?);
        transport.start()
    }

    /// Endpoint this session targets.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Shared status and log.
    pub fn state(&self) -> &Arc<SessionState> {
        &self.state
    }

    /// Client for the subscribe action; `None` if no transport was ever built or
    /// the session has been deactivated.
    pub fn subscription_client(&self) -> Option<SubscriptionClient> {
        self.transport
            .as_ref()
            .map(|transport| SubscriptionClient::new(Arc::clone(transport), Arc::clone(&self.state)))
    }

    /// Tear the session down; later calls do nothing.
    pub fn deactivate(&mut self) {
        if let Some(transport) = self.transport.take() {
            info!("Closing hub connection to {}", self.endpoint);
            if let Err(e) = transport.stop() {
                error!("Failed to stop hub connection to {}: {}", self.endpoint, e);
            }
        }
        if let Some(mut router) = self.router.take() {
            router.stop();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.deactivate();
    }
}
