//! Development bond-monitor hub.
//!
//! Serves the JSON hub protocol on a plain WebSocket endpoint so the client can be
//! exercised without the production service. The building blocks are:
//!
//! - `HubListener` accepts TCP connections and hands each one to its own thread.
//! - `connection::handle_client_stream` upgrades the stream, performs the handshake and
//!   serves `SubscribeToInstruments`, pushing `SubscriptionSuccessful` and periodic
//!   `SubscriptionNotification` invocations.
//! - `QuoteGenerator` produces the quotes every connection forwards.
//! - `KeepAliveMonitor` closes connections that stay silent past the client timeout.
//!
//! Negotiation is not served; clients connect with negotiation skipped.
#![warn(missing_docs)]
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bond_common::Result;
use bond_common::hub::{KEEP_ALIVE_INTERVAL, PEER_TIMEOUT};
use log::{error, info};

use crate::connection::{StreamContext, StreamOptions, handle_client_stream};
use crate::listener::HubListener;
use crate::model::keep_alive::KeepAliveMonitor;
use crate::model::quote_generator::QuoteGenerator;

pub mod connection;
pub mod listener;
pub mod model;

/// Runtime settings of the hub.
#[derive(Debug, Clone, PartialEq)]
pub struct HubOptions {
    /// Interval between generated quotes.
    pub tick: Duration,
    /// Silence after which a client is disconnected.
    pub client_timeout: Duration,
    /// Interval between pings sent to clients.
    pub keep_alive_interval: Duration,
    /// Read timeout of client sockets and accept poll interval.
    pub poll_interval: Duration,
    /// Upper bound for a client handshake.
    pub handshake_timeout: Duration,
}

impl Default for HubOptions {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            client_timeout: PEER_TIMEOUT,
            keep_alive_interval: KEEP_ALIVE_INTERVAL,
            poll_interval: Duration::from_millis(50),
            handshake_timeout: Duration::from_secs(15),
        }
    }
}

/// Stops a running hub.
#[derive(Debug, Clone)]
pub struct ShutdownHandle(Arc<AtomicBool>);

impl ShutdownHandle {
    /// Request shutdown; the accept loop and every connection exit shortly after.
    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// A bound, not yet running hub.
pub struct HubServer {
    listener: HubListener,
    options: HubOptions,
    shutdown: Arc<AtomicBool>,
}

impl HubServer {
    /// Bind the hub to `addr`.
    pub fn bind(addr: &str, options: HubOptions) -> Result<Self> {
        Ok(Self {
            listener: HubListener::bind(addr)?,
            options,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Address the hub is listening on.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle that stops `run`.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(Arc::clone(&self.shutdown))
    }

    /// Serve clients on the current thread until shutdown is requested.
    pub fn run(self) -> Result<()> {
        let generator = QuoteGenerator::start(self.options.tick);
        let monitor = Arc::new(Mutex::new(KeepAliveMonitor::new(
            self.options.client_timeout,
        )));
        start_timeout_checker(Arc::clone(&monitor), Arc::clone(&self.shutdown));

        let context = StreamContext {
            options: StreamOptions {
                keep_alive_interval: self.options.keep_alive_interval,
                poll_interval: self.options.poll_interval,
                handshake_timeout: self.options.handshake_timeout,
            },
            generator: generator.clone(),
            monitor,
            subscription_ids: Arc::new(AtomicU64::new(0)),
            shutdown: Arc::clone(&self.shutdown),
        };

        let mut next_connection_id: u64 = 0;
        let result = self.listener.accept_loop(
            &self.shutdown,
            self.options.poll_interval,
            |stream, peer| {
                next_connection_id += 1;
                let connection_id = next_connection_id;
                let context = context.clone();
                let spawned = thread::Builder::new()
                    .name(format!("hub-client-{}", connection_id))
                    .spawn(move || {
                        if let Err(e) = handle_client_stream(stream, connection_id, context) {
                            error!("Client stream error for {}: {}", peer, e);
                        }
                    });
                if let Err(e) = spawned {
                    error!("Failed to spawn stream for {}: {}", peer, e);
                }
            },
        );

        generator.shutdown();
        info!("Hub stopped");
        result
    }

    /// Run the hub on a background thread.
    pub fn spawn(self) -> Result<(ShutdownHandle, JoinHandle<Result<()>>)> {
        let handle = self.shutdown_handle();
        let worker = thread::Builder::new()
            .name("hub".to_string())
            .spawn(move || self.run())?;
        Ok((handle, worker))
    }
}

fn start_timeout_checker(monitor: Arc<Mutex<KeepAliveMonitor>>, shutdown: Arc<AtomicBool>) {
    thread::spawn(move || {
        let check_interval = Duration::from_millis(200);

        while !shutdown.load(Ordering::SeqCst) {
            thread::sleep(check_interval);
            let timed_out = match monitor.lock() {
                Ok(mut monitor) => monitor.check_timeouts(),
                Err(e) => {
                    error!("Keep-alive monitor unavailable: {}", e);
                    break;
                }
            };
            for connection_id in timed_out {
                info!("Connection {} signalled to close: keep-alive timeout", connection_id);
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawned_hub_stops_on_shutdown() {
        let options = HubOptions {
            poll_interval: Duration::from_millis(5),
            ..HubOptions::default()
        };
        let server = HubServer::bind("127.0.0.1:0", options).unwrap();
        assert_ne!(server.local_addr().unwrap().port(), 0);

        let (shutdown, worker) = server.spawn().unwrap();
        shutdown.trigger();
        worker.join().unwrap().unwrap();
    }
}
