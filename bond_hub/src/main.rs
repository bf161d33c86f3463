//! Development bond-monitor hub.
//!
//! Usage example (CLI):
//! ```bash
//! bond_hub --bind 127.0.0.1:8802 --tick-ms 500
//! bond_client --url http://127.0.0.1:8802/bondmonitorhub --skip-negotiation
//! ```
//!
//! Ctrl+C stops accepting clients and closes every open connection.
#![warn(missing_docs)]
use std::time::Duration;

use bond_common::MonitorError;
use bond_common::Result;
use bond_common::hub::{DEFAULT_HUB_BIND, PEER_TIMEOUT};
use bond_hub::{HubOptions, HubServer};
use clap::Parser;
use log::info;

/// Parsed command-line arguments.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Address to listen on.
    #[clap(long, default_value = DEFAULT_HUB_BIND)]
    bind: String,

    /// Milliseconds between generated quotes.
    #[clap(long, default_value_t = 1000)]
    tick_ms: u64,

    /// Seconds of client silence before the connection is closed.
    #[clap(long, default_value_t = PEER_TIMEOUT.as_secs())]
    client_timeout: u64,
}

fn main() -> Result<(), MonitorError> {
    init_logger();
    let args = Args::parse();

    let options = HubOptions {
        tick: Duration::from_millis(args.tick_ms.max(1)),
        client_timeout: Duration::from_secs(args.client_timeout),
        ..HubOptions::default()
    };
    let server = HubServer::bind(&args.bind, options)?;
    info!("Hub endpoint: ws://{}/bondmonitorhub", server.local_addr()?);

    let shutdown = server.shutdown_handle();
    ctrlc::set_handler(move || {
        info!("Ctrl+C received. Shutting down hub...");
        shutdown.trigger();
    })
    .map_err(|e| MonitorError::Format(format!("Error setting Ctrl+C handler: {}", e)))?;

    server.run()
}

fn init_logger() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
}
