//! Bond monitor client: connects to the bond monitor hub, shows the connection
//! status, subscribes to instrument updates on request and prints every line added
//! to the message log.
//!
//! Usage example (CLI):
//! ```bash
//! bond_client --url https://localhost:8802/bondmonitorhub --instruments instrumentId1,instrumentId2
//! ```
//!
//! Operator input is read from stdin (see `view::ViewCommand`); Ctrl+C or `quit`
//! deactivates the session and exits.
#![warn(missing_docs)]
use std::io::BufRead;
use std::sync::Arc;
use std::thread;

use bond_client::args::Args;
use bond_client::view::{self, ViewCommand};
use bond_client::{Session, SessionState};
use bond_common::MonitorError;
use bond_common::Result;
use clap::Parser;
use crossbeam_channel::{select, unbounded};
use log::{error, info, warn};

fn main() -> Result<(), MonitorError> {
    init_logger();
    let args = Args::parse();
    let instruments = args.instrument_ids()?;
    info!("Instruments: {:?}", instruments);

    let (shutdown_tx, shutdown_rx) = unbounded::<()>();
    ctrlc::set_handler(move || {
        info!("Ctrl+C received. Shutting down client...");
        let _ = shutdown_tx.send(());
    })
    .map_err(|e| MonitorError::Format(format!("Error setting Ctrl+C handler: {}", e)))?;

    let state = Arc::new(SessionState::new());
    view::spawn_renderer(state.watch()?)?;
    println!("Welcome");
    println!("{}", view::usage());

    let mut session = Session::connect(args.hub_config(), Arc::clone(&state))?;

    let (input_tx, input_rx) = unbounded::<String>();
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if input_tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to read stdin: {}", e);
                    break;
                }
            }
        }
    });

    loop {
        select! {
            recv(shutdown_rx) -> _ => break,
            recv(input_rx) -> line => match line {
                Ok(line) => match ViewCommand::parse(&line) {
                    ViewCommand::Send(explicit) => match session.subscription_client() {
                        Some(client) => {
                            let ids = explicit.unwrap_or_else(|| instruments.clone());
                            thread::spawn(move || client.subscribe_to_instruments(&ids));
                        }
                        None => warn!("No hub connection available; subscribe ignored"),
                    },
                    ViewCommand::Status => println!("Connection status: {}", state.status()?),
                    ViewCommand::Log => {
                        println!("Messages:");
                        for message in state.messages()? {
                            println!("{}", message);
                        }
                    }
                    ViewCommand::Quit => break,
                    ViewCommand::Unknown(text) => {
                        println!("Unknown command '{}'. {}", text, view::usage());
                    }
                },
                Err(_) => {
                    info!("Input closed; press Ctrl+C to exit");
                    let _ = shutdown_rx.recv();
                    break;
                }
            }
        }
    }

    session.deactivate();
    info!("Client stopped");
    Ok(())
}

fn init_logger() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
}
