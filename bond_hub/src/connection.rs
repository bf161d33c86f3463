//! Stream task for a single hub client.
//!
//! Performs the WebSocket upgrade and the protocol handshake, then loops:
//! - answers `SubscribeToInstruments` invocations with a `SubscriptionSuccessful`
//!   push followed by the completion,
//! - forwards generator ticks as one `SubscriptionNotification` per subscription,
//! - sends a ping every keep-alive interval.
//!
//! The task ends when the client closes, the keep-alive monitor signals a timeout,
//! or the generator broadcasts `QuoteEvent::Shutdown`.
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bond_common::hub::SUBSCRIBE_REQUEST;
use bond_common::protocol::{
    self, HandshakeRequest, HandshakeResponse, HubMessage, Incoming, RECORD_SEPARATOR,
};
use bond_common::{Channel, MonitorError, Result, SubscriptionNotification, SubscriptionResponse};
use crossbeam_channel::{Receiver, unbounded};
use log::{debug, info, warn};
use serde_json::Value;
use tungstenite::WebSocket;

use crate::model::keep_alive::KeepAliveMonitor;
use crate::model::quote_generator::{GeneratorHandle, QuoteEvent, QuoteSubscription};

/// Timing knobs for a client stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamOptions {
    /// Interval between hub pings.
    pub keep_alive_interval: Duration,
    /// Socket read timeout.
    pub poll_interval: Duration,
    /// Upper bound for the protocol handshake.
    pub handshake_timeout: Duration,
}

/// Shared collaborators of every stream.
#[derive(Clone)]
pub struct StreamContext {
    /// Timing knobs.
    pub options: StreamOptions,
    /// Where subscriptions are registered.
    pub generator: GeneratorHandle,
    /// Activity tracker shared with the timeout checker.
    pub monitor: Arc<Mutex<KeepAliveMonitor>>,
    /// Last allocated subscription number.
    pub subscription_ids: Arc<AtomicU64>,
    /// Set when the hub is stopping.
    pub shutdown: Arc<AtomicBool>,
}

struct ActiveSubscription {
    id: String,
    events: Receiver<QuoteEvent>,
}

enum StreamEnd {
    ClientClosed,
    Continue,
    Shutdown,
}

/// Serve one accepted TCP connection until it ends.
pub fn handle_client_stream(
    stream: TcpStream,
    connection_id: u64,
    context: StreamContext,
) -> Result<()> {
    let peer: SocketAddr = stream.peer_addr()?;
    let control = stream.try_clone()?;
    let mut socket = tungstenite::accept(stream)
        .map_err(|e| MonitorError::Handshake(format!("WebSocket upgrade failed: {}", e)))?;
    control.set_read_timeout(Some(context.options.poll_interval))?;

    let leftover = match accept_handshake(&mut socket, context.options.handshake_timeout)? {
        Some(leftover) => leftover,
        None => return Ok(()),
    };
    info!("Client {} connected as connection {}", peer, connection_id);

    let (stop_tx, stop_rx) = unbounded::<()>();
    context.monitor.lock()?.register(connection_id, stop_tx);

    let result = serve(&mut socket, connection_id, &context, &stop_rx, leftover);
    context.monitor.lock()?.remove(connection_id);
    info!("Connection {} from {} closed", connection_id, peer);
    result
}

/// Returns the records that followed the handshake, or `None` if it was refused.
fn accept_handshake(
    socket: &mut WebSocket<TcpStream>,
    timeout: Duration,
) -> Result<Option<String>> {
    let deadline = Instant::now() + timeout;
    let mut buffer = String::new();
    while !buffer.contains(RECORD_SEPARATOR) {
        match protocol::read_incoming(socket)? {
            Incoming::Text(text) => buffer.push_str(&text),
            Incoming::Idle => {}
            Incoming::Closed(_) => return Ok(None),
        }
        if Instant::now() >= deadline {
            return Err(MonitorError::Handshake("no handshake request received".to_string()));
        }
    }

    let (request, rest): (HandshakeRequest, &str) = protocol::split_handshake(&buffer)?;
    if !request.is_supported() {
        let refusal = HandshakeResponse {
            error: Some(format!(
                "The protocol '{}' version {} is not supported.",
                request.protocol, request.version
            )),
        };
        warn!("Refusing handshake for protocol {} v{}", request.protocol, request.version);
        protocol::send_records(socket, refusal.encode()?)?;
        let _ = socket.close(None);
        return Ok(None);
    }
    protocol::send_records(socket, HandshakeResponse::default().encode()?)?;
    Ok(Some(rest.to_string()))
}

fn serve(
    socket: &mut WebSocket<TcpStream>,
    connection_id: u64,
    context: &StreamContext,
    stop_rx: &Receiver<()>,
    leftover: String,
) -> Result<()> {
    let mut subscriptions: Vec<ActiveSubscription> = Vec::new();
    let mut outgoing = String::new();
    let mut last_sent = Instant::now();

    if let StreamEnd::ClientClosed =
        handle_records(&leftover, context, &mut subscriptions, &mut outgoing)
    {
        return Ok(());
    }

    loop {
        if stop_rx.try_recv().is_ok() {
            info!("Connection {} timed out", connection_id);
            outgoing.push_str(
                &HubMessage::Close {
                    error: Some("Connection timed out: no message from the client.".to_string()),
                    allow_reconnect: true,
                }
                .encode(),
            );
            let _ = protocol::send_records(socket, outgoing);
            let _ = socket.close(None);
            return Ok(());
        }

        let shutting_down = context.shutdown.load(Ordering::SeqCst);
        if shutting_down
            || matches!(drain_quotes(&subscriptions, &mut outgoing)?, StreamEnd::Shutdown)
        {
            outgoing.push_str(
                &HubMessage::Close {
                    error: Some("Hub shutting down".to_string()),
                    allow_reconnect: true,
                }
                .encode(),
            );
            let _ = protocol::send_records(socket, outgoing);
            let _ = socket.close(None);
            return Ok(());
        }

        if outgoing.is_empty() && last_sent.elapsed() >= context.options.keep_alive_interval {
            outgoing = HubMessage::Ping.encode();
        }
        if !outgoing.is_empty() {
            protocol::send_records(socket, std::mem::take(&mut outgoing))?;
            last_sent = Instant::now();
        }

        match protocol::read_incoming(socket)? {
            Incoming::Text(text) => {
                context.monitor.lock()?.touch(connection_id);
                if let StreamEnd::ClientClosed =
                    handle_records(&text, context, &mut subscriptions, &mut outgoing)
                {
                    return Ok(());
                }
            }
            Incoming::Idle => {}
            Incoming::Closed(reason) => {
                debug!("Connection {} closed by client ({:?})", connection_id, reason);
                return Ok(());
            }
        }
    }
}

fn handle_records(
    frame: &str,
    context: &StreamContext,
    subscriptions: &mut Vec<ActiveSubscription>,
    outgoing: &mut String,
) -> StreamEnd {
    for record in protocol::split_records(frame) {
        match HubMessage::parse(record) {
            Ok(HubMessage::Invocation {
                invocation_id,
                target,
                arguments,
            }) => {
                let outcome = if target == SUBSCRIBE_REQUEST {
                    subscribe(context, &arguments, subscriptions, outgoing)
                } else {
                    Err(format!("Unknown hub method '{}'", target))
                };
                if let Err(reason) = &outcome {
                    warn!("Invocation of {} failed: {}", target, reason);
                }
                if let Some(invocation_id) = invocation_id {
                    outgoing.push_str(
                        &HubMessage::Completion {
                            invocation_id,
                            result: None,
                            error: outcome.err(),
                        }
                        .encode(),
                    );
                }
            }
            Ok(HubMessage::Ping) => {}
            Ok(HubMessage::Close { .. }) => return StreamEnd::ClientClosed,
            Ok(HubMessage::Completion { invocation_id, .. }) => {
                debug!("Ignoring completion {} from client", invocation_id)
            }
            Ok(other) => warn!("Ignoring unsupported message {:?}", other),
            Err(e) => warn!("Failed to parse client record: {} ({})", e, record),
        }
    }
    StreamEnd::Continue
}

fn subscribe(
    context: &StreamContext,
    arguments: &[Value],
    subscriptions: &mut Vec<ActiveSubscription>,
    outgoing: &mut String,
) -> std::result::Result<(), String> {
    let instruments: Vec<String> = match arguments {
        [ids] => serde_json::from_value(ids.clone())
            .map_err(|e| format!("Expected a list of instrument ids: {}", e))?,
        _ => {
            return Err(format!(
                "Expected 1 argument, received {}",
                arguments.len()
            ));
        }
    };

    let id = format!(
        "SUB-{}",
        context.subscription_ids.fetch_add(1, Ordering::SeqCst) + 1
    );
    let (events_tx, events_rx) = unbounded();
    if !context.generator.subscribe(QuoteSubscription {
        instruments: instruments.clone(),
        events: events_tx,
    }) {
        return Err("Quote generator is not running".to_string());
    }

    let response = SubscriptionResponse {
        subscription_id: id.clone(),
        instrument_ids: Some(instruments),
    };
    let payload = serde_json::to_string(&response).map_err(|e| e.to_string())?;
    outgoing.push_str(&push(Channel::SubscriptionSuccessful, payload));
    info!("Subscription {} created for {:?}", id, response.instrument_ids);

    subscriptions.push(ActiveSubscription {
        id,
        events: events_rx,
    });
    Ok(())
}

fn drain_quotes(
    subscriptions: &[ActiveSubscription],
    outgoing: &mut String,
) -> Result<StreamEnd> {
    for subscription in subscriptions {
        while let Ok(event) = subscription.events.try_recv() {
            match event {
                QuoteEvent::Quotes(data) => {
                    let notification = SubscriptionNotification {
                        subscription_id: subscription.id.clone(),
                        data,
                    };
                    let payload = serde_json::to_string(&notification)?;
                    outgoing.push_str(&push(Channel::SubscriptionNotification, payload));
                }
                QuoteEvent::Shutdown => return Ok(StreamEnd::Shutdown),
            }
        }
    }
    Ok(StreamEnd::Continue)
}

/// Server-to-client invocation carrying `payload` as a JSON string argument.
fn push(channel: Channel, payload: String) -> String {
    HubMessage::Invocation {
        invocation_id: None,
        target: channel.to_string(),
        arguments: vec![Value::String(payload)],
    }
    .encode()
}
