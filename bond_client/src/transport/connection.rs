//! WebSocket hub connection with keep-alive and automatic reconnect.
//!
//! `HubConnection::start` negotiates, opens the WebSocket and completes the protocol
//! handshake on the caller's thread, then hands the socket to a dedicated I/O thread.
//! That thread owns the socket exclusively: it polls for inbound frames using the
//! stream read timeout and, between polls, writes whatever `invoke` queued on the
//! outbound channel. Inbound invocations are dispatched to the registered handlers in
//! arrival order, so deliveries on one channel keep the order the hub sent them.
//!
//! Lifecycle of the I/O thread:
//! - connection lost (socket error, close frame, server timeout, `Close` message that
//!   allows reconnecting) → pending invocations fail, then reconnect attempts follow
//!   the configured delay schedule; handlers are kept.
//! - schedule exhausted or `Close` without reconnect → the thread ends, disconnected.
//! - `stop` → the socket is closed and the thread joined.
use std::collections::HashMap;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bond_common::protocol::{
    self, HandshakeRequest, HandshakeResponse, HubMessage, Incoming, RECORD_SEPARATOR,
};
use bond_common::{MonitorError, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded, unbounded};
use log::{debug, error, info, warn};
use serde_json::Value;
use tungstenite::client::IntoClientRequest;
use tungstenite::http::HeaderValue;
use tungstenite::http::header::AUTHORIZATION;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::WebSocket;
use url::Url;

use crate::transport::config::HubConfig;
use crate::transport::negotiate;
use crate::transport::{Handler, HubTransport};

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

/// Why the I/O loop left a connected socket.
#[derive(Debug)]
enum Disconnect {
    Stopped,
    Lost { cause: String, allow_reconnect: bool },
}

struct PendingInvocation {
    target: String,
    reply: Sender<Result<Value>>,
}

struct Inner {
    config: HubConfig,
    handlers: RwLock<HashMap<String, Handler>>,
    pending: Mutex<HashMap<String, PendingInvocation>>,
    outbound_tx: Sender<String>,
    outbound_rx: Receiver<String>,
    connected: AtomicBool,
    stopping: AtomicBool,
    next_invocation_id: AtomicU64,
    generation: AtomicU64,
}

/// Hub client connection implementing `HubTransport`.
pub struct HubConnection {
    inner: Arc<Inner>,
    started: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl HubConnection {
    /// Build an unconnected connection; fails if the endpoint URL is unusable.
    pub fn new(config: HubConfig) -> Result<Self> {
        let endpoint = Url::parse(&config.url)?;
        negotiate::websocket_url(&endpoint, None)?;

        let (outbound_tx, outbound_rx) = unbounded();
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                handlers: RwLock::new(HashMap::new()),
                pending: Mutex::new(HashMap::new()),
                outbound_tx,
                outbound_rx,
                connected: AtomicBool::new(false),
                stopping: AtomicBool::new(false),
                next_invocation_id: AtomicU64::new(0),
                generation: AtomicU64::new(0),
            }),
            started: AtomicBool::new(false),
            worker: Mutex::new(None),
        })
    }

    /// Endpoint this connection targets.
    pub fn url(&self) -> &str {
        &self.inner.config.url
    }

    /// Whether the socket is currently up.
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }
}

impl HubTransport for HubConnection {
    fn on(&self, channel: &str, handler: Handler) -> Result<()> {
        let previous = self
            .inner
            .handlers
            .write()?
            .insert(channel.to_string(), handler);
        if previous.is_some() {
            warn!("Replacing handler for hub method '{}'", channel);
        }
        Ok(())
    }

    fn start(&self) -> Result<()> {
        if self.inner.stopping.load(Ordering::SeqCst) {
            return Err(MonitorError::ConnectionClosed(
                "connection has been stopped".to_string(),
            ));
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(MonitorError::Format("connection already started".to_string()));
        }

        info!("Connecting to hub at {}", self.inner.config.url);
        let (mut socket, leftover) = match open(&self.inner.config) {
            Ok(opened) => opened,
            Err(e) => {
                self.started.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };
        self.inner.mark_connected();
        if let Some(disconnect) = self.inner.dispatch_frame(&leftover) {
            self.inner.connected.store(false, Ordering::SeqCst);
            self.started.store(false, Ordering::SeqCst);
            if let Err(e) = socket.close(None).and_then(|_| socket.flush()) {
                debug!("Error while closing hub socket: {}", e);
            }
            let cause = match disconnect {
                Disconnect::Lost { cause, .. } => cause,
                Disconnect::Stopped => "connection stopped".to_string(),
            };
            warn!("Hub closed the connection during start: {}", cause);
            return Err(MonitorError::ConnectionClosed(cause));
        }

        let inner = Arc::clone(&self.inner);
        let handle = thread::Builder::new()
            .name("hub-connection".to_string())
            .spawn(move || inner.run(socket))?;
        *self.worker.lock()? = Some(handle);
        info!("Hub connection to {} started", self.inner.config.url);
        Ok(())
    }

    fn invoke(&self, request: &str, arguments: Vec<Value>) -> Result<Value> {
        if !self.is_connected() {
            return Err(MonitorError::NotConnected);
        }
        let invocation_id = self
            .inner
            .next_invocation_id
            .fetch_add(1, Ordering::SeqCst)
            .to_string();
        let generation = self.inner.generation.load(Ordering::SeqCst);
        let (reply_tx, reply_rx) = bounded(1);
        self.inner.pending.lock()?.insert(
            invocation_id.clone(),
            PendingInvocation {
                target: request.to_string(),
                reply: reply_tx,
            },
        );

        let record = HubMessage::Invocation {
            invocation_id: Some(invocation_id.clone()),
            target: request.to_string(),
            arguments,
        }
        .encode();
        debug!("Queueing invocation {} of {}", invocation_id, request);
        self.inner
            .outbound_tx
            .send(record)
            .map_err(|e| MonitorError::ChannelSend(e.to_string()))?;

        loop {
            match reply_rx.recv_timeout(self.inner.config.poll_interval) {
                Ok(reply) => return reply,
                Err(RecvTimeoutError::Timeout) => {
                    let same_connection = self.is_connected()
                        && self.inner.generation.load(Ordering::SeqCst) == generation;
                    if !same_connection {
                        self.inner.pending.lock()?.remove(&invocation_id);
                        if let Ok(reply) = reply_rx.try_recv() {
                            return reply;
                        }
                        return Err(MonitorError::ConnectionClosed(format!(
                            "connection lost before {} completed",
                            request
                        )));
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(MonitorError::ConnectionClosed(format!(
                        "invocation of {} abandoned",
                        request
                    )));
                }
            }
        }
    }

    fn stop(&self) -> Result<()> {
        if self.inner.stopping.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let worker = self.worker.lock()?.take();
        if let Some(worker) = worker {
            if worker.join().is_err() {
                error!("Hub connection thread panicked");
            }
        }
        self.inner.connected.store(false, Ordering::SeqCst);
        self.inner.fail_pending("connection stopped");
        info!("Hub connection to {} stopped", self.inner.config.url);
        Ok(())
    }
}

impl Drop for HubConnection {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            error!("Failed to stop hub connection: {}", e);
        }
    }
}

impl Inner {
    fn mark_connected(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.connected.store(true, Ordering::SeqCst);
    }

    fn run(self: Arc<Self>, mut socket: Socket) {
        loop {
            let outcome = self.pump(&mut socket);
            self.connected.store(false, Ordering::SeqCst);
            self.fail_pending("connection lost");
            while self.outbound_rx.try_recv().is_ok() {}

            match outcome {
                Disconnect::Stopped => {
                    if let Err(e) = socket.close(None).and_then(|_| socket.flush()) {
                        debug!("Error while closing hub socket: {}", e);
                    }
                    return;
                }
                Disconnect::Lost {
                    cause,
                    allow_reconnect,
                } => {
                    warn!("Connection to {} lost: {}", self.config.url, cause);
                    if let Err(e) = socket.close(None).and_then(|_| socket.flush()) {
                        debug!("Error while closing lost hub socket: {}", e);
                    }
                    if !allow_reconnect {
                        info!("Hub does not allow reconnecting; connection closed");
                        return;
                    }
                    match self.reconnect() {
                        Some(reopened) => socket = reopened,
                        None => return,
                    }
                }
            }
        }
    }

    fn pump(&self, socket: &mut Socket) -> Disconnect {
        let mut last_received = Instant::now();
        let mut last_sent = Instant::now();

        loop {
            if self.stopping.load(Ordering::SeqCst) {
                return Disconnect::Stopped;
            }

            let mut batch = String::new();
            while let Ok(record) = self.outbound_rx.try_recv() {
                batch.push_str(&record);
            }
            if batch.is_empty() && last_sent.elapsed() >= self.config.keep_alive_interval {
                batch = HubMessage::Ping.encode();
            }
            if !batch.is_empty() {
                if let Err(e) = protocol::send_records(socket, batch) {
                    return Disconnect::Lost {
                        cause: e.to_string(),
                        allow_reconnect: true,
                    };
                }
                last_sent = Instant::now();
            }

            match protocol::read_incoming(socket) {
                Ok(Incoming::Text(text)) => {
                    last_received = Instant::now();
                    if let Some(disconnect) = self.dispatch_frame(&text) {
                        return disconnect;
                    }
                }
                Ok(Incoming::Idle) => {
                    if last_received.elapsed() >= self.config.server_timeout {
                        return Disconnect::Lost {
                            cause: format!(
                                "no message from the server within {:?}",
                                self.config.server_timeout
                            ),
                            allow_reconnect: true,
                        };
                    }
                }
                Ok(Incoming::Closed(reason)) => {
                    return Disconnect::Lost {
                        cause: format!("socket closed ({})", reason.unwrap_or_default()),
                        allow_reconnect: true,
                    };
                }
                Err(e) => {
                    return Disconnect::Lost {
                        cause: e.to_string(),
                        allow_reconnect: true,
                    };
                }
            }
        }
    }

    fn reconnect(&self) -> Option<Socket> {
        let attempts = self.config.reconnect_delays.len();
        for (attempt, delay) in self.config.reconnect_delays.iter().enumerate() {
            if self.sleep_unless_stopping(*delay) {
                return None;
            }
            info!(
                "Reconnecting to {} (attempt {} of {})",
                self.config.url,
                attempt + 1,
                attempts
            );
            match open(&self.config) {
                Ok((socket, leftover)) => {
                    self.mark_connected();
                    info!("Reconnected to {}", self.config.url);
                    if let Some(disconnect) = self.dispatch_frame(&leftover) {
                        warn!("Hub closed the connection right after reconnecting: {:?}", disconnect);
                    }
                    return Some(socket);
                }
                Err(e) => warn!("Reconnect attempt {} failed: {}", attempt + 1, e),
            }
        }
        if attempts > 0 {
            error!(
                "Giving up on {} after {} reconnect attempt(s)",
                self.config.url, attempts
            );
        }
        None
    }

    /// Returns `true` when `stop` was requested while waiting.
    fn sleep_unless_stopping(&self, delay: Duration) -> bool {
        let deadline = Instant::now() + delay;
        loop {
            if self.stopping.load(Ordering::SeqCst) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            thread::sleep((deadline - now).min(self.config.poll_interval));
        }
    }

    fn dispatch_frame(&self, frame: &str) -> Option<Disconnect> {
        for record in protocol::split_records(frame) {
            match HubMessage::parse(record) {
                Ok(HubMessage::Invocation {
                    invocation_id,
                    target,
                    arguments,
                }) => {
                    self.deliver(&target, &arguments);
                    if let Some(invocation_id) = invocation_id {
                        self.refuse_client_result(invocation_id, &target);
                    }
                }
                Ok(HubMessage::Completion {
                    invocation_id,
                    result,
                    error,
                }) => self.complete(&invocation_id, result, error),
                Ok(HubMessage::Ping) => debug!("Ping received"),
                Ok(HubMessage::Close {
                    error,
                    allow_reconnect,
                }) => {
                    return Some(Disconnect::Lost {
                        cause: error
                            .unwrap_or_else(|| "server closed the connection".to_string()),
                        allow_reconnect,
                    });
                }
                Ok(other) => warn!("Ignoring unsupported hub message {:?}", other),
                Err(e) => warn!("Failed to parse hub message: {} ({})", e, record),
            }
        }
        None
    }

    fn deliver(&self, target: &str, arguments: &[Value]) {
        let handlers = match self.handlers.read() {
            Ok(handlers) => handlers,
            Err(e) => {
                error!("Handler registry unavailable: {}", e);
                return;
            }
        };
        match handlers.get(target) {
            Some(handler) => {
                let payload = match arguments.first() {
                    Some(Value::String(text)) => text.clone(),
                    Some(other) => other.to_string(),
                    None => String::new(),
                };
                handler(&payload);
            }
            None => warn!("No handler registered for hub method '{}'", target),
        }
    }

    fn refuse_client_result(&self, invocation_id: String, target: &str) {
        let record = HubMessage::Completion {
            invocation_id,
            result: None,
            error: Some(format!("Client does not return results for '{}'", target)),
        }
        .encode();
        if let Err(e) = self.outbound_tx.send(record) {
            warn!("Could not queue completion for {}: {}", target, e);
        }
    }

    fn complete(&self, invocation_id: &str, result: Option<Value>, error: Option<String>) {
        let pending = match self.pending.lock() {
            Ok(mut pending) => pending.remove(invocation_id),
            Err(e) => {
                error!("Pending invocation table unavailable: {}", e);
                return;
            }
        };
        let Some(pending) = pending else {
            debug!("Completion for unknown invocation {}", invocation_id);
            return;
        };
        let reply = match error {
            Some(reason) => Err(MonitorError::Invocation {
                target: pending.target,
                reason,
            }),
            None => Ok(result.unwrap_or(Value::Null)),
        };
        // The caller may have given up already.
        let _ = pending.reply.send(reply);
    }

    fn fail_pending(&self, cause: &str) {
        let drained: Vec<PendingInvocation> = match self.pending.lock() {
            Ok(mut pending) => pending.drain().map(|(_, invocation)| invocation).collect(),
            Err(e) => {
                error!("Pending invocation table unavailable: {}", e);
                return;
            }
        };
        for invocation in drained {
            let _ = invocation
                .reply
                .send(Err(MonitorError::ConnectionClosed(cause.to_string())));
        }
    }
}

/// Negotiate, open the WebSocket and run the protocol handshake.
///
/// TCP connect, WebSocket upgrade and handshake share one deadline of
/// `handshake_timeout`. Returns the socket and whatever records followed the
/// handshake response.
fn open(config: &HubConfig) -> Result<(Socket, String)> {
    let target = negotiate::resolve_target(config)?;
    let deadline = Instant::now() + config.handshake_timeout;
    let stream = connect_before(&target.url, deadline)?;
    let control = stream.try_clone()?;
    control.set_read_timeout(Some(remaining(deadline)?))?;
    control.set_write_timeout(Some(remaining(deadline)?))?;

    let mut request = target.url.as_str().into_client_request()?;
    if let Some(token) = &target.access_token {
        let value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| MonitorError::Format(format!("invalid access token: {}", e)))?;
        request.headers_mut().insert(AUTHORIZATION, value);
    }

    let (mut socket, _) = tungstenite::client_tls(request, stream)
        .map_err(|e| MonitorError::Handshake(format!("WebSocket upgrade failed: {}", e)))?;
    control.set_read_timeout(Some(config.poll_interval.min(remaining(deadline)?)))?;
    debug!("WebSocket open to {}", target.url);

    let leftover = handshake(&mut socket, deadline)?;
    control.set_read_timeout(Some(config.poll_interval))?;
    control.set_write_timeout(Some(config.server_timeout))?;
    Ok((socket, leftover))
}

/// Time left before `deadline`; an error once it has passed.
fn remaining(deadline: Instant) -> Result<Duration> {
    let left = deadline.saturating_duration_since(Instant::now());
    if left.is_zero() {
        return Err(MonitorError::Handshake(
            "connection attempt timed out".to_string(),
        ));
    }
    Ok(left)
}

fn connect_before(url: &Url, deadline: Instant) -> Result<TcpStream> {
    let mut last_error = None;
    for address in url.socket_addrs(|| None)? {
        match TcpStream::connect_timeout(&address, remaining(deadline)?) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!("TCP connect to {} failed: {}", address, e);
                last_error = Some(e);
            }
        }
    }
    Err(match last_error {
        Some(e) => e.into(),
        None => MonitorError::Format(format!("{} resolves to no address", url)),
    })
}

fn handshake(socket: &mut Socket, deadline: Instant) -> Result<String> {
    protocol::send_records(socket, HandshakeRequest::json().encode()?)?;
    let mut buffer = String::new();

    loop {
        match protocol::read_incoming(socket)? {
            Incoming::Text(text) => {
                buffer.push_str(&text);
                if buffer.contains(RECORD_SEPARATOR) {
                    let (response, rest): (HandshakeResponse, &str) =
                        protocol::split_handshake(&buffer)?;
                    if let Some(error) = response.error {
                        return Err(MonitorError::Handshake(error));
                    }
                    debug!("Handshake accepted");
                    return Ok(rest.to_string());
                }
            }
            Incoming::Idle => {}
            Incoming::Closed(reason) => {
                return Err(MonitorError::Handshake(format!(
                    "socket closed during handshake ({})",
                    reason.unwrap_or_default()
                )));
            }
        }
        if Instant::now() >= deadline {
            return Err(MonitorError::Handshake(
                "no handshake response in time".to_string(),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::net::{SocketAddr, TcpListener};
    use tungstenite::Message;

    fn connection() -> HubConnection {
        HubConnection::new(
            HubConfig::new("http://127.0.0.1:1/hub")
                .with_skip_negotiation(true)
                .without_reconnect(),
        )
        .unwrap()
    }

    fn config_for(addr: SocketAddr) -> HubConfig {
        HubConfig::new(format!("http://{}/hub", addr))
            .with_skip_negotiation(true)
            .with_poll_interval(Duration::from_millis(10))
            .with_handshake_timeout(Duration::from_secs(2))
    }

    /// Accept one client, complete the upgrade and answer its handshake.
    fn accept_client(listener: &TcpListener) -> WebSocket<TcpStream> {
        let (stream, _) = listener.accept().unwrap();
        let mut socket = tungstenite::accept(stream).unwrap();
        loop {
            if let Message::Text(text) = socket.read().unwrap() {
                assert!(text.as_str().contains("\"protocol\":\"json\""));
                break;
            }
        }
        socket
    }

    fn read_until_closed(socket: &mut WebSocket<TcpStream>) {
        while socket.read().is_ok() {}
    }

    #[test]
    fn test_silent_peer_fails_start_within_handshake_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let peer = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            thread::sleep(Duration::from_secs(3));
            drop(stream);
        });

        let connection = HubConnection::new(
            config_for(addr)
                .without_reconnect()
                .with_handshake_timeout(Duration::from_millis(300)),
        )
        .unwrap();
        let started = Instant::now();
        let result = connection.start();

        assert!(matches!(result, Err(MonitorError::Handshake(_))), "{:?}", result);
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(!connection.is_connected());
        connection.stop().unwrap();
        peer.join().unwrap();
    }

    #[test]
    fn test_close_after_handshake_fails_start() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let peer = thread::spawn(move || {
            let mut socket = accept_client(&listener);
            let close = HubMessage::Close {
                error: Some("hub restarting".to_string()),
                allow_reconnect: false,
            }
            .encode();
            socket.send(Message::text(format!("{{}}\u{1e}{}", close))).unwrap();
            read_until_closed(&mut socket);
        });

        let connection = HubConnection::new(config_for(addr).without_reconnect()).unwrap();
        let result = connection.start();

        assert!(
            matches!(result, Err(MonitorError::ConnectionClosed(ref cause)) if cause == "hub restarting"),
            "{:?}",
            result
        );
        assert!(!connection.is_connected());
        assert!(matches!(
            connection.invoke("SubscribeToInstruments", vec![]),
            Err(MonitorError::NotConnected)
        ));
        peer.join().unwrap();
    }

    #[test]
    fn test_reconnect_fails_pending_and_keeps_handlers() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let peer = thread::spawn(move || {
            let mut first = accept_client(&listener);
            first.send(Message::text("{}\u{1e}")).unwrap();
            loop {
                match first.read() {
                    Ok(Message::Text(text)) if text.as_str().contains("\"type\":1") => break,
                    Ok(_) => continue,
                    Err(e) => panic!("client went away: {}", e),
                }
            }
            let close = HubMessage::Close {
                error: Some("restarting".to_string()),
                allow_reconnect: true,
            };
            first.send(Message::text(close.encode())).unwrap();
            read_until_closed(&mut first);

            let mut second = accept_client(&listener);
            second.send(Message::text("{}\u{1e}")).unwrap();
            let push = HubMessage::Invocation {
                invocation_id: None,
                target: "SubscriptionSuccessful".to_string(),
                arguments: vec![json!("after reconnect")],
            };
            second.send(Message::text(push.encode())).unwrap();
            read_until_closed(&mut second);
        });

        let connection = HubConnection::new(
            config_for(addr)
                .with_automatic_reconnect(vec![Duration::ZERO, Duration::from_millis(50)]),
        )
        .unwrap();
        let (tx, rx) = unbounded::<String>();
        connection
            .on(
                "SubscriptionSuccessful",
                Box::new(move |payload: &str| {
                    let _ = tx.send(payload.to_string());
                }),
            )
            .unwrap();
        connection.start().unwrap();

        let pending = connection.invoke("SubscribeToInstruments", vec![json!(["X"])]);
        assert!(
            matches!(pending, Err(MonitorError::ConnectionClosed(_))),
            "{:?}",
            pending
        );
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            "after reconnect"
        );
        assert!(connection.is_connected());

        connection.stop().unwrap();
        peer.join().unwrap();
    }

    #[test]
    fn test_pings_then_drops_silent_server() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (seen_tx, seen_rx) = unbounded::<String>();
        let peer = thread::spawn(move || {
            let mut socket = accept_client(&listener);
            socket.send(Message::text("{}\u{1e}")).unwrap();
            while let Ok(message) = socket.read() {
                if let Message::Text(text) = message {
                    let _ = seen_tx.send(text.as_str().to_string());
                }
            }
        });

        let connection = HubConnection::new(
            config_for(addr)
                .without_reconnect()
                .with_keep_alive_interval(Duration::from_millis(50))
                .with_server_timeout(Duration::from_millis(400)),
        )
        .unwrap();
        connection.start().unwrap();

        let ping = seen_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(ping, "{\"type\":6}\u{1e}");

        let deadline = Instant::now() + Duration::from_secs(3);
        while connection.is_connected() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(!connection.is_connected());
        connection.stop().unwrap();
        peer.join().unwrap();
    }

    #[test]
    fn test_new_rejects_bad_urls() {
        assert!(matches!(
            HubConnection::new(HubConfig::new("not a url")),
            Err(MonitorError::Url(_))
        ));
        assert!(HubConnection::new(HubConfig::new("ftp://host/hub")).is_err());
    }

    #[test]
    fn test_invoke_before_start_is_not_connected() {
        let connection = connection();
        assert!(matches!(
            connection.invoke("SubscribeToInstruments", vec![]),
            Err(MonitorError::NotConnected)
        ));
    }

    #[test]
    fn test_dispatch_routes_string_argument_unwrapped() {
        let connection = connection();
        let (tx, rx) = unbounded::<String>();
        connection
            .on(
                "SubscriptionSuccessful",
                Box::new(move |payload: &str| {
                    tx.send(payload.to_string()).unwrap();
                }),
            )
            .unwrap();

        let frame = "{\"type\":1,\"target\":\"SubscriptionSuccessful\",\"arguments\":[\"{\\\"SubscriptionId\\\":\\\"S1\\\"}\"]}\u{1e}\
                     {\"type\":1,\"target\":\"SubscriptionSuccessful\",\"arguments\":[{\"SubscriptionId\":\"S2\"}]}\u{1e}";
        assert!(connection.inner.dispatch_frame(frame).is_none());

        assert_eq!(rx.try_recv().unwrap(), "{\"SubscriptionId\":\"S1\"}");
        assert_eq!(rx.try_recv().unwrap(), "{\"SubscriptionId\":\"S2\"}");
    }

    #[test]
    fn test_dispatch_completion_and_close() {
        let connection = connection();
        let (reply, replies) = bounded(1);
        connection.inner.pending.lock().unwrap().insert(
            "0".to_string(),
            PendingInvocation {
                target: "SubscribeToInstruments".to_string(),
                reply,
            },
        );

        let frame = "{\"type\":3,\"invocationId\":\"0\",\"error\":\"rejected\"}\u{1e}\
                     {\"type\":7,\"error\":\"maintenance\"}\u{1e}";
        match connection.inner.dispatch_frame(frame) {
            Some(Disconnect::Lost {
                cause,
                allow_reconnect,
            }) => {
                assert_eq!(cause, "maintenance");
                assert!(!allow_reconnect);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(matches!(
            replies.try_recv().unwrap(),
            Err(MonitorError::Invocation { ref reason, .. }) if reason == "rejected"
        ));
    }

    #[test]
    fn test_server_invocation_with_id_is_refused() {
        let connection = connection();
        let frame = "{\"type\":1,\"invocationId\":\"9\",\"target\":\"Unknown\",\"arguments\":[]}\u{1e}";
        connection.inner.dispatch_frame(frame);
        let queued = connection.inner.outbound_rx.try_recv().unwrap();
        let message = HubMessage::parse(queued.trim_end_matches(RECORD_SEPARATOR)).unwrap();
        assert!(matches!(message, HubMessage::Completion { ref invocation_id, error: Some(_), .. } if invocation_id == "9"));
    }

    #[test]
    fn test_start_failure_then_stop_is_idempotent() {
        let connection = connection();
        assert!(connection.start().is_err());
        assert!(!connection.is_connected());
        connection.stop().unwrap();
        connection.stop().unwrap();
        assert!(connection.start().is_err());
    }
}
