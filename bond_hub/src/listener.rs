use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use bond_common::Result;
use log::{debug, error, info};

/// TCP listener that accepts hub clients until asked to stop.
///
/// The socket is non-blocking so the accept loop can observe the shutdown flag;
/// accepted streams are switched back to blocking before they are handed out.
pub struct HubListener {
    socket: TcpListener,
}

impl HubListener {
    /// Bind to `bind_addr` (e.g. `127.0.0.1:8802`, port 0 for an ephemeral port).
    pub fn bind(bind_addr: &str) -> Result<Self> {
        let socket = TcpListener::bind(bind_addr)?;
        socket.set_nonblocking(true)?;
        Ok(Self { socket })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Accept connections until `shutdown` is set, passing each one to `on_accept`.
    ///
    /// A failure on a single connection is logged and does not stop the loop.
    pub fn accept_loop<F>(&self, shutdown: &AtomicBool, poll: Duration, mut on_accept: F) -> Result<()>
    where
        F: FnMut(TcpStream, SocketAddr),
    {
        info!("Hub listening on {}", self.socket.local_addr()?);

        while !shutdown.load(Ordering::SeqCst) {
            match self.socket.accept() {
                Ok((stream, peer)) => {
                    debug!("Accepted TCP connection from {}", peer);
                    if let Err(e) = stream.set_nonblocking(false) {
                        error!("Failed to configure stream from {}: {}", peer, e);
                        continue;
                    }
                    on_accept(stream, peer);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(poll),
                Err(e) => {
                    error!("TCP accept error: {}", e);
                    thread::sleep(poll);
                }
            }
        }
        info!("Hub listener stopped");
        Ok(())
    }
}
