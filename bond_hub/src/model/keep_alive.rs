//! Keep-alive tracker for hub connections.
//!
//! Every connection registers with a stop channel and refreshes its entry whenever
//! it receives a record from the client. `check_timeouts` removes connections that
//! stayed silent longer than the timeout and signals them to close.
//!
//! Design notes:
//! - Time is measured using `std::time::Instant`, which is monotonic and immune to system
//!   clock changes.
//! - The monitor is not synchronized; share it behind a `Mutex`.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;
use log::debug;

/// Internal bookkeeping for a client connection.
struct TrackedConnection {
    last_seen: Instant,
    stop: Sender<()>,
}

/// Tracks client activity and closes silent connections.
pub struct KeepAliveMonitor {
    /// Connections by id with their last activity and stop signal.
    connections: HashMap<u64, TrackedConnection>,
    /// Silence after which a connection is considered gone.
    timeout: Duration,
}

impl KeepAliveMonitor {
    /// Create a monitor that tolerates `timeout` of silence.
    pub fn new(timeout: Duration) -> Self {
        Self {
            connections: HashMap::new(),
            timeout,
        }
    }

    /// Start tracking connection `id`.
    pub fn register(&mut self, id: u64, stop: Sender<()>) {
        self.connections.insert(
            id,
            TrackedConnection {
                last_seen: Instant::now(),
                stop,
            },
        );
    }

    /// Record activity from connection `id`.
    pub fn touch(&mut self, id: u64) {
        if let Some(connection) = self.connections.get_mut(&id) {
            connection.last_seen = Instant::now();
        }
    }

    /// Stop tracking connection `id`.
    pub fn remove(&mut self, id: u64) {
        self.connections.remove(&id);
    }

    /// Signal and drop every connection silent for longer than the timeout.
    pub fn check_timeouts(&mut self) -> Vec<u64> {
        let now = Instant::now();
        let timeout = self.timeout;
        let mut timed_out = Vec::new();

        self.connections.retain(|id, connection| {
            if now.duration_since(connection.last_seen) > timeout {
                debug!("Connection {} silent for more than {:?}", id, timeout);
                let _ = connection.stop.send(());
                timed_out.push(*id);
                false
            } else {
                true
            }
        });
        timed_out
    }

    /// Whether connection `id` is still tracked.
    pub fn is_tracked(&self, id: u64) -> bool {
        self.connections.contains_key(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use std::thread;

    #[test]
    fn test_silent_connection_is_stopped() {
        let mut monitor = KeepAliveMonitor::new(Duration::from_millis(20));
        let (stop_tx, stop_rx) = unbounded();
        monitor.register(1, stop_tx);
        assert!(monitor.check_timeouts().is_empty());

        thread::sleep(Duration::from_millis(40));
        assert_eq!(monitor.check_timeouts(), vec![1]);
        assert!(stop_rx.try_recv().is_ok());
        assert!(!monitor.is_tracked(1));
        assert!(monitor.check_timeouts().is_empty());
    }

    #[test]
    fn test_touch_keeps_connection_alive() {
        let mut monitor = KeepAliveMonitor::new(Duration::from_millis(50));
        let (stop_tx, stop_rx) = unbounded();
        monitor.register(7, stop_tx);
        for _ in 0..4 {
            thread::sleep(Duration::from_millis(20));
            monitor.touch(7);
            assert!(monitor.check_timeouts().is_empty());
        }
        assert!(stop_rx.try_recv().is_err());
        monitor.remove(7);
        assert!(!monitor.is_tracked(7));
    }
}
