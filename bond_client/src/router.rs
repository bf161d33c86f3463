//! Message router: channel deliveries → typed messages → message log.
//!
//! Each hub channel gets a handler that only tags the raw payload with its channel
//! and queues it. A single router thread drains that queue, decodes every frame and
//! appends the derived lines in one step. The transport dispatches from one thread,
//! so the queue keeps per-channel FIFO order.
//!
//! A payload that fails to decode is logged and skipped; the router keeps running.
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use bond_common::{Channel, InboundMessage, Result};
use crossbeam_channel::{Receiver, Sender, select, unbounded};
use log::{debug, error, info, warn};

use crate::model::state::SessionState;
use crate::transport::HubTransport;

/// Raw payload tagged with the channel it arrived on.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundFrame {
    pub channel: Channel,
    pub payload: String,
}

/// Handle to the running router thread.
pub struct Router {
    stop_tx: Sender<()>,
    worker: Option<JoinHandle<()>>,
}

impl Router {
    /// Register the channel handlers on `transport` and start the router thread.
    pub fn bind(transport: &dyn HubTransport, state: Arc<SessionState>) -> Result<Self> {
        let (frame_tx, frame_rx) = unbounded::<InboundFrame>();
        for channel in Channel::ALL {
            let tx = frame_tx.clone();
            transport.on(
                &channel.to_string(),
                Box::new(move |payload: &str| {
                    debug!("{} received {}", channel, payload);
                    let frame = InboundFrame {
                        channel,
                        payload: payload.to_string(),
                    };
                    if let Err(e) = tx.send(frame) {
                        warn!("Router stopped, dropping {} delivery: {}", channel, e);
                    }
                }),
            )?;
        }
        drop(frame_tx);

        let (stop_tx, stop_rx) = unbounded::<()>();
        let worker = thread::Builder::new()
            .name("hub-router".to_string())
            .spawn(move || route_frames(frame_rx, stop_rx, &state))?;
        Ok(Self {
            stop_tx,
            worker: Some(worker),
        })
    }

    /// Stop the router thread and wait for it.
    pub fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        let _ = self.stop_tx.send(());
        if worker.join().is_err() {
            error!("Router thread panicked");
        }
        info!("Router stopped");
    }
}

impl Drop for Router {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Router loop: applies frames until stopped or every handler is gone.
pub fn route_frames(frames: Receiver<InboundFrame>, stop: Receiver<()>, state: &SessionState) {
    loop {
        select! {
            recv(stop) -> _ => break,
            recv(frames) -> frame => match frame {
                Ok(frame) => {
                    apply_frame(state, &frame);
                }
                Err(_) => break,
            }
        }
    }
}

/// Decode one frame and append its lines; returns how many lines were appended.
pub fn apply_frame(state: &SessionState, frame: &InboundFrame) -> usize {
    let message = match InboundMessage::decode(frame.channel, &frame.payload) {
        Ok(message) => message,
        Err(e) => {
            warn!(
                "Skipping malformed {} payload: {} ({})",
                frame.channel, e, frame.payload
            );
            return 0;
        }
    };
    let lines = message.log_lines();
    let count = lines.len();
    if let Err(e) = state.append_messages(lines) {
        error!("Failed to append {} message: {}", frame.channel, e);
        return 0;
    }
    count
}
