//! Write dispatcher: the bounded frame queue and the single writer task.
//!
//! Callers push frames into a bounded `mpsc` channel; one worker drains it
//! in FIFO order and writes each frame to whatever port is current at that
//! moment.  Because there is exactly one consumer, frames reach the wire in
//! exactly the order they were accepted into the queue.
//!
//! A full queue blocks the caller, not the worker.  The wait ends when space
//! frees up, the caller's [`CancelToken`] fires, or the bridge shuts down.

use std::sync::Arc;

use keybridge_core::Frame;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::error::DeviceError;
use super::signal::{CancelToken, Signal};
use super::supervisor::{ActivePort, Supervisor};

/// Producer side of the outbound frame queue.
#[derive(Debug, Clone)]
pub struct FrameQueue {
    tx: mpsc::Sender<Frame>,
    shutdown: Signal,
}

impl FrameQueue {
    /// Creates a queue holding at most `capacity` frames (at least one).
    pub fn new(capacity: usize, shutdown: Signal) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx, shutdown }, rx)
    }

    /// Queues `frame`, waiting for space if the queue is full.
    ///
    /// # Errors
    ///
    /// - [`DeviceError::Closed`] if shutdown is raised before or during the wait.
    /// - [`DeviceError::Canceled`] if `cancel` fires first.
    pub async fn enqueue(&self, frame: Frame, cancel: &CancelToken) -> Result<(), DeviceError> {
        if self.shutdown.is_triggered() {
            return Err(DeviceError::Closed);
        }
        if let Some(reason) = cancel.reason() {
            return Err(DeviceError::Canceled(reason));
        }

        tokio::select! {
            biased;
            _ = self.shutdown.triggered() => Err(DeviceError::Closed),
            reason = cancel.cancelled() => Err(DeviceError::Canceled(reason)),
            permit = self.tx.reserve() => match permit {
                Ok(permit) => {
                    permit.send(frame);
                    Ok(())
                }
                Err(_) => Err(DeviceError::Closed),
            },
        }
    }
}

/// Drains the queue until shutdown, writing each frame to the current port.
///
/// A frame dequeued while no port is connected is dropped.  A failed write
/// drops the frame and disconnects the port; it is never retried.
pub async fn write_worker(supervisor: Arc<Supervisor>, mut rx: mpsc::Receiver<Frame>, shutdown: Signal) {
    loop {
        let frame = tokio::select! {
            biased;
            _ = shutdown.triggered() => break,
            frame = rx.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };
        write_one(&supervisor, &frame).await;
    }
    debug!("write dispatcher stopped");
}

async fn write_one(supervisor: &Supervisor, frame: &Frame) {
    let Some(port) = supervisor.current_port() else {
        debug!("dropping frame {:02X?}: device not connected", frame.as_bytes());
        return;
    };
    write_to(supervisor, &port, frame).await;
}

async fn write_to(supervisor: &Supervisor, port: &ActivePort, frame: &Frame) {
    if let Err(e) = port.write_frame(frame).await {
        // A port already cleared by the reader leaves `disconnect` silent.
        if !supervisor.disconnect(port, &e) && !supervisor.shutdown_signal().is_triggered() {
            warn!(port = %port.name(), error = %e, "write failed, frame dropped");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
