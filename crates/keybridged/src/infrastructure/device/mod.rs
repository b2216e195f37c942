//! Serial device manager.
//!
//! [`DeviceManager`] is the only way the rest of the daemon talks to the
//! HID-injection device.  It owns three background tasks that run from
//! [`DeviceManager::start`] until [`DeviceManager::shutdown`]:
//!
//! ```text
//!   send_keyboard / send_consumer / send_vendor
//!        │ encode_frame
//!        ▼
//!   FrameQueue (bounded) ──► write_worker ──► current port ◄── Supervisor::run
//!                                                 │                (reconnect)
//!                                                 └──► log_read_loop ──► DeviceLogSink
//! ```
//!
//! The three tasks share nothing but the supervisor's port slot, the frame
//! queue and one shutdown [`Signal`].
//!
//! # Sub-modules
//!
//! - [`signal`]     – one-shot shutdown signal and caller cancellation tokens
//! - [`port`]       – port enumeration/open seam and the port locator
//! - [`supervisor`] – current-port slot and the reconnect loop
//! - [`dispatcher`] – bounded frame queue and the single writer task
//! - [`log_reader`] – device output reassembly and the log sink seam
//! - [`error`]      – [`DeviceError`]

pub mod dispatcher;
pub mod error;
pub mod log_reader;
pub mod port;
pub mod signal;
pub mod supervisor;

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use keybridge_core::{encode_frame, HidEvent, KeyboardFlags, ModifierFlags};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub use error::DeviceError;
pub use log_reader::{DeviceLogSink, TracingLogSink, DEVICE_LOG_TARGET};
pub use port::{locate_port, OpenedPort, PortInfo, PortKind, PortProvider, SystemPorts};
pub use signal::{CancelReason, CancelToken, Signal};
pub use supervisor::{ActivePort, Supervisor};

use crate::application::press_release::KeySender;
use crate::domain::DeviceConfig;
use dispatcher::FrameQueue;

/// Handle to the running device bridge.
///
/// Dropping the manager raises the shutdown signal but cannot wait for the
/// tasks; call [`DeviceManager::shutdown`] for an orderly stop.
pub struct DeviceManager {
    supervisor: Arc<Supervisor>,
    queue: FrameQueue,
    shutdown: Signal,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl DeviceManager {
    /// Spawns the supervisor, writer and log reader tasks.
    ///
    /// Must be called from inside a Tokio runtime.
    pub fn start(
        config: DeviceConfig,
        provider: Arc<dyn PortProvider>,
        sink: Arc<dyn DeviceLogSink>,
    ) -> Self {
        let shutdown = Signal::new();
        let (queue, rx) = FrameQueue::new(config.write_queue_capacity, shutdown.clone());
        info!(
            baud = config.baud_rate,
            queue = config.write_queue_capacity.max(1),
            "device manager starting for {}",
            config.hardware
        );
        let supervisor = Arc::new(Supervisor::new(config, provider, shutdown.clone()));

        let tasks = vec![
            tokio::spawn({
                let supervisor = Arc::clone(&supervisor);
                async move { supervisor.run().await }
            }),
            tokio::spawn(dispatcher::write_worker(
                Arc::clone(&supervisor),
                rx,
                shutdown.clone(),
            )),
            tokio::spawn(log_reader::log_read_loop(
                Arc::clone(&supervisor),
                sink,
                shutdown.clone(),
            )),
        ];

        Self {
            supervisor,
            queue,
            shutdown,
            tasks: Mutex::new(tasks),
        }
    }

    /// Starts against the host's real serial ports, logging device output
    /// through `tracing`.
    pub fn with_system_ports(config: DeviceConfig) -> Self {
        Self::start(config, Arc::new(SystemPorts), Arc::new(TracingLogSink))
    }

    pub fn is_connected(&self) -> bool {
        self.supervisor.is_connected()
    }

    /// OS name of the connected port, if any.
    pub fn port_name(&self) -> Option<String> {
        self.supervisor.current_port().map(|port| port.name().to_owned())
    }

    /// Queues a keyboard press or release.
    ///
    /// # Errors
    ///
    /// [`DeviceError::Closed`] after shutdown, [`DeviceError::NotConnected`]
    /// while no port is open, [`DeviceError::Canceled`] if `cancel` fires
    /// while the queue is full.
    pub async fn send_keyboard(
        &self,
        code: u8,
        modifiers: ModifierFlags,
        flags: KeyboardFlags,
        release: bool,
        cancel: &CancelToken,
    ) -> Result<(), DeviceError> {
        self.send(HidEvent::keyboard(code, modifiers, flags, release), cancel)
            .await
    }

    /// Queues a consumer-page press or release.
    pub async fn send_consumer(
        &self,
        usage: u16,
        release: bool,
        cancel: &CancelToken,
    ) -> Result<(), DeviceError> {
        self.send(HidEvent::consumer(usage, release), cancel).await
    }

    /// Queues a vendor-defined press or release.
    pub async fn send_vendor(
        &self,
        usage: u16,
        release: bool,
        cancel: &CancelToken,
    ) -> Result<(), DeviceError> {
        self.send(HidEvent::vendor(usage, release), cancel).await
    }

    async fn send(&self, event: HidEvent, cancel: &CancelToken) -> Result<(), DeviceError> {
        if self.shutdown.is_triggered() {
            return Err(DeviceError::Closed);
        }
        if !self.supervisor.is_connected() {
            return Err(DeviceError::NotConnected);
        }
        self.queue.enqueue(encode_frame(&event), cancel).await
    }

    /// Stops all background tasks and closes the port.
    ///
    /// Returns once every task has finished; no serial I/O happens after
    /// that.  Safe to call more than once.
    pub async fn shutdown(&self) {
        if self.shutdown.trigger() {
            info!("device manager shutting down");
        }
        self.supervisor.close_current();

        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        for task in tasks {
            if let Err(e) = task.await {
                warn!("device task ended abnormally: {e}");
            }
        }
        debug!("device manager stopped");
    }
}

impl Drop for DeviceManager {
    fn drop(&mut self) {
        self.shutdown.trigger();
        self.supervisor.close_current();
    }
}

#[async_trait]
impl KeySender for DeviceManager {
    async fn send_keyboard(
        &self,
        code: u8,
        modifiers: ModifierFlags,
        flags: KeyboardFlags,
        release: bool,
        cancel: CancelToken,
    ) -> Result<(), DeviceError> {
        DeviceManager::send_keyboard(self, code, modifiers, flags, release, &cancel).await
    }

    async fn send_consumer(
        &self,
        usage: u16,
        release: bool,
        cancel: CancelToken,
    ) -> Result<(), DeviceError> {
        DeviceManager::send_consumer(self, usage, release, &cancel).await
    }
}
