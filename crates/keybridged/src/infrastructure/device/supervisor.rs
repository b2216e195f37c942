//! Connection supervisor: owns the "current port" slot and keeps it filled.
//!
//! # Lifecycle of a port
//!
//! ```text
//!   list_ports ─► locate_port ─► open (with backoff) ─► publish ─► ActivePort
//!                                                                     │
//!        write error / read error / EOF / shutdown ◄──── disconnect ◄─┘
//! ```
//!
//! Every published port gets a fresh generation number.  A task that saw a
//! failure on generation `n` can only clear the slot while it still holds
//! generation `n`; a late report about a port that has already been replaced
//! is ignored, so a stale error never tears down a healthy reconnection.
//!
//! The slot itself sits behind a `std::sync::Mutex` that is held only for
//! pointer swaps, never across an `.await`.

use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use keybridge_core::Frame;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::error::DeviceError;
use super::port::{locate_port, OpenedPort, PortProvider, PortReader, PortWriter};
use super::signal::Signal;
use crate::domain::DeviceConfig;

// ── ActivePort ────────────────────────────────────────────────────────────────

/// A connected serial port and its close signal.
///
/// Reads and writes each sit behind their own async lock.  The write lock
/// guarantees one frame is written completely before the next one starts.
pub struct ActivePort {
    generation: u64,
    name: String,
    reader: tokio::sync::Mutex<PortReader>,
    writer: tokio::sync::Mutex<PortWriter>,
    closed: Signal,
}

impl ActivePort {
    pub(crate) fn new(generation: u64, name: String, opened: OpenedPort) -> Self {
        Self {
            generation,
            name,
            reader: tokio::sync::Mutex::new(opened.reader),
            writer: tokio::sync::Mutex::new(opened.writer),
            closed: Signal::new(),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// OS name of the port, e.g. `/dev/ttyUSB0`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_triggered()
    }

    /// Signal raised when this port is closed.
    pub fn closed(&self) -> &Signal {
        &self.closed
    }

    /// Marks the port closed and wakes any pending read or write on it.
    ///
    /// The OS handle is released once the last `Arc` is dropped.
    pub fn close(&self) -> bool {
        self.closed.trigger()
    }

    pub(crate) fn reader(&self) -> &tokio::sync::Mutex<PortReader> {
        &self.reader
    }

    /// Writes one frame in full and flushes it.
    ///
    /// # Errors
    ///
    /// [`DeviceError::WriteFailed`] if the write fails or the port is closed
    /// while waiting.
    pub async fn write_frame(&self, frame: &Frame) -> Result<(), DeviceError> {
        let write = async {
            let mut writer = self.writer.lock().await;
            writer.write_all(frame.as_bytes()).await?;
            writer.flush().await
        };
        tokio::select! {
            biased;
            _ = self.closed.triggered() => Err(DeviceError::WriteFailed(io::Error::new(
                io::ErrorKind::NotConnected,
                "port closed",
            ))),
            result = write => result.map_err(DeviceError::WriteFailed),
        }
    }
}

impl std::fmt::Debug for ActivePort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivePort")
            .field("generation", &self.generation)
            .field("name", &self.name)
            .field("closed", &self.is_closed())
            .finish()
    }
}

// ── Port slot ─────────────────────────────────────────────────────────────────

#[derive(Default)]
struct SlotState {
    current: Option<Arc<ActivePort>>,
    next_generation: u64,
}

/// The single "current port" cell shared by all background tasks.
#[derive(Default)]
struct PortSlot {
    state: Mutex<SlotState>,
}

impl PortSlot {
    fn lock(&self) -> MutexGuard<'_, SlotState> {
        // Only pointer swaps happen under this lock, so a poisoned guard
        // still holds a consistent value.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current(&self) -> Option<Arc<ActivePort>> {
        self.lock().current.clone()
    }

    /// Installs a newly opened port unless `shutdown` has been raised.
    ///
    /// The shutdown check happens under the slot lock so a concurrent
    /// [`PortSlot::take`] either sees the new port or this call sees the
    /// signal; a port can never be published after shutdown took the slot.
    fn publish(&self, name: String, opened: OpenedPort, shutdown: &Signal) -> Option<Arc<ActivePort>> {
        let mut state = self.lock();
        if shutdown.is_triggered() {
            return None;
        }
        state.next_generation += 1;
        let port = Arc::new(ActivePort::new(state.next_generation, name, opened));
        state.current = Some(Arc::clone(&port));
        Some(port)
    }

    /// Clears the slot only if it still holds `port`'s generation.
    fn clear_if_current(&self, port: &ActivePort) -> bool {
        let mut state = self.lock();
        match &state.current {
            Some(current) if current.generation == port.generation => {
                state.current = None;
                true
            }
            _ => false,
        }
    }

    fn take(&self) -> Option<Arc<ActivePort>> {
        self.lock().current.take()
    }
}

// ── Supervisor ────────────────────────────────────────────────────────────────

/// Finds, opens and re-opens the device's serial port.
pub struct Supervisor {
    config: DeviceConfig,
    provider: Arc<dyn PortProvider>,
    slot: PortSlot,
    shutdown: Signal,
}

impl Supervisor {
    pub fn new(config: DeviceConfig, provider: Arc<dyn PortProvider>, shutdown: Signal) -> Self {
        Self {
            config,
            provider,
            slot: PortSlot::default(),
            shutdown,
        }
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn shutdown_signal(&self) -> &Signal {
        &self.shutdown
    }

    /// Snapshot of the current port, if any.
    pub fn current_port(&self) -> Option<Arc<ActivePort>> {
        self.slot.current()
    }

    pub fn is_connected(&self) -> bool {
        self.current_port().is_some()
    }

    /// Makes one connection attempt.
    ///
    /// Returns the already-connected port without touching the OS if there is
    /// one.  Otherwise enumerates ports, picks the first VID/PID match, opens
    /// it with backoff and publishes it.
    ///
    /// # Errors
    ///
    /// - [`DeviceError::Closed`] once shutdown has been raised.
    /// - [`DeviceError::Enumerate`] if the port list cannot be read.
    /// - [`DeviceError::DeviceNotFound`] if no port matches.
    /// - [`DeviceError::OpenFailed`] if every open attempt failed.
    pub async fn try_connect(&self) -> Result<Arc<ActivePort>, DeviceError> {
        if self.shutdown.is_triggered() {
            return Err(DeviceError::Closed);
        }
        if let Some(port) = self.current_port() {
            return Ok(port);
        }

        let ports = self.provider.list_ports().await.map_err(DeviceError::Enumerate)?;
        let name = locate_port(&ports, self.config.hardware)?.to_owned();
        let opened = self.open_with_retry(&name).await?;

        let port = self
            .slot
            .publish(name, opened, &self.shutdown)
            .ok_or(DeviceError::Closed)?;
        info!(
            port = %port.name(),
            baud = self.config.baud_rate,
            generation = port.generation(),
            "connected to {}",
            self.config.hardware
        );
        Ok(port)
    }

    /// Opens `name`, sleeping `open_backoff_step * n` after failed attempt `n`.
    ///
    /// No delay follows the final attempt.
    async fn open_with_retry(&self, name: &str) -> Result<OpenedPort, DeviceError> {
        let attempts = self.config.open_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.provider.open(name, self.config.baud_rate).await {
                Ok(opened) => return Ok(opened),
                Err(source) if attempt >= attempts => {
                    return Err(DeviceError::OpenFailed {
                        port: name.to_owned(),
                        attempts,
                        source,
                    });
                }
                Err(e) => {
                    debug!(port = name, error = %e, "open attempt {attempt}/{attempts} failed");
                    let delay = self.config.open_backoff_step * attempt;
                    if !self.shutdown.sleep_or_triggered(delay).await {
                        return Err(DeviceError::Closed);
                    }
                    attempt += 1;
                }
            }
        }
    }

    /// Drops `port` from the slot after a failure on it.
    ///
    /// Returns `false` without side effects on the slot if `port` has
    /// already been replaced or cleared.  The port itself is closed either
    /// way.
    pub fn disconnect(&self, port: &ActivePort, cause: &DeviceError) -> bool {
        let cleared = self.slot.clear_if_current(port);
        port.close();
        if cleared && !self.shutdown.is_triggered() {
            warn!(port = %port.name(), error = %cause, "device disconnected");
        }
        cleared
    }

    /// Empties the slot and closes whatever port was in it.
    pub(crate) fn close_current(&self) {
        if let Some(port) = self.slot.take() {
            port.close();
            debug!("closed {}", port.name());
        }
    }

    /// Reconnect loop.  Runs until shutdown is raised.
    pub async fn run(&self) {
        let mut reporter = ConnectReporter::default();
        loop {
            if let Some(port) = self.current_port() {
                tokio::select! {
                    biased;
                    _ = self.shutdown.triggered() => break,
                    _ = port.closed().triggered() => {}
                    _ = tokio::time::sleep(self.config.idle_poll_interval) => {}
                }
                continue;
            }

            match self.try_connect().await {
                Ok(_) => reporter.reset(),
                Err(DeviceError::Closed) => break,
                Err(e) => {
                    if reporter.should_log(&e) {
                        warn!(error = %e, "device connect failed");
                    }
                    if !self
                        .shutdown
                        .sleep_or_triggered(self.config.reconnect_interval)
                        .await
                    {
                        break;
                    }
                }
            }
        }
        debug!("connection supervisor stopped");
    }
}

// ── Connect-failure log suppression ──────────────────────────────────────────

/// Decides which connect failures are worth a log line.
///
/// "Device not found" is reported once until the next successful connect.
/// Any other failure is reported when its text differs from the previous
/// failure's.
#[derive(Debug, Default)]
pub(crate) struct ConnectReporter {
    last_error: Option<String>,
    logged_not_found: bool,
}

impl ConnectReporter {
    pub(crate) fn should_log(&mut self, err: &DeviceError) -> bool {
        let text = err.to_string();
        let log = if matches!(err, DeviceError::DeviceNotFound(_)) {
            let first = !self.logged_not_found;
            self.logged_not_found = true;
            first
        } else {
            self.last_error.as_deref() != Some(text.as_str())
        };
        self.last_error = Some(text);
        log
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use keybridge_core::HardwareId;

    use super::*;
    use crate::infrastructure::device::port::PortInfo;

    /// Ports that fail to open a configurable number of times first.
    #[derive(Default)]
    struct ScriptedPorts {
        ports: Vec<PortInfo>,
        list_fails: AtomicBool,
        open_failures: AtomicU32,
        opens: AtomicU32,
        /// Raised from inside a successful `open`, before it returns.
        raise_on_open: Option<Signal>,
    }

    impl ScriptedPorts {
        fn with_device() -> Self {
            Self {
                ports: vec![PortInfo::usb("/dev/ttyUSB0", 0x0403, 0x6001)],
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl PortProvider for ScriptedPorts {
        async fn list_ports(&self) -> io::Result<Vec<PortInfo>> {
            if self.list_fails.load(Ordering::SeqCst) {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "udev"));
            }
            Ok(self.ports.clone())
        }

        async fn open(&self, _name: &str, _baud_rate: u32) -> io::Result<OpenedPort> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            let remaining = self.open_failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.open_failures.store(remaining - 1, Ordering::SeqCst);
                return Err(io::Error::new(io::ErrorKind::Other, "busy"));
            }
            let (host, _device) = tokio::io::duplex(64);
            if let Some(signal) = &self.raise_on_open {
                signal.trigger();
            }
            Ok(OpenedPort::from_stream(host))
        }
    }

    fn fast_config(open_attempts: u32) -> DeviceConfig {
        DeviceConfig {
            hardware: HardwareId::new(0x0403, 0x6001),
            open_attempts,
            open_backoff_step: Duration::from_millis(1),
            reconnect_interval: Duration::from_millis(5),
            idle_poll_interval: Duration::from_millis(5),
            log_retry_interval: Duration::from_millis(5),
            ..DeviceConfig::default()
        }
    }

    fn supervisor(provider: Arc<ScriptedPorts>, open_attempts: u32) -> Supervisor {
        Supervisor::new(fast_config(open_attempts), provider, Signal::new())
    }

    #[tokio::test]
    async fn test_try_connect_without_matching_port_is_not_found() {
        // Arrange
        let provider = Arc::new(ScriptedPorts {
            ports: vec![PortInfo::usb("/dev/ttyUSB0", 0x1A86, 0x7523)],
            ..ScriptedPorts::default()
        });
        let sup = supervisor(Arc::clone(&provider), 5);

        // Act
        let result = sup.try_connect().await;

        // Assert
        assert!(matches!(result, Err(DeviceError::DeviceNotFound(_))));
        assert_eq!(provider.opens.load(Ordering::SeqCst), 0);
        assert!(!sup.is_connected());
    }

    #[tokio::test]
    async fn test_try_connect_enumeration_failure_is_enumerate_error() {
        let provider = Arc::new(ScriptedPorts::with_device());
        provider.list_fails.store(true, Ordering::SeqCst);
        let sup = supervisor(provider, 5);

        assert!(matches!(sup.try_connect().await, Err(DeviceError::Enumerate(_))));
    }

    #[tokio::test]
    async fn test_try_connect_retries_open_until_success() {
        // Arrange: the port is busy for the first two attempts
        let provider = Arc::new(ScriptedPorts::with_device());
        provider.open_failures.store(2, Ordering::SeqCst);
        let sup = supervisor(Arc::clone(&provider), 5);

        // Act
        let port = sup.try_connect().await.expect("third attempt succeeds");

        // Assert
        assert_eq!(provider.opens.load(Ordering::SeqCst), 3);
        assert_eq!(port.name(), "/dev/ttyUSB0");
        assert_eq!(port.generation(), 1);
        assert!(sup.is_connected());
    }

    #[tokio::test]
    async fn test_try_connect_gives_up_after_configured_attempts() {
        let provider = Arc::new(ScriptedPorts::with_device());
        provider.open_failures.store(10, Ordering::SeqCst);
        let sup = supervisor(Arc::clone(&provider), 2);

        let result = sup.try_connect().await;

        assert!(matches!(
            result,
            Err(DeviceError::OpenFailed { attempts: 2, ref port, .. }) if port == "/dev/ttyUSB0"
        ));
        assert_eq!(provider.opens.load(Ordering::SeqCst), 2);
        assert!(!sup.is_connected());
    }

    #[tokio::test]
    async fn test_try_connect_is_noop_when_connected() {
        let provider = Arc::new(ScriptedPorts::with_device());
        let sup = supervisor(Arc::clone(&provider), 5);

        let first = sup.try_connect().await.unwrap();
        let second = sup.try_connect().await.unwrap();

        assert_eq!(first.generation(), second.generation());
        assert_eq!(provider.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_try_connect_after_shutdown_is_closed() {
        let provider = Arc::new(ScriptedPorts::with_device());
        let sup = supervisor(Arc::clone(&provider), 5);
        sup.shutdown_signal().trigger();

        assert!(matches!(sup.try_connect().await, Err(DeviceError::Closed)));
        assert_eq!(provider.opens.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_port_opened_during_shutdown_is_not_published() {
        // Arrange: shutdown is raised while the open is in flight
        let shutdown = Signal::new();
        let provider = Arc::new(ScriptedPorts {
            raise_on_open: Some(shutdown.clone()),
            ..ScriptedPorts::with_device()
        });
        let sup = Supervisor::new(fast_config(5), provider.clone(), shutdown);

        // Act
        let result = sup.try_connect().await;

        // Assert
        assert!(matches!(result, Err(DeviceError::Closed)));
        assert_eq!(provider.opens.load(Ordering::SeqCst), 1);
        assert!(!sup.is_connected());
        assert!(sup.current_port().is_none());
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_open_backoff() {
        // Arrange: every open fails and each backoff step is far too long to wait out
        let provider = Arc::new(ScriptedPorts::with_device());
        provider.open_failures.store(10, Ordering::SeqCst);
        let config = DeviceConfig {
            open_backoff_step: Duration::from_secs(30),
            ..fast_config(5)
        };
        let sup = Arc::new(Supervisor::new(config, provider.clone(), Signal::new()));
        let connecting = {
            let sup = Arc::clone(&sup);
            tokio::spawn(async move { sup.try_connect().await })
        };

        // Act
        tokio::time::sleep(Duration::from_millis(20)).await;
        sup.shutdown_signal().trigger();
        let result = tokio::time::timeout(Duration::from_secs(2), connecting)
            .await
            .expect("backoff must end on shutdown")
            .expect("connect task must not panic");

        // Assert
        assert!(matches!(result, Err(DeviceError::Closed)));
        assert_eq!(provider.opens.load(Ordering::SeqCst), 1);
        assert!(!sup.is_connected());
    }

    #[tokio::test]
    async fn test_stale_disconnect_does_not_clear_newer_port() {
        // Arrange: connect, lose the port, reconnect
        let provider = Arc::new(ScriptedPorts::with_device());
        let sup = supervisor(provider, 5);
        let old = sup.try_connect().await.unwrap();
        assert!(sup.disconnect(&old, &DeviceError::NotConnected));
        let new = sup.try_connect().await.unwrap();

        // Act: a late failure report about the old port arrives
        let cleared = sup.disconnect(&old, &DeviceError::NotConnected);

        // Assert
        assert!(!cleared);
        assert!(old.is_closed());
        assert!(!new.is_closed());
        assert_eq!(sup.current_port().unwrap().generation(), new.generation());
        assert_eq!(new.generation(), 2);
    }

    #[tokio::test]
    async fn test_close_current_empties_slot_and_closes_port() {
        let provider = Arc::new(ScriptedPorts::with_device());
        let sup = supervisor(provider, 5);
        let port = sup.try_connect().await.unwrap();

        sup.close_current();

        assert!(port.is_closed());
        assert!(!sup.is_connected());
    }

    #[tokio::test]
    async fn test_write_frame_on_closed_port_fails() {
        let provider = Arc::new(ScriptedPorts::with_device());
        let sup = supervisor(provider, 5);
        let port = sup.try_connect().await.unwrap();
        port.close();

        let frame = keybridge_core::encode_frame(&keybridge_core::HidEvent::consumer(0xE9, false));
        let result = port.write_frame(&frame).await;

        assert!(matches!(result, Err(DeviceError::WriteFailed(_))));
    }

    #[tokio::test]
    async fn test_run_reconnects_after_disconnect_and_stops_on_shutdown() {
        // Arrange
        let provider = Arc::new(ScriptedPorts::with_device());
        let sup = Arc::new(supervisor(Arc::clone(&provider), 5));
        let task = {
            let sup = Arc::clone(&sup);
            tokio::spawn(async move { sup.run().await })
        };

        // Act: wait for the first connection, then drop it
        let first = loop {
            if let Some(port) = sup.current_port() {
                break port;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        };
        sup.disconnect(&first, &DeviceError::NotConnected);
        let second = loop {
            if let Some(port) = sup.current_port() {
                break port;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        };
        sup.shutdown_signal().trigger();

        // Assert
        assert!(second.generation() > first.generation());
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("supervisor must stop")
            .expect("supervisor must not panic");
    }

    // ── ConnectReporter ───────────────────────────────────────────────────────

    fn not_found() -> DeviceError {
        DeviceError::DeviceNotFound(HardwareId::default())
    }

    fn open_failed(reason: &str) -> DeviceError {
        DeviceError::OpenFailed {
            port: "COM3".to_string(),
            attempts: 5,
            source: io::Error::new(io::ErrorKind::Other, reason.to_string()),
        }
    }

    #[test]
    fn test_reporter_logs_not_found_once_until_reset() {
        let mut reporter = ConnectReporter::default();
        assert!(reporter.should_log(&not_found()));
        assert!(!reporter.should_log(&not_found()));
        assert!(!reporter.should_log(&not_found()));

        reporter.reset();

        assert!(reporter.should_log(&not_found()));
    }

    #[test]
    fn test_reporter_logs_other_errors_only_when_text_changes() {
        let mut reporter = ConnectReporter::default();
        assert!(reporter.should_log(&open_failed("permission denied")));
        assert!(!reporter.should_log(&open_failed("permission denied")));
        assert!(reporter.should_log(&open_failed("device busy")));
    }

    #[test]
    fn test_reporter_not_found_in_between_resets_text_comparison() {
        // Arrange
        let mut reporter = ConnectReporter::default();
        assert!(reporter.should_log(&not_found()));
        assert!(reporter.should_log(&open_failed("device busy")));

        // Act: the device vanishes (already reported) and comes back busy
        let not_found_again = reporter.should_log(&not_found());
        let busy_again = reporter.should_log(&open_failed("device busy"));

        // Assert
        assert!(!not_found_again);
        assert!(busy_again);
    }
}
