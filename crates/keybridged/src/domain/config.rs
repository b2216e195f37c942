//! Bridge configuration types.
//!
//! [`BridgeConfig`] is the single source of truth for all runtime settings.
//! It is assembled once at startup from CLI arguments, an optional TOML file
//! and the defaults below, then handed to the device manager and the control
//! endpoint.
//!
//! Configuration is a plain struct: nothing in the domain reads environment
//! variables or files.  The binary is responsible for populating it.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use keybridge_core::HardwareId;

/// Runtime settings for the serial device manager.
///
/// # Example
///
/// ```rust
/// use keybridged::domain::DeviceConfig;
///
/// let cfg = DeviceConfig::default();
/// assert_eq!(cfg.baud_rate, 115_200);
/// assert_eq!(cfg.write_queue_capacity, 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    /// USB VID/PID of the HID-injection device.
    pub hardware: HardwareId,

    /// Serial line speed.  Must match the device firmware.
    pub baud_rate: u32,

    /// Capacity of the outbound frame queue.
    ///
    /// The default of one keeps latency predictable: a caller blocks as soon
    /// as a single frame is waiting behind the one being written.
    pub write_queue_capacity: usize,

    /// How many times to try opening a located port before giving up on
    /// this connection attempt.
    pub open_attempts: u32,

    /// Open retry backoff.  The delay after attempt `n` (1-based) is
    /// `open_backoff_step * n`.
    pub open_backoff_step: Duration,

    /// Pause between connection attempts after a failure.
    pub reconnect_interval: Duration,

    /// How often the supervisor wakes while a port is connected.
    pub idle_poll_interval: Duration,

    /// Pause before the log reader retries when no port is connected or a
    /// read failed.
    pub log_retry_interval: Duration,
}

impl Default for DeviceConfig {
    /// | Field                | Default            |
    /// |----------------------|--------------------|
    /// | hardware             | `0x0403:0x6001`    |
    /// | baud_rate            | 115200             |
    /// | write_queue_capacity | 1                  |
    /// | open_attempts        | 5                  |
    /// | open_backoff_step    | 150 ms             |
    /// | reconnect_interval   | 1 s                |
    /// | idle_poll_interval   | 500 ms             |
    /// | log_retry_interval   | 500 ms             |
    fn default() -> Self {
        Self {
            hardware: HardwareId::default(),
            baud_rate: 115_200,
            write_queue_capacity: 1,
            open_attempts: 5,
            open_backoff_step: Duration::from_millis(150),
            reconnect_interval: Duration::from_secs(1),
            idle_poll_interval: Duration::from_millis(500),
            log_retry_interval: Duration::from_millis(500),
        }
    }
}

/// All runtime configuration for the bridge daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    pub device: DeviceConfig,

    /// Address the WebSocket control endpoint binds to.
    ///
    /// Defaults to loopback: anyone who can reach this socket can type on
    /// the target machine.
    pub control_bind_addr: SocketAddr,

    /// Upper bound on how long one press-and-release request may wait for
    /// queue space.
    pub send_timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            device: DeviceConfig::default(),
            control_bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 9876)),
            send_timeout: Duration::from_secs(2),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
