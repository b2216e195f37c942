//! Serial port enumeration, opening, and the port locator.
//!
//! The device manager never touches `tokio-serial` directly.  It goes through
//! the [`PortProvider`] trait so tests can substitute in-memory ports, and the
//! production implementation, [`SystemPorts`], is the only place that knows
//! about the host's serial driver.

use std::io;

use async_trait::async_trait;
use keybridge_core::HardwareId;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_serial::{SerialPortBuilderExt, SerialPortInfo, SerialPortType};

use super::error::DeviceError;

/// Read half of an open port.
pub type PortReader = Box<dyn AsyncRead + Send + Unpin>;

/// Write half of an open port.
pub type PortWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// An opened port, split so reads and writes can proceed independently.
pub struct OpenedPort {
    pub reader: PortReader,
    pub writer: PortWriter,
}

impl OpenedPort {
    /// Splits a bidirectional byte stream into an [`OpenedPort`].
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
        }
    }
}

/// How a serial port is attached to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortKind {
    Usb { vendor_id: u16, product_id: u16 },
    Other,
}

/// One enumerated serial port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// OS identifier used to open the port (`/dev/ttyUSB0`, `COM3`, ...).
    pub name: String,
    pub kind: PortKind,
}

impl PortInfo {
    pub fn usb(name: impl Into<String>, vendor_id: u16, product_id: u16) -> Self {
        Self {
            name: name.into(),
            kind: PortKind::Usb {
                vendor_id,
                product_id,
            },
        }
    }
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        let kind = match info.port_type {
            SerialPortType::UsbPort(usb) => PortKind::Usb {
                vendor_id: usb.vid,
                product_id: usb.pid,
            },
            _ => PortKind::Other,
        };
        Self {
            name: info.port_name,
            kind,
        }
    }
}

/// Source of serial ports: enumeration plus open.
#[async_trait]
pub trait PortProvider: Send + Sync {
    /// Lists the serial ports currently visible to the host.
    async fn list_ports(&self) -> io::Result<Vec<PortInfo>>;

    /// Opens `name` at `baud_rate`.
    async fn open(&self, name: &str, baud_rate: u32) -> io::Result<OpenedPort>;
}

/// [`PortProvider`] backed by the host's serial driver via `tokio-serial`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPorts;

#[async_trait]
impl PortProvider for SystemPorts {
    async fn list_ports(&self) -> io::Result<Vec<PortInfo>> {
        // Enumeration walks sysfs/IOKit/SetupAPI synchronously.
        let ports = tokio::task::spawn_blocking(tokio_serial::available_ports)
            .await
            .map_err(io::Error::other)?
            .map_err(io::Error::from)?;
        Ok(ports.into_iter().map(PortInfo::from).collect())
    }

    async fn open(&self, name: &str, baud_rate: u32) -> io::Result<OpenedPort> {
        let stream = tokio_serial::new(name, baud_rate)
            .open_native_async()
            .map_err(io::Error::from)?;
        Ok(OpenedPort::from_stream(stream))
    }
}

/// Returns the name of the first USB port whose VID/PID equals `target`.
///
/// # Errors
///
/// Returns [`DeviceError::DeviceNotFound`] if no USB port matches.
pub fn locate_port(ports: &[PortInfo], target: HardwareId) -> Result<&str, DeviceError> {
    ports
        .iter()
        .find(|port| match port.kind {
            PortKind::Usb {
                vendor_id,
                product_id,
            } => target.matches(vendor_id, product_id),
            PortKind::Other => false,
        })
        .map(|port| port.name.as_str())
        .ok_or(DeviceError::DeviceNotFound(target))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
