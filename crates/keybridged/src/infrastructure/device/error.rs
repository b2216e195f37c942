//! Error type for the device manager.

use std::io;

use keybridge_core::HardwareId;
use thiserror::Error;

use super::signal::CancelReason;

/// Errors produced by the device manager.
///
/// Only [`DeviceError::NotConnected`], [`DeviceError::Closed`] and
/// [`DeviceError::Canceled`] are ever returned to a send caller.  The rest
/// are produced and absorbed by the background tasks, which log them and
/// retry.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// No enumerated USB serial device matches the target VID/PID.
    #[error("device not found ({0})")]
    DeviceNotFound(HardwareId),

    /// The host's serial port list could not be read.
    #[error("enumerate serial ports: {0}")]
    Enumerate(#[source] io::Error),

    /// The matching port was found but every open attempt failed.
    #[error("open port {port:?} after {attempts} attempts: {source}")]
    OpenFailed {
        port: String,
        attempts: u32,
        #[source]
        source: io::Error,
    },

    /// Writing a frame to the port failed.  The port is disconnected.
    #[error("write failed: {0}")]
    WriteFailed(#[source] io::Error),

    /// Reading device output failed or hit end-of-stream.  The port is disconnected.
    #[error("read failed: {0}")]
    ReadFailed(#[source] io::Error),

    /// A send was attempted while no port is connected.
    #[error("device not connected")]
    NotConnected,

    /// The manager has been shut down.
    #[error("device bridge closed")]
    Closed,

    /// The caller's token fired before the frame was queued.
    #[error("send canceled: {0}")]
    Canceled(#[source] CancelReason),
}
