//! Device log reader: forwards the device's diagnostic text to the log sink.
//!
//! The reader follows whichever port the supervisor currently holds.  Each
//! port gets its own [`LineAssembler`], so a half-received line from a port
//! that went away is never glued onto output from the next one.

use std::io;
use std::sync::Arc;

use keybridge_core::{LineAssembler, LogEvent};
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

use super::error::DeviceError;
use super::signal::Signal;
use super::supervisor::{ActivePort, Supervisor};

/// Target used for lines forwarded from the device.
pub const DEVICE_LOG_TARGET: &str = "keybridge::device";

const READ_CHUNK: usize = 256;

/// Destination for reassembled device output.
pub trait DeviceLogSink: Send + Sync {
    /// One complete line, carriage returns stripped, never empty.
    fn device_line(&self, line: &str);

    /// The current line exceeded `max_bytes` and was split.
    fn line_truncated(&self, max_bytes: usize);
}

/// Default sink: `info` for lines, `warn` for truncation.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogSink;

impl DeviceLogSink for TracingLogSink {
    fn device_line(&self, line: &str) {
        info!(target: DEVICE_LOG_TARGET, "{line}");
    }

    fn line_truncated(&self, max_bytes: usize) {
        warn!(
            target: DEVICE_LOG_TARGET,
            max_bytes, "device log line exceeded {max_bytes} bytes; truncated"
        );
    }
}

#[derive(Debug)]
enum ReadOutcome {
    /// Shutdown was raised.
    Stopped,
    /// The port was closed by someone else.
    Superseded,
    Failed(DeviceError),
}

/// Reads device output until shutdown.
pub async fn log_read_loop(supervisor: Arc<Supervisor>, sink: Arc<dyn DeviceLogSink>, shutdown: Signal) {
    let retry = supervisor.config().log_retry_interval;
    loop {
        if shutdown.is_triggered() {
            break;
        }
        let Some(port) = supervisor.current_port().filter(|port| !port.is_closed()) else {
            if !shutdown.sleep_or_triggered(retry).await {
                break;
            }
            continue;
        };

        match read_port(&port, sink.as_ref(), &shutdown).await {
            ReadOutcome::Stopped => break,
            ReadOutcome::Superseded => {}
            ReadOutcome::Failed(e) => {
                supervisor.disconnect(&port, &e);
                drop(port);
                if !shutdown.sleep_or_triggered(retry).await {
                    break;
                }
            }
        }
    }
    debug!("device log reader stopped");
}

async fn read_port(port: &ActivePort, sink: &dyn DeviceLogSink, shutdown: &Signal) -> ReadOutcome {
    let mut assembler = LineAssembler::new();
    let mut buf = [0u8; READ_CHUNK];
    let mut reader = port.reader().lock().await;

    loop {
        let read = tokio::select! {
            biased;
            _ = shutdown.triggered() => return ReadOutcome::Stopped,
            _ = port.closed().triggered() => return ReadOutcome::Superseded,
            read = reader.read(&mut buf) => read,
        };

        match read {
            Ok(0) if shutdown.is_triggered() => return ReadOutcome::Stopped,
            Ok(0) => {
                return ReadOutcome::Failed(DeviceError::ReadFailed(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "device closed the stream",
                )));
            }
            Ok(n) => assembler.feed(&buf[..n], |event| match event {
                LogEvent::Line(line) => sink.device_line(&line),
                LogEvent::Truncated { max_bytes } => sink.line_truncated(max_bytes),
            }),
            Err(_) if shutdown.is_triggered() => return ReadOutcome::Stopped,
            Err(e) => return ReadOutcome::Failed(DeviceError::ReadFailed(e)),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
