//! keybridged: serial bridge daemon for a USB HID-injection device.
//!
//! The daemon finds the device's USB serial adapter by VID/PID, keeps the
//! port open (reconnecting whenever it is unplugged), forwards the device's
//! diagnostic output to the log, and accepts press-and-release requests on a
//! local WebSocket endpoint.
//!
//! # Usage
//!
//! ```text
//! keybridged [OPTIONS]
//!
//! Options:
//!   --host <HOST>              Control endpoint bind host [default: 127.0.0.1]
//!   --port <PORT>              Control endpoint port [default: 9876]
//!   --send-timeout <SECS>      Max wait for queue space per request [default: 2]
//!   --vid <ID>                 USB vendor id, 0x-prefixed or decimal [default: 0x0403]
//!   --pid <ID>                 USB product id [default: 0x6001]
//!   --baud-rate <BAUD>         Serial speed [default: 115200]
//!   --write-queue <FRAMES>     Outbound frame queue capacity [default: 1]
//!   --config <PATH>            Optional TOML config file
//! ```
//!
//! # Precedence
//!
//! Command line (or the matching `KEYBRIDGE_*` environment variable), then
//! the config file, then the built-in default.
//!
//! | Variable                  | Flag             |
//! |---------------------------|------------------|
//! | `KEYBRIDGE_HOST`          | `--host`         |
//! | `KEYBRIDGE_PORT`          | `--port`         |
//! | `KEYBRIDGE_SEND_TIMEOUT`  | `--send-timeout` |
//! | `KEYBRIDGE_VID`           | `--vid`          |
//! | `KEYBRIDGE_PID`           | `--pid`          |
//! | `KEYBRIDGE_BAUD_RATE`     | `--baud-rate`    |
//! | `KEYBRIDGE_WRITE_QUEUE`   | `--write-queue`  |
//! | `KEYBRIDGE_CONFIG`        | `--config`       |

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use keybridge_core::parse_usb_id;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use keybridged::application::PressReleaseService;
use keybridged::domain::{BridgeConfig, DeviceConfig};
use keybridged::infrastructure::config_file::{load_config_file, ConfigFile};
use keybridged::infrastructure::device::Signal;
use keybridged::infrastructure::{ws_server, DeviceManager};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Serial bridge daemon for a USB HID-injection device.
///
/// Every option is optional so that a value from `--config` is only
/// overridden when the flag is actually given.
#[derive(Debug, Default, Parser)]
#[command(
    name = "keybridged",
    about = "Serial bridge daemon driving a USB HID-injection device",
    version
)]
struct Cli {
    /// Host or IP address the control endpoint binds to.
    #[arg(long, env = "KEYBRIDGE_HOST")]
    host: Option<String>,

    /// TCP port of the control endpoint.
    #[arg(long, env = "KEYBRIDGE_PORT")]
    port: Option<u16>,

    /// Seconds a request may wait for space in the frame queue.
    #[arg(long, env = "KEYBRIDGE_SEND_TIMEOUT")]
    send_timeout: Option<u64>,

    /// USB vendor id of the serial adapter (`0x0403`, `1027`, ...).
    #[arg(long, env = "KEYBRIDGE_VID")]
    vid: Option<String>,

    /// USB product id of the serial adapter.
    #[arg(long, env = "KEYBRIDGE_PID")]
    pid: Option<String>,

    /// Serial line speed.  Must match the device firmware.
    #[arg(long, env = "KEYBRIDGE_BAUD_RATE")]
    baud_rate: Option<u32>,

    /// Capacity of the outbound frame queue.
    #[arg(long, env = "KEYBRIDGE_WRITE_QUEUE")]
    write_queue: Option<usize>,

    /// Path to a TOML config file.
    #[arg(long, env = "KEYBRIDGE_CONFIG")]
    config: Option<PathBuf>,
}

impl Cli {
    /// Merges the CLI arguments over `file` and the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if `--vid`/`--pid` cannot be parsed or the control
    /// host does not resolve.
    fn into_bridge_config(self, file: &ConfigFile) -> anyhow::Result<BridgeConfig> {
        let defaults = BridgeConfig::default();

        let mut device = DeviceConfig::default();
        file.device.apply_to(&mut device);
        if let Some(vid) = &self.vid {
            device.hardware.vendor_id =
                parse_usb_id(vid).with_context(|| format!("invalid VID '{vid}'"))?;
        }
        if let Some(pid) = &self.pid {
            device.hardware.product_id =
                parse_usb_id(pid).with_context(|| format!("invalid PID '{pid}'"))?;
        }
        if let Some(baud_rate) = self.baud_rate {
            device.baud_rate = baud_rate;
        }
        if let Some(capacity) = self.write_queue {
            device.write_queue_capacity = capacity;
        }

        let host = self
            .host
            .or_else(|| file.control.host.clone())
            .unwrap_or_else(|| defaults.control_bind_addr.ip().to_string());
        let port = self
            .port
            .or(file.control.port)
            .unwrap_or(defaults.control_bind_addr.port());
        let control_bind_addr = resolve_bind_addr(&host, port)?;

        let send_timeout = self
            .send_timeout
            .or(file.control.send_timeout_secs)
            .map_or(defaults.send_timeout, Duration::from_secs);

        Ok(BridgeConfig {
            device,
            control_bind_addr,
            send_timeout,
        })
    }
}

/// Resolves `host:port`, accepting names such as `localhost` as well as
/// literal addresses.
fn resolve_bind_addr(host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    (host, port)
        .to_socket_addrs()
        .with_context(|| format!("invalid control bind address '{host}:{port}'"))?
        .next()
        .with_context(|| format!("control bind address '{host}:{port}' resolved to nothing"))
}

fn init_tracing(fallback: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback.unwrap_or("info")))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Completes on Ctrl+C, or SIGTERM on Unix.
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl+C signal: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Startup order matters: every configuration error (bad flag, unreadable
/// config file, unbindable address) is reported before the device manager
/// spawns its background tasks.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let file = match &cli.config {
        Some(path) => load_config_file(path)
            .with_context(|| format!("failed to load config file {}", path.display()))?,
        None => ConfigFile::default(),
    };
    init_tracing(file.log_level.as_deref());

    let config = cli.into_bridge_config(&file)?;
    info!(
        "keybridged starting; looking for USB serial adapter {}",
        config.device.hardware
    );

    let listener = ws_server::bind(config.control_bind_addr).await?;

    let manager = Arc::new(DeviceManager::with_system_ports(config.device.clone()));
    let service = Arc::new(PressReleaseService::new(Arc::clone(&manager)));

    let shutdown = Signal::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            wait_for_shutdown().await;
            info!("shutdown signal received");
            shutdown.trigger();
        }
    });

    let served = ws_server::serve(listener, service, config.send_timeout, shutdown).await;

    manager.shutdown().await;
    info!("keybridged stopped");
    served
}

// ── Tests ─────────────────────────────────────────────────────────────────────
