//! Domain layer for keybridged.
//!
//! Pure types with no I/O: the runtime configuration and the JSON messages
//! exchanged with control clients.  Nothing here touches `tokio`, serial
//! ports or sockets, and nothing reads the environment or the filesystem.

pub mod config;
pub mod messages;

pub use config::{BridgeConfig, DeviceConfig};
pub use messages::{ControlResponse, PressAndReleaseModifiers, PressAndReleaseRequest};
