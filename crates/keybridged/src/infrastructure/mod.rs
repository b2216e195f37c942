//! Infrastructure layer for keybridged.
//!
//! The infrastructure layer handles all I/O: the serial device, the
//! WebSocket control endpoint and the configuration file.
//!
//! # Responsibilities
//!
//! - Enumerating, opening and re-opening the device's serial port
//! - Queueing frames and writing them to the port in order
//! - Forwarding the device's diagnostic output to the log
//! - Accepting control clients and answering their requests
//! - Reading the optional TOML configuration file
//!
//! # What does NOT belong here?
//!
//! - Request validation (that is the application layer)
//! - Message and configuration type definitions (that is the domain layer)
//! - CLI parsing (that is done in `main.rs`)

pub mod config_file;
pub mod device;
pub mod ws_server;

pub use device::DeviceManager;
