//! keybridged library crate.
//!
//! This crate drives a USB HID-injection device over a serial link and
//! exposes a small JSON control endpoint for pressing keys on the machine the
//! device is plugged into.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Control client (JSON over WebSocket)
//!         ↕
//! [keybridged]
//!   ├── domain/           Pure types: request/response JSON, BridgeConfig
//!   ├── application/      Request validation, press-and-release use case
//!   └── infrastructure/
//!         ├── ws_server/   WebSocket accept loop (tokio-tungstenite)
//!         ├── device/      Serial device manager (tokio-serial)
//!         └── config_file/ Optional TOML settings
//!         ↕
//! USB serial adapter ─► HID-injection device ─► target machine
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` depends on `domain`, `keybridge-core` and the device
//!   manager's send API only.
//! - `infrastructure` depends on all other layers plus `tokio`,
//!   `tokio-serial` and `tokio-tungstenite`.

/// Domain layer: configuration and JSON message types (no I/O).
pub mod domain;

/// Application layer: control request validation and the press/release use case.
pub mod application;

/// Infrastructure layer: serial device manager, WebSocket server, config file.
pub mod infrastructure;
