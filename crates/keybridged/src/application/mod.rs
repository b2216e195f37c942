//! Application layer for keybridged.
//!
//! The application layer knows *what* a control request means: which rules a
//! request must satisfy and that a key press is always followed by its
//! release.  It delegates *how* frames reach the device to the
//! [`press_release::KeySender`] seam.
//!
//! # What does NOT belong here?
//!
//! - Opening sockets or serial ports (that is infrastructure)
//! - Tokio task spawning (that happens in the infrastructure layer)
//! - WebSocket framing (handled by tokio-tungstenite)

pub mod press_release;

pub use press_release::{
    parse_request, validate_request, ControlError, KeyAction, KeySender, PressReleaseService,
    RequestError,
};
