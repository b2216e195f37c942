//! Domain value types for keybridge.
//!
//! Nothing in this module performs I/O.  The types here describe *what* the
//! bridge talks about (which adapter, which modifiers, which log lines) and
//! leave *how* bytes move to the daemon crate.

/// Vendor/product identity of the USB serial adapter.
pub mod hardware;

/// Reassembly of the device's newline-delimited diagnostic output.
pub mod log_lines;

/// HID modifier bitmask and keyboard flag byte.
pub mod modifiers;
