//! # keybridge-core
//!
//! Shared library for keybridge containing the serial wire-frame codec, the
//! hardware identity of the target USB adapter, HID modifier masks, and the
//! device log-line assembler.
//!
//! This crate has zero dependencies on async runtimes, serial drivers or
//! sockets, so everything in it is plain synchronous code that can be tested
//! without a device attached.
//!
//! # Architecture overview
//!
//! keybridge drives a USB HID-injection device (a microcontroller that
//! presents itself to a *target* computer as a keyboard) from a *host*
//! computer over a USB serial adapter.  The host sends one small binary frame
//! per key press or release; the device replays it as a HID report.
//!
//! - **`protocol`** – The 5-byte frame format that travels over the serial
//!   link, with an encoder and the matching decoder.
//!
//! - **`domain`** – Pure value types: the adapter's vendor/product identity,
//!   modifier and flag bitmasks, and the assembler that turns the device's raw
//!   diagnostic byte stream back into bounded log lines.

pub mod domain;
pub mod protocol;

pub use domain::hardware::{parse_usb_id, HardwareId, HardwareIdError};
pub use domain::log_lines::{LineAssembler, LogEvent, MAX_LOG_LINE_BYTES};
pub use domain::modifiers::{KeyboardFlags, ModifierFlags};
pub use protocol::frame::{decode_frame, encode_frame, Frame, FrameClass, FrameError, HidEvent};
