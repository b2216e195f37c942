//! Binary codec for the 5-byte serial frames understood by the HID device.
//!
//! Wire format:
//! ```text
//! [type:1][code_lo:1][code_hi:1][modifiers:1][flags:1]
//! ```
//! `type` holds the frame class in its low bits and the release flag in
//! bit 7.  The 16-bit code is little-endian.  Every frame is exactly
//! [`FRAME_LEN`] bytes; there is no header, length prefix or checksum.
//!
//! | Class    | Code meaning                               | modifiers / flags |
//! |----------|--------------------------------------------|-------------------|
//! | Keyboard | USB HID keyboard usage (page 0x07), 8 bits | used              |
//! | Consumer | USB HID consumer usage (page 0x0C)         | zero              |
//! | Vendor   | device-defined usage                       | zero              |
//!
//! The encoder writes whatever it is given.  Range rules (keyboard codes must
//! fit in 8 bits, zero codes only for modifier-only keyboard events) belong to
//! the caller that builds the [`HidEvent`].

use thiserror::Error;

use crate::domain::modifiers::{KeyboardFlags, ModifierFlags};

/// Size of every frame on the wire.
pub const FRAME_LEN: usize = 5;

/// Bit 7 of the type byte: set for key release, clear for key press.
pub const RELEASE_FLAG: u8 = 0x80;

const CLASS_MASK: u8 = !RELEASE_FLAG;

/// Errors that can occur while decoding a frame.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// The byte slice is not exactly [`FRAME_LEN`] bytes long.
    #[error("invalid frame length: expected {FRAME_LEN} bytes, got {0}")]
    InvalidLength(usize),

    /// The class bits of the type byte are not a known class.
    #[error("unknown frame class: 0x{0:02X}")]
    UnknownClass(u8),
}

/// HID usage page category of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameClass {
    Keyboard = 0x00,
    Consumer = 0x01,
    Vendor = 0x02,
}

impl TryFrom<u8> for FrameClass {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(FrameClass::Keyboard),
            0x01 => Ok(FrameClass::Consumer),
            0x02 => Ok(FrameClass::Vendor),
            other => Err(FrameError::UnknownClass(other)),
        }
    }
}

/// One press or release event, before encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HidEvent {
    pub class: FrameClass,
    pub code: u16,
    pub modifiers: ModifierFlags,
    pub flags: KeyboardFlags,
    pub release: bool,
}

impl HidEvent {
    /// Keyboard event.  `code` is an 8-bit HID keyboard usage; zero means a
    /// modifier-only event.
    pub fn keyboard(code: u8, modifiers: ModifierFlags, flags: KeyboardFlags, release: bool) -> Self {
        Self {
            class: FrameClass::Keyboard,
            code: u16::from(code),
            modifiers,
            flags,
            release,
        }
    }

    /// Consumer-page event (media keys, volume, brightness).
    pub fn consumer(usage: u16, release: bool) -> Self {
        Self::without_modifiers(FrameClass::Consumer, usage, release)
    }

    /// Vendor-defined event.
    pub fn vendor(usage: u16, release: bool) -> Self {
        Self::without_modifiers(FrameClass::Vendor, usage, release)
    }

    fn without_modifiers(class: FrameClass, code: u16, release: bool) -> Self {
        Self {
            class,
            code,
            modifiers: ModifierFlags::NONE,
            flags: KeyboardFlags::NONE,
            release,
        }
    }
}

/// An encoded, immutable 5-byte frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Frame([u8; FRAME_LEN]);

impl Frame {
    /// Returns the raw wire bytes.
    pub fn as_bytes(&self) -> &[u8; FRAME_LEN] {
        &self.0
    }

    /// Returns `true` if this frame carries the release flag.
    pub fn is_release(&self) -> bool {
        self.0[0] & RELEASE_FLAG != 0
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a [`HidEvent`] into its wire frame.
///
/// Encoding is total: every event has exactly one frame.
///
/// # Examples
///
/// ```rust
/// use keybridge_core::{encode_frame, HidEvent, KeyboardFlags, ModifierFlags};
///
/// // Left Shift + "a" (HID 0x04), press.
/// let event = HidEvent::keyboard(0x04, ModifierFlags(ModifierFlags::LEFT_SHIFT), KeyboardFlags::NONE, false);
/// assert_eq!(encode_frame(&event).as_bytes(), &[0x00, 0x04, 0x00, 0x02, 0x00]);
/// ```
pub fn encode_frame(event: &HidEvent) -> Frame {
    let mut type_byte = event.class as u8;
    if event.release {
        type_byte |= RELEASE_FLAG;
    }
    let [code_lo, code_hi] = event.code.to_le_bytes();
    Frame([type_byte, code_lo, code_hi, event.modifiers.0, event.flags.0])
}

/// Decodes a frame back into the event it was built from.
///
/// # Errors
///
/// Returns [`FrameError::InvalidLength`] unless `bytes` is exactly
/// [`FRAME_LEN`] long, and [`FrameError::UnknownClass`] for an unassigned
/// class value.
///
/// # Examples
///
/// ```rust
/// use keybridge_core::{decode_frame, FrameClass};
///
/// // Consumer Play/Pause (0x00CD), release.
/// let event = decode_frame(&[0x81, 0xCD, 0x00, 0x00, 0x00]).unwrap();
/// assert_eq!(event.class, FrameClass::Consumer);
/// assert_eq!(event.code, 0x00CD);
/// assert!(event.release);
/// ```
pub fn decode_frame(bytes: &[u8]) -> Result<HidEvent, FrameError> {
    let bytes: [u8; FRAME_LEN] = bytes
        .try_into()
        .map_err(|_| FrameError::InvalidLength(bytes.len()))?;
    let class = FrameClass::try_from(bytes[0] & CLASS_MASK)?;
    Ok(HidEvent {
        class,
        code: u16::from_le_bytes([bytes[1], bytes[2]]),
        modifiers: ModifierFlags(bytes[3]),
        flags: KeyboardFlags(bytes[4]),
        release: bytes[0] & RELEASE_FLAG != 0,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
