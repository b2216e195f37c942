//! Modifier bitmask and keyboard flag byte carried in keyboard frames.
//!
//! The modifier byte uses the USB HID boot-keyboard bit order, so the device
//! can copy it straight into the first byte of its keyboard report.

use std::ops::BitOr;

/// Modifier key bitmask carried in byte 3 of a keyboard frame.
///
/// Bit layout:
/// - Bit 0: Left Ctrl
/// - Bit 1: Left Shift
/// - Bit 2: Left Alt (Option)
/// - Bit 3: Left GUI (Windows/Command/Super)
/// - Bit 4: Right Ctrl
/// - Bit 5: Right Shift
/// - Bit 6: Right Alt (Option)
/// - Bit 7: Right GUI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ModifierFlags(pub u8);

impl ModifierFlags {
    pub const LEFT_CTRL: u8 = 1 << 0;
    pub const LEFT_SHIFT: u8 = 1 << 1;
    pub const LEFT_ALT: u8 = 1 << 2;
    pub const LEFT_GUI: u8 = 1 << 3;
    pub const RIGHT_CTRL: u8 = 1 << 4;
    pub const RIGHT_SHIFT: u8 = 1 << 5;
    pub const RIGHT_ALT: u8 = 1 << 6;
    pub const RIGHT_GUI: u8 = 1 << 7;

    /// An empty modifier set.
    pub const NONE: ModifierFlags = ModifierFlags(0);

    /// Returns `true` if no modifier bit is set.
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Returns `true` if every bit in `mask` is set.
    pub fn contains(&self, mask: u8) -> bool {
        self.0 & mask == mask
    }

    /// Returns a copy with the bits in `mask` set when `enabled` is true.
    #[must_use]
    pub fn with(self, mask: u8, enabled: bool) -> Self {
        if enabled {
            ModifierFlags(self.0 | mask)
        } else {
            self
        }
    }
}

impl BitOr for ModifierFlags {
    type Output = ModifierFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        ModifierFlags(self.0 | rhs.0)
    }
}

/// Device-specific flag byte carried in byte 4 of a keyboard frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct KeyboardFlags(pub u8);

impl KeyboardFlags {
    /// Ask the device to hold the Apple "Fn / Globe" key for this event.
    pub const APPLE_FN: u8 = 0x01;

    /// No device-specific behaviour.
    pub const NONE: KeyboardFlags = KeyboardFlags(0);

    /// Returns `true` if the Apple Fn flag is set.
    pub fn apple_fn(&self) -> bool {
        self.0 & Self::APPLE_FN != 0
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
