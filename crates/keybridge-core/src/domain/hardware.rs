//! Vendor/product identity of the target USB serial adapter.
//!
//! The bridge recognises its adapter purely by the USB vendor id (VID) and
//! product id (PID) reported by the host's serial port enumeration.  No other
//! discovery mechanism is used.

use std::fmt;

use thiserror::Error;

/// FTDI (Future Technology Devices International).
pub const DEFAULT_VENDOR_ID: u16 = 0x0403;

/// FT232R USB UART.
pub const DEFAULT_PRODUCT_ID: u16 = 0x6001;

/// Error returned when a VID/PID string cannot be parsed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HardwareIdError {
    #[error("empty USB id")]
    Empty,

    #[error("invalid USB id '{value}': {reason}")]
    Invalid { value: String, reason: String },
}

/// The (vendor id, product id) pair identifying the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HardwareId {
    pub vendor_id: u16,
    pub product_id: u16,
}

impl HardwareId {
    pub fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
        }
    }

    /// Returns `true` if an enumerated device reports this exact VID/PID.
    ///
    /// Enumeration reports the ids as numbers, so comparing the values is
    /// the same as comparing their 4-digit hex forms case-insensitively.
    pub fn matches(&self, vendor_id: u16, product_id: u16) -> bool {
        self.vendor_id == vendor_id && self.product_id == product_id
    }
}

impl Default for HardwareId {
    fn default() -> Self {
        Self::new(DEFAULT_VENDOR_ID, DEFAULT_PRODUCT_ID)
    }
}

impl fmt::Display for HardwareId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vid=0x{:04X} pid=0x{:04X}", self.vendor_id, self.product_id)
    }
}

/// Parses a 16-bit USB id.
///
/// The prefix selects the base: `0x` hexadecimal, `0o` or a bare leading `0`
/// octal, `0b` binary, anything else decimal.  Surrounding whitespace is
/// ignored.
///
/// # Errors
///
/// Returns [`HardwareIdError`] for an empty string, invalid digits, or a value
/// that does not fit in 16 bits.
///
/// # Examples
///
/// ```rust
/// use keybridge_core::parse_usb_id;
///
/// assert_eq!(parse_usb_id("0x0403").unwrap(), 0x0403);
/// assert_eq!(parse_usb_id("24577").unwrap(), 0x6001);
/// assert!(parse_usb_id("0x10000").is_err());
/// ```
pub fn parse_usb_id(value: &str) -> Result<u16, HardwareIdError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(HardwareIdError::Empty);
    }

    let lower = trimmed.to_ascii_lowercase();
    let (digits, radix) = if let Some(rest) = lower.strip_prefix("0x") {
        (rest, 16)
    } else if let Some(rest) = lower.strip_prefix("0o") {
        (rest, 8)
    } else if let Some(rest) = lower.strip_prefix("0b") {
        (rest, 2)
    } else if lower.len() > 1 && lower.starts_with('0') {
        (&lower[1..], 8)
    } else {
        (lower.as_str(), 10)
    };

    // from_str_radix tolerates a leading '+'.
    if !digits.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(HardwareIdError::Invalid {
            value: trimmed.to_string(),
            reason: "unexpected character".to_string(),
        });
    }

    u16::from_str_radix(digits, radix).map_err(|e| HardwareIdError::Invalid {
        value: trimmed.to_string(),
        reason: e.to_string(),
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_identity_is_ftdi_ft232r() {
        let id = HardwareId::default();
        assert_eq!(id.vendor_id, 0x0403);
        assert_eq!(id.product_id, 0x6001);
    }

    #[test]
    fn test_display_uses_four_hex_digits() {
        let id = HardwareId::new(0x2E8A, 0x000A);
        assert_eq!(id.to_string(), "vid=0x2E8A pid=0x000A");
    }

    #[test]
    fn test_matches_requires_both_ids() {
        let id = HardwareId::default();
        assert!(id.matches(0x0403, 0x6001));
        assert!(!id.matches(0x0403, 0x6015));
        assert!(!id.matches(0x1A86, 0x6001));
    }

    #[test]
    fn test_parse_hex_is_case_insensitive() {
        assert_eq!(parse_usb_id("0x2e8a"), Ok(0x2E8A));
        assert_eq!(parse_usb_id("0X2E8A"), Ok(0x2E8A));
    }

    #[test]
    fn test_parse_decimal_and_whitespace() {
        assert_eq!(parse_usb_id("  1027 "), Ok(0x0403));
        assert_eq!(parse_usb_id("0"), Ok(0));
    }

    #[test]
    fn test_parse_octal_and_binary() {
        assert_eq!(parse_usb_id("0o17"), Ok(15));
        assert_eq!(parse_usb_id("017"), Ok(15));
        assert_eq!(parse_usb_id("0b101"), Ok(5));
    }

    #[test]
    fn test_parse_empty_is_error() {
        assert_eq!(parse_usb_id("   "), Err(HardwareIdError::Empty));
    }

    #[test]
    fn test_parse_overflow_is_error() {
        assert!(matches!(parse_usb_id("0x1FFFF"), Err(HardwareIdError::Invalid { .. })));
        assert!(matches!(parse_usb_id("65536"), Err(HardwareIdError::Invalid { .. })));
    }

    #[test]
    fn test_parse_garbage_is_error() {
        assert!(parse_usb_id("ftdi").is_err());
        assert!(parse_usb_id("0x").is_err());
        assert!(parse_usb_id("09").is_err());
        assert!(parse_usb_id("+5").is_err());
        assert!(parse_usb_id("0x+403").is_err());
        assert!(parse_usb_id("-1").is_err());
        assert!(parse_usb_id("0x 403").is_err());
    }
}
