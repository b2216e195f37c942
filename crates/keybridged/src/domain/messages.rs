//! JSON message types for the control endpoint.
//!
//! A control client sends one [`PressAndReleaseRequest`] per text frame and
//! gets one [`ControlResponse`] back:
//!
//! ```json
//! {"type":"keyboard","code":4,"modifiers":{"left_shift":true}}
//! {"status":"ok"}
//! ```
//!
//! Unknown fields are rejected at every level so a typo such as
//! `"left_shfit"` fails loudly instead of silently typing the wrong key.

use keybridge_core::{KeyboardFlags, ModifierFlags};
use serde::{Deserialize, Serialize};

/// Modifier keys held for the duration of a keyboard press.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PressAndReleaseModifiers {
    pub left_ctrl: bool,
    pub left_shift: bool,
    pub left_alt: bool,
    pub left_gui: bool,
    pub right_ctrl: bool,
    pub right_shift: bool,
    pub right_alt: bool,
    pub right_gui: bool,
    /// Apple Fn / Globe.  Travels in the flags byte, not the modifier mask.
    pub apple_fn: bool,
}

impl PressAndReleaseModifiers {
    /// The HID boot-keyboard modifier byte.
    pub fn modifier_mask(&self) -> ModifierFlags {
        ModifierFlags::NONE
            .with(ModifierFlags::LEFT_CTRL, self.left_ctrl)
            .with(ModifierFlags::LEFT_SHIFT, self.left_shift)
            .with(ModifierFlags::LEFT_ALT, self.left_alt)
            .with(ModifierFlags::LEFT_GUI, self.left_gui)
            .with(ModifierFlags::RIGHT_CTRL, self.right_ctrl)
            .with(ModifierFlags::RIGHT_SHIFT, self.right_shift)
            .with(ModifierFlags::RIGHT_ALT, self.right_alt)
            .with(ModifierFlags::RIGHT_GUI, self.right_gui)
    }

    pub fn keyboard_flags(&self) -> KeyboardFlags {
        if self.apple_fn {
            KeyboardFlags(KeyboardFlags::APPLE_FN)
        } else {
            KeyboardFlags::NONE
        }
    }

    /// `true` if any key is held, Apple Fn included.
    pub fn any(&self) -> bool {
        !self.modifier_mask().is_empty() || self.apple_fn
    }
}

/// One press-and-release request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PressAndReleaseRequest {
    /// `"keyboard"` (default when empty or absent) or `"consumer"`.
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub kind: String,

    /// HID usage code.  Keyboard codes must fit in 8 bits.
    #[serde(default)]
    pub code: u16,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modifiers: Option<PressAndReleaseModifiers>,
}

/// Reply to a control request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlResponse {
    /// `"ok"` or `"error"`.
    pub status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ControlResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            error: Some(message.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
