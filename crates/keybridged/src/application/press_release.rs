//! Press-and-release use case: validates a control request and turns it into
//! a press frame followed by a release frame.
//!
//! # Architecture
//!
//! The use case depends only on the [`KeySender`] trait.  The device manager
//! implements it in production; tests inject recording doubles, so every
//! validation and ordering rule here is checked without a serial port.
//!
//! # Pairing
//!
//! A press and its release are two separate sends.  Pairs are serialised by
//! a lock so two control clients typing at once can never produce
//! `press A, press B, release A, release B`.  If the press fails the release
//! is not attempted, and if the release fails the key may stay down on the
//! target until the next event for it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use keybridge_core::{KeyboardFlags, ModifierFlags};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::domain::{ControlResponse, PressAndReleaseRequest};
use crate::infrastructure::device::{CancelToken, DeviceError};

/// Why a control request was rejected before reaching the device.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("invalid JSON body")]
    InvalidJson,

    #[error("missing code")]
    MissingCode,

    #[error("keyboard code must fit in uint8")]
    KeyboardCodeTooLarge { code: u16 },

    #[error("invalid type: {0}")]
    InvalidType(String),
}

/// Error type for the press-and-release use case.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error(transparent)]
    Request(#[from] RequestError),

    #[error("send failed: {0}")]
    Send(#[from] DeviceError),
}

/// A validated request, ready to be sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Keyboard {
        code: u8,
        modifiers: ModifierFlags,
        flags: KeyboardFlags,
    },
    Consumer {
        usage: u16,
    },
}

/// The device-facing seam of the control layer.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeySender: Send + Sync {
    async fn send_keyboard(
        &self,
        code: u8,
        modifiers: ModifierFlags,
        flags: KeyboardFlags,
        release: bool,
        cancel: CancelToken,
    ) -> Result<(), DeviceError>;

    async fn send_consumer(
        &self,
        usage: u16,
        release: bool,
        cancel: CancelToken,
    ) -> Result<(), DeviceError>;
}

/// Parses one request body.  Trailing data after the JSON object is rejected.
pub fn parse_request(text: &str) -> Result<PressAndReleaseRequest, RequestError> {
    serde_json::from_str(text).map_err(|_| RequestError::InvalidJson)
}

/// Applies the request rules and resolves the action to send.
///
/// - An empty or absent `type` means keyboard.  Matching ignores case and
///   surrounding whitespace.
/// - `code` zero is only valid for a keyboard request holding at least one
///   modifier (Apple Fn counts).
/// - Keyboard codes must fit in 8 bits.
///
/// # Errors
///
/// The [`RequestError`] describing the first rule broken.
pub fn validate_request(req: &PressAndReleaseRequest) -> Result<KeyAction, RequestError> {
    let kind = req.kind.trim().to_ascii_lowercase();
    let kind = if kind.is_empty() { "keyboard" } else { kind.as_str() };
    let modifiers = req.modifiers.unwrap_or_default();

    if req.code == 0 && (kind != "keyboard" || !modifiers.any()) {
        return Err(RequestError::MissingCode);
    }

    match kind {
        "keyboard" => {
            let code = u8::try_from(req.code)
                .map_err(|_| RequestError::KeyboardCodeTooLarge { code: req.code })?;
            Ok(KeyAction::Keyboard {
                code,
                modifiers: modifiers.modifier_mask(),
                flags: modifiers.keyboard_flags(),
            })
        }
        "consumer" => Ok(KeyAction::Consumer { usage: req.code }),
        _ => Err(RequestError::InvalidType(req.kind.clone())),
    }
}

/// Sends validated actions as press/release pairs.
pub struct PressReleaseService<S: KeySender + ?Sized> {
    sender: Arc<S>,
    pair_lock: Mutex<()>,
}

impl<S: KeySender + ?Sized> PressReleaseService<S> {
    pub fn new(sender: Arc<S>) -> Self {
        Self {
            sender,
            pair_lock: Mutex::new(()),
        }
    }

    /// Sends the press, then the release, holding the pair lock throughout.
    ///
    /// # Errors
    ///
    /// [`ControlError::Send`] with the first send failure, or with
    /// [`DeviceError::Canceled`] if `cancel` fires while waiting for another
    /// pair to finish.
    pub async fn press_and_release(
        &self,
        action: KeyAction,
        cancel: CancelToken,
    ) -> Result<(), ControlError> {
        let _pair = tokio::select! {
            biased;
            reason = cancel.cancelled() => return Err(DeviceError::Canceled(reason).into()),
            guard = self.pair_lock.lock() => guard,
        };

        match action {
            KeyAction::Keyboard {
                code,
                modifiers,
                flags,
            } => {
                self.sender
                    .send_keyboard(code, modifiers, flags, false, cancel.clone())
                    .await?;
                self.sender
                    .send_keyboard(code, modifiers, flags, true, cancel)
                    .await?;
            }
            KeyAction::Consumer { usage } => {
                self.sender.send_consumer(usage, false, cancel.clone()).await?;
                self.sender.send_consumer(usage, true, cancel).await?;
            }
        }
        Ok(())
    }

    /// Handles one raw control message end to end.
    pub async fn handle(&self, text: &str, send_timeout: Duration) -> ControlResponse {
        match self.process(text, send_timeout).await {
            Ok(()) => ControlResponse::ok(),
            Err(ControlError::Request(e)) => {
                debug!("rejected control request: {e}");
                ControlResponse::error(e.to_string())
            }
            Err(e) => {
                warn!("{e}");
                ControlResponse::error(e.to_string())
            }
        }
    }

    async fn process(&self, text: &str, send_timeout: Duration) -> Result<(), ControlError> {
        let request = parse_request(text)?;
        let action = validate_request(&request)?;
        self.press_and_release(action, CancelToken::with_timeout(send_timeout))
            .await
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use mockall::{predicate::eq, Sequence};

    use super::*;
    use crate::domain::PressAndReleaseModifiers;
    use crate::infrastructure::device::{CancelReason, Signal};

    fn request(kind: &str, code: u16, modifiers: Option<PressAndReleaseModifiers>) -> PressAndReleaseRequest {
        PressAndReleaseRequest {
            kind: kind.to_string(),
            code,
            modifiers,
        }
    }

    fn shift() -> Option<PressAndReleaseModifiers> {
        Some(PressAndReleaseModifiers {
            left_shift: true,
            ..Default::default()
        })
    }

    // ── Validation ────────────────────────────────────────────────────────────

    #[test]
    fn test_empty_type_defaults_to_keyboard() {
        let action = validate_request(&request("", 0x04, None)).unwrap();
        assert_eq!(
            action,
            KeyAction::Keyboard {
                code: 0x04,
                modifiers: ModifierFlags::NONE,
                flags: KeyboardFlags::NONE,
            }
        );
    }

    #[test]
    fn test_type_is_trimmed_and_case_insensitive() {
        let action = validate_request(&request("  Consumer ", 0xE9, None)).unwrap();
        assert_eq!(action, KeyAction::Consumer { usage: 0xE9 });
    }

    #[test]
    fn test_modifier_only_keyboard_request_is_valid() {
        let action = validate_request(&request("keyboard", 0, shift())).unwrap();
        assert_eq!(
            action,
            KeyAction::Keyboard {
                code: 0,
                modifiers: ModifierFlags(ModifierFlags::LEFT_SHIFT),
                flags: KeyboardFlags::NONE,
            }
        );
    }

    #[test]
    fn test_apple_fn_alone_allows_zero_code() {
        let fn_only = Some(PressAndReleaseModifiers {
            apple_fn: true,
            ..Default::default()
        });
        let action = validate_request(&request("", 0, fn_only)).unwrap();
        assert_eq!(
            action,
            KeyAction::Keyboard {
                code: 0,
                modifiers: ModifierFlags::NONE,
                flags: KeyboardFlags(KeyboardFlags::APPLE_FN),
            }
        );
    }

    #[test]
    fn test_zero_code_without_modifiers_is_missing_code() {
        assert_eq!(
            validate_request(&request("keyboard", 0, None)),
            Err(RequestError::MissingCode)
        );
        assert_eq!(
            validate_request(&request("keyboard", 0, Some(PressAndReleaseModifiers::default()))),
            Err(RequestError::MissingCode)
        );
    }

    #[test]
    fn test_zero_code_consumer_is_missing_code_even_with_modifiers() {
        assert_eq!(
            validate_request(&request("consumer", 0, shift())),
            Err(RequestError::MissingCode)
        );
    }

    #[test]
    fn test_keyboard_code_above_255_is_rejected() {
        let err = validate_request(&request("keyboard", 0x100, None)).unwrap_err();
        assert_eq!(err, RequestError::KeyboardCodeTooLarge { code: 0x100 });
        assert_eq!(err.to_string(), "keyboard code must fit in uint8");
    }

    #[test]
    fn test_consumer_code_above_255_is_accepted() {
        let action = validate_request(&request("consumer", 0x0192, None)).unwrap();
        assert_eq!(action, KeyAction::Consumer { usage: 0x0192 });
    }

    #[test]
    fn test_unknown_type_is_rejected_with_its_name() {
        assert_eq!(
            validate_request(&request("Mouse", 1, None)),
            Err(RequestError::InvalidType("Mouse".to_string()))
        );
    }

    #[test]
    fn test_parse_rejects_trailing_data() {
        assert_eq!(
            parse_request(r#"{"code":4} {"code":5}"#),
            Err(RequestError::InvalidJson)
        );
        assert!(parse_request("{\"code\":4}\n").is_ok());
    }

    // ── Sending ───────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_keyboard_pair_sends_press_then_release() {
        // Arrange
        let mut sender = MockKeySender::new();
        let mut seq = Sequence::new();
        let mods = ModifierFlags(ModifierFlags::LEFT_SHIFT);
        sender
            .expect_send_keyboard()
            .withf(move |code, m, f, release, _| {
                *code == 0x04 && *m == mods && *f == KeyboardFlags::NONE && !*release
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _, _, _| Ok(()));
        sender
            .expect_send_keyboard()
            .withf(move |code, m, _, release, _| *code == 0x04 && *m == mods && *release)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _, _, _| Ok(()));
        let service = PressReleaseService::new(Arc::new(sender));

        // Act
        let action = KeyAction::Keyboard {
            code: 0x04,
            modifiers: mods,
            flags: KeyboardFlags::NONE,
        };
        let result = service.press_and_release(action, CancelToken::never()).await;

        // Assert
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_failed_press_skips_release() {
        // Arrange
        let mut sender = MockKeySender::new();
        sender
            .expect_send_consumer()
            .with(eq(0xE9), eq(false), mockall::predicate::always())
            .times(1)
            .returning(|_, _, _| Err(DeviceError::NotConnected));
        sender
            .expect_send_consumer()
            .with(eq(0xE9), eq(true), mockall::predicate::always())
            .never();
        let service = PressReleaseService::new(Arc::new(sender));

        // Act
        let result = service
            .press_and_release(KeyAction::Consumer { usage: 0xE9 }, CancelToken::never())
            .await;

        // Assert
        let err = result.unwrap_err();
        assert!(matches!(err, ControlError::Send(DeviceError::NotConnected)));
        assert_eq!(err.to_string(), "send failed: device not connected");
    }

    #[tokio::test]
    async fn test_invalid_request_never_reaches_sender() {
        let sender = MockKeySender::new();
        let service = PressReleaseService::new(Arc::new(sender));

        let response = service.handle(r#"{"type":"mouse","code":1}"#, Duration::from_secs(1)).await;

        assert_eq!(response, ControlResponse::error("invalid type: mouse"));
    }

    #[tokio::test]
    async fn test_handle_reports_ok() {
        let mut sender = MockKeySender::new();
        sender
            .expect_send_consumer()
            .times(2)
            .returning(|_, _, _| Ok(()));
        let service = PressReleaseService::new(Arc::new(sender));

        let response = service.handle(r#"{"type":"consumer","code":205}"#, Duration::from_secs(1)).await;

        assert!(response.is_ok());
    }

    #[tokio::test]
    async fn test_handle_reports_malformed_json() {
        let service = PressReleaseService::new(Arc::new(MockKeySender::new()));

        let response = service.handle("{\"code\":", Duration::from_secs(1)).await;

        assert_eq!(response, ControlResponse::error("invalid JSON body"));
    }

    /// Records every send and yields between them so concurrent pairs get a
    /// chance to interleave if the pair lock were missing.
    #[derive(Default)]
    struct SlowRecordingSender {
        sent: StdMutex<Vec<(u16, bool)>>,
    }

    #[async_trait]
    impl KeySender for SlowRecordingSender {
        async fn send_keyboard(
            &self,
            code: u8,
            _modifiers: ModifierFlags,
            _flags: KeyboardFlags,
            release: bool,
            _cancel: CancelToken,
        ) -> Result<(), DeviceError> {
            self.sent.lock().unwrap().push((u16::from(code), release));
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(())
        }

        async fn send_consumer(
            &self,
            usage: u16,
            release: bool,
            _cancel: CancelToken,
        ) -> Result<(), DeviceError> {
            self.sent.lock().unwrap().push((usage, release));
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_concurrent_pairs_do_not_interleave() {
        // Arrange
        let sender = Arc::new(SlowRecordingSender::default());
        let service = Arc::new(PressReleaseService::new(Arc::clone(&sender)));

        // Act: two clients, one pair each, started together
        let a = {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                service
                    .press_and_release(KeyAction::Consumer { usage: 0xE9 }, CancelToken::never())
                    .await
            })
        };
        let b = {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                service
                    .press_and_release(KeyAction::Consumer { usage: 0xEA }, CancelToken::never())
                    .await
            })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        // Assert: each press is immediately followed by its own release
        let sent = sender.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 4);
        for pair in sent.chunks(2) {
            assert_eq!(pair[0].0, pair[1].0);
            assert!(!pair[0].1);
            assert!(pair[1].1);
        }
    }

    #[tokio::test]
    async fn test_waiting_for_pair_lock_honours_cancellation() {
        // Arrange: hold the pair lock as if another pair were in flight
        let service = PressReleaseService::new(Arc::new(MockKeySender::new()));
        let _held = service.pair_lock.lock().await;
        let cancel = Signal::new();
        cancel.trigger();

        // Act
        let result = service
            .press_and_release(
                KeyAction::Consumer { usage: 0xE9 },
                CancelToken::from_signal(cancel),
            )
            .await;

        // Assert
        assert!(matches!(
            result,
            Err(ControlError::Send(DeviceError::Canceled(CancelReason::Canceled)))
        ));
    }
}
