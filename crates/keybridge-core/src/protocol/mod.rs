//! Protocol module containing the serial frame codec.

pub mod frame;

pub use frame::{decode_frame, encode_frame, Frame, FrameClass, FrameError, HidEvent, FRAME_LEN};
