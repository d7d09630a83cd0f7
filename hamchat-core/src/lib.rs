//! hamchat core: Hamming SEC codec, chat framing and relay-side error injection.
//! No I/O; the `hamchat` binary drives sockets and calls into this crate.

pub mod bits;
pub mod hamming;
pub mod inject;
pub mod nibble;
pub mod protocol;
pub mod wire;

pub use bits::{BitString, ParseBitsError};
pub use hamming::{decode, encode, required_parity_bits, DecodeError, Decoded};
pub use inject::{ErrorInjector, InjectionKind, InjectionRecord, InjectorError};
pub use protocol::{
    validate_user_id, ChatFrame, FrameError, RelayedFrame, ServerMessage, UserIdError, SEPARATOR,
    SERVER_ERROR,
};
pub use wire::{body_len, encode_frame, FrameDecodeError, FrameEncodeError, MAX_FRAME_LEN};
