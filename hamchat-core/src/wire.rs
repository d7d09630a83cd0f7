//! Framing: length-prefix (4 bytes BE) + UTF-8 body.
//!
//! The body is one [`protocol`](crate::protocol) text message. A reader must
//! get the whole header, then exactly the declared number of body bytes; a
//! short read at either stage means the peer went away.

pub const LEN_SIZE: usize = 4;
pub const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024; // 16 MiB

/// Encode a body into a single frame: 4 bytes BE length + body.
pub fn encode_frame(body: &str) -> Result<Vec<u8>, FrameEncodeError> {
    let len = u32::try_from(body.len()).map_err(|_| FrameEncodeError::TooLarge)?;
    if len > MAX_FRAME_LEN {
        return Err(FrameEncodeError::TooLarge);
    }
    let mut out = Vec::with_capacity(LEN_SIZE + body.len());
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(body.as_bytes());
    Ok(out)
}

/// Error encoding a frame.
#[derive(Debug, thiserror::Error)]
pub enum FrameEncodeError {
    #[error("frame too large")]
    TooLarge,
}

/// Body length declared by a header, checked against [`MAX_FRAME_LEN`].
pub fn body_len(header: [u8; LEN_SIZE]) -> Result<usize, FrameDecodeError> {
    let len = u32::from_be_bytes(header);
    if len > MAX_FRAME_LEN {
        return Err(FrameDecodeError::TooLarge(len));
    }
    Ok(len as usize)
}

/// Error reading a frame header.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum FrameDecodeError {
    #[error("declared frame length {0} exceeds limit")]
    TooLarge(u32),
}
