//! Chat wire protocol: `|`-delimited text bodies.
//!
//! - handshake (client -> server): bare user id
//! - chat (client -> server): `recipient|original|bits`
//! - relayed (server -> recipient): `original|bits`
//! - notice (server -> client): `SERVER_ERROR|reason`
//!
//! `bits` is the ASCII '0'/'1' rendering of a Hamming codeword. `original` is
//! the sender's plaintext and is not error-protected; receivers use it only to
//! flag a decode that differs from what was sent.

use std::fmt;

use crate::bits::{BitString, ParseBitsError};
use crate::hamming;

/// Field separator. Reserved: may not appear in user ids, recipients or message text.
pub const SEPARATOR: char = '|';

/// Tag of server error notices.
pub const SERVER_ERROR: &str = "SERVER_ERROR";

/// Client -> server chat frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatFrame {
    pub recipient: String,
    pub original: String,
    pub codeword: BitString,
}

impl ChatFrame {
    /// Build a frame for `text`, Hamming-encoding it.
    pub fn new(recipient: &str, text: &str) -> Result<Self, FrameError> {
        let recipient = recipient.trim();
        if recipient.is_empty() {
            return Err(FrameError::EmptyRecipient);
        }
        if recipient.contains(SEPARATOR) {
            return Err(FrameError::ReservedSeparator { field: "recipient" });
        }
        if text.contains(SEPARATOR) {
            return Err(FrameError::ReservedSeparator { field: "message" });
        }
        Ok(Self {
            recipient: recipient.to_string(),
            original: text.to_string(),
            codeword: hamming::encode(text),
        })
    }

    /// Parse `recipient|original|bits`, splitting on the first two separators.
    pub fn parse(body: &str) -> Result<Self, FrameError> {
        let parts: Vec<&str> = body.splitn(3, SEPARATOR).collect();
        let &[recipient, original, bits] = parts.as_slice() else {
            return Err(FrameError::FieldCount {
                expected: 3,
                found: parts.len(),
            });
        };
        Ok(Self {
            recipient: recipient.to_string(),
            original: original.to_string(),
            codeword: bits.parse()?,
        })
    }

    /// Drop the routing field, keeping what the recipient sees.
    pub fn into_relayed(self) -> (String, RelayedFrame) {
        (
            self.recipient,
            RelayedFrame {
                original: self.original,
                codeword: self.codeword,
            },
        )
    }
}

impl fmt::Display for ChatFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{SEPARATOR}{}{SEPARATOR}{}",
            self.recipient, self.original, self.codeword
        )
    }
}

/// Server -> recipient frame, codeword possibly corrupted in transit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayedFrame {
    pub original: String,
    pub codeword: BitString,
}

impl RelayedFrame {
    /// Parse `original|bits`, splitting on the first separator.
    pub fn parse(body: &str) -> Result<Self, FrameError> {
        let Some((original, bits)) = body.split_once(SEPARATOR) else {
            return Err(FrameError::FieldCount {
                expected: 2,
                found: 1,
            });
        };
        Ok(Self {
            original: original.to_string(),
            codeword: bits.parse()?,
        })
    }
}

impl fmt::Display for RelayedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{SEPARATOR}{}", self.original, self.codeword)
    }
}

/// Anything the server sends to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    Relayed(RelayedFrame),
    Error(String),
}

impl ServerMessage {
    pub fn error(reason: impl Into<String>) -> Self {
        ServerMessage::Error(reason.into())
    }

    pub fn parse(body: &str) -> Result<Self, FrameError> {
        if let Some(reason) = body
            .strip_prefix(SERVER_ERROR)
            .and_then(|rest| rest.strip_prefix(SEPARATOR))
        {
            return Ok(ServerMessage::Error(reason.to_string()));
        }
        RelayedFrame::parse(body).map(ServerMessage::Relayed)
    }
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMessage::Relayed(frame) => write!(f, "{frame}"),
            ServerMessage::Error(reason) => write!(f, "{SERVER_ERROR}{SEPARATOR}{reason}"),
        }
    }
}

/// Trim a handshake id and check it can be registered and routed to.
pub fn validate_user_id(raw: &str) -> Result<&str, UserIdError> {
    let id = raw.trim();
    if id.is_empty() {
        return Err(UserIdError::Empty);
    }
    if id.contains(SEPARATOR) {
        return Err(UserIdError::ReservedSeparator);
    }
    Ok(id)
}

/// Error parsing or building a frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("expected {expected} fields, found {found}")]
    FieldCount { expected: usize, found: usize },
    #[error("invalid hamming payload: {0}")]
    Payload(#[from] ParseBitsError),
    #[error("{field} may not contain '|'")]
    ReservedSeparator { field: &'static str },
    #[error("recipient is required")]
    EmptyRecipient,
}

/// Handshake id rejection. Display text is sent to the client verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UserIdError {
    #[error("User ID cannot be empty.")]
    Empty,
    #[error("User ID cannot contain '|'.")]
    ReservedSeparator,
}
