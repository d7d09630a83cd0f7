//! Chat client: a session with a background receive task that decodes relayed
//! codewords, plus the interactive send loop driven by line input.

use hamchat_core::{
    decode, validate_user_id, BitString, ChatFrame, DecodeError, Decoded, ServerMessage,
};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::SessionError;
use crate::transport::{read_frame, write_frame};

/// A relayed message after decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    /// Plaintext the sender claims to have sent. Travels unprotected.
    pub original: String,
    /// Codeword as received, before correction.
    pub codeword: BitString,
    pub outcome: Result<Decoded, DecodeError>,
}

impl ReceivedMessage {
    pub fn new(original: String, codeword: BitString) -> Self {
        let outcome = decode(&codeword);
        Self {
            original,
            codeword,
            outcome,
        }
    }

    /// Decoded fine but to something other than what was sent (e.g. a miscorrected double error).
    pub fn differs_from_original(&self) -> bool {
        matches!(&self.outcome, Ok(d) if d.message != self.original)
    }
}

/// What the receive task reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Message(ReceivedMessage),
    ServerError(String),
    /// Frame that is neither a relayed message nor a notice.
    Malformed(String),
    Disconnected,
}

/// Classify one body received from the relay.
pub fn interpret(body: &[u8]) -> ClientEvent {
    let Ok(text) = std::str::from_utf8(body) else {
        return ClientEvent::Malformed("received non-UTF-8 data".into());
    };
    match ServerMessage::parse(text) {
        Ok(ServerMessage::Error(reason)) => ClientEvent::ServerError(reason),
        Ok(ServerMessage::Relayed(frame)) => {
            ClientEvent::Message(ReceivedMessage::new(frame.original, frame.codeword))
        }
        Err(e) => ClientEvent::Malformed(e.to_string()),
    }
}

/// One connected, logged-in user.
pub struct Session {
    user_id: String,
    writer: OwnedWriteHalf,
    events: mpsc::UnboundedReceiver<ClientEvent>,
    receiver: JoinHandle<()>,
}

impl Session {
    /// Connect and send the handshake. The relay accepts silently; a rejection
    /// arrives as a [`ClientEvent::ServerError`] followed by [`ClientEvent::Disconnected`].
    pub async fn connect<A: ToSocketAddrs>(addr: A, user_id: &str) -> Result<Self, SessionError> {
        let user_id = validate_user_id(user_id)?.to_string();
        let stream = TcpStream::connect(addr).await?;
        let (mut reader, mut writer) = stream.into_split();
        write_frame(&mut writer, &user_id).await?;

        let (tx, events) = mpsc::unbounded_channel();
        let receiver = tokio::spawn(async move {
            loop {
                let event = match read_frame(&mut reader).await {
                    Ok(body) => interpret(&body),
                    Err(e) => {
                        debug!(error = %e, "receive ended");
                        let _ = tx.send(ClientEvent::Disconnected);
                        return;
                    }
                };
                if tx.send(event).is_err() {
                    return;
                }
            }
        });
        Ok(Self {
            user_id,
            writer,
            events,
            receiver,
        })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Encode `text` and send it to `recipient`. Returns the frame as sent.
    pub async fn send(&mut self, recipient: &str, text: &str) -> Result<ChatFrame, SessionError> {
        let frame = ChatFrame::new(recipient, text)?;
        write_frame(&mut self.writer, &frame.to_string()).await?;
        Ok(frame)
    }

    /// Next event from the receive task; `None` once it has finished and been drained.
    pub async fn next_event(&mut self) -> Option<ClientEvent> {
        self.events.recv().await
    }

    /// Close the connection.
    pub async fn close(mut self) {
        let _ = self.writer.shutdown().await;
        self.receiver.abort();
    }
}

/// A parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send { recipient: String, text: String },
    Quit,
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("Invalid format! Use: recipient_id/message")]
    MissingSeparator,
    #[error("Both recipient and message are required!")]
    MissingField,
}

/// Parse `recipient/message` or `/quit`. Only the recipient is trimmed; the
/// message is sent exactly as typed, including any further '/'.
pub fn parse_command(line: &str) -> Result<Command, CommandError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(Command::Empty);
    }
    if trimmed.eq_ignore_ascii_case("/quit") {
        return Ok(Command::Quit);
    }
    let (recipient, text) = line
        .split_once('/')
        .ok_or(CommandError::MissingSeparator)?;
    let recipient = recipient.trim();
    if recipient.is_empty() || text.trim().is_empty() {
        return Err(CommandError::MissingField);
    }
    Ok(Command::Send {
        recipient: recipient.to_string(),
        text: text.to_string(),
    })
}

/// Human-readable rendering of an event.
pub fn render_event(event: &ClientEvent) -> String {
    match event {
        ClientEvent::Message(msg) => render_message(msg),
        ClientEvent::ServerError(reason) => format!("[SERVER ERROR] {reason}"),
        ClientEvent::Malformed(detail) => {
            format!("[CLIENT] Invalid message format received from server: {detail}")
        }
        ClientEvent::Disconnected => "[CLIENT] Connection closed by server.".to_string(),
    }
}

fn render_message(msg: &ReceivedMessage) -> String {
    let decoded = match &msg.outcome {
        Ok(d) => d,
        Err(_) => {
            return [
                "--- [TRANSMISSION ERROR] ---",
                "Non-repairable transmission error detected!",
                "Message corrupted and cannot be recovered.",
                "----------------------------",
            ]
            .join("\n");
        }
    };
    let mut out = match decoded.error_position {
        Some(pos) => format!(
            "--- [MESSAGE (Error Corrected at bit {pos})] ---\n{}\n{}",
            decoded.message,
            "-".repeat(50)
        ),
        None => format!("--- [MESSAGE] ---\n{}\n{}", decoded.message, "-".repeat(17)),
    };
    if msg.differs_from_original() {
        out.push_str(&format!(
            "\n[WARNING] Decoded message '{}' differs from original transmission '{}'!",
            decoded.message, msg.original
        ));
    }
    out
}

/// Drive a session from line input until `/quit`, end of input, or disconnect.
/// Sending and receiving interleave; every outcome is written to `output`.
pub async fn run_interactive<I, W>(
    mut session: Session,
    input: I,
    output: &mut W,
) -> Result<(), SessionError>
where
    I: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let result = loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break Ok(()),
                    Err(e) => break Err(SessionError::from(e)),
                };
                let reply = match parse_command(&line) {
                    Ok(Command::Empty) => continue,
                    Ok(Command::Quit) => {
                        break write_line(output, "Disconnecting...")
                            .await
                            .map_err(SessionError::from);
                    }
                    Ok(Command::Send { recipient, text }) => {
                        match session.send(&recipient, &text).await {
                            Ok(frame) => format!(
                                "Message sent to {} ({} bits encoded).",
                                frame.recipient,
                                frame.codeword.len()
                            ),
                            Err(SessionError::Frame(e)) => format!("[CLIENT] {e}"),
                            Err(e) => break Err(e),
                        }
                    }
                    Err(e) => e.to_string(),
                };
                if let Err(e) = write_line(output, &reply).await {
                    break Err(SessionError::from(e));
                }
            }
            event = session.next_event() => {
                let Some(event) = event else { break Ok(()) };
                if let Err(e) = write_line(output, &format!("\n{}", render_event(&event))).await {
                    break Err(SessionError::from(e));
                }
                if matches!(event, ClientEvent::Disconnected) {
                    break Ok(());
                }
            }
        }
    };
    session.close().await;
    result
}

async fn write_line<W: AsyncWrite + Unpin>(output: &mut W, text: &str) -> std::io::Result<()> {
    output.write_all(text.as_bytes()).await?;
    output.write_all(b"\n").await?;
    output.flush().await
}
