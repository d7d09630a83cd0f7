//! Framed TCP I/O: length-prefixed text bodies over a split stream, and the per-connection writer task.

use hamchat_core::wire::{body_len, encode_frame, LEN_SIZE};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Queue of bodies waiting to be written to one connection. Bounded, so a
/// sender waits on the recipient's socket instead of buffering in the relay.
pub type Outbox = mpsc::Sender<String>;

/// Bodies queued per connection beyond the one being written.
pub const OUTBOX_CAPACITY: usize = 1;

/// Read one frame body. EOF mid-frame surfaces as `UnexpectedEof`; an oversized header as `InvalidData`.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> std::io::Result<Vec<u8>> {
    let mut len_buf = [0u8; LEN_SIZE];
    reader.read_exact(&mut len_buf).await?;
    let len = body_len(len_buf)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(body)
}

/// Write one frame and flush.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, body: &str) -> std::io::Result<()> {
    let frame = encode_frame(body)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    writer.write_all(&frame).await?;
    writer.flush().await
}

/// Spawn a task draining an outbox into `writer`. The task ends when every
/// sender is dropped or a write fails; the socket is shut down on exit.
pub fn spawn_writer(mut writer: OwnedWriteHalf) -> (Outbox, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<String>(OUTBOX_CAPACITY);
    let handle = tokio::spawn(async move {
        while let Some(body) = rx.recv().await {
            if let Err(e) = write_frame(&mut writer, &body).await {
                debug!(error = %e, "writer stopped");
                break;
            }
        }
        let _ = writer.shutdown().await;
    });
    (tx, handle)
}
