//! Relay server: accepts chat clients, registers them by user id, and forwards
//! chat frames to their recipients after passing the codeword through the
//! error injector.
//!
//! Per connection: `AwaitingHandshake -> Active -> Closed`. Malformed frames
//! while active get a `SERVER_ERROR` notice and the loop continues; a short
//! read or reset closes the connection and releases its user id.

use std::net::SocketAddr;
use std::sync::Arc;

use hamchat_core::{validate_user_id, ChatFrame, ErrorInjector, ServerMessage};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::registry::{ConnectionRegistry, Delivery};
use crate::transport::{read_frame, spawn_writer, Outbox};

const INVALID_FORMAT: &str =
    "Invalid message format. Use recipient|original_message|hamming_payload";
const INVALID_UTF8: &str = "Message is not valid UTF-8.";

pub struct RelayServer {
    listener: TcpListener,
    registry: Arc<ConnectionRegistry>,
    injector: ErrorInjector,
    seed: Option<u64>,
}

impl RelayServer {
    /// Validate the injection settings and bind the listener.
    pub async fn bind(cfg: &ServerConfig) -> Result<Self, ServerError> {
        let injector = cfg.injector()?;
        let addr = cfg.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        Ok(Self {
            listener,
            registry: Arc::new(ConnectionRegistry::new()),
            injector,
            seed: cfg.seed,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        self.registry.clone()
    }

    /// Accept connections forever, one task each.
    pub async fn run(self) -> Result<(), ServerError> {
        info!(
            addr = %self.local_addr()?,
            p_single = self.injector.p_single(),
            p_double = self.injector.p_double(),
            seeded = self.seed.is_some(),
            "relay listening"
        );
        let mut ordinal: u64 = 0;
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    continue;
                }
            };
            let rng = match self.seed {
                Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(ordinal)),
                None => StdRng::from_entropy(),
            };
            ordinal = ordinal.wrapping_add(1);
            let registry = self.registry.clone();
            let injector = self.injector;
            tokio::spawn(async move {
                handle_connection(stream, peer, registry, injector, rng).await;
            });
        }
    }
}

enum Rejection {
    /// Peer went away before completing the handshake.
    Disconnected,
    /// Tell the peer why, then close.
    Refused(String),
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    registry: Arc<ConnectionRegistry>,
    injector: ErrorInjector,
    mut rng: StdRng,
) {
    debug!(%peer, "connection accepted");
    let (mut reader, writer) = stream.into_split();
    let (outbox, writer_task) = spawn_writer(writer);

    match handshake(&mut reader, &registry, &outbox).await {
        Ok(user_id) => {
            info!(%peer, user = %user_id, "user connected");
            relay_loop(&mut reader, &user_id, &registry, &outbox, &injector, &mut rng).await;
            registry.unregister(&user_id, &outbox).await;
            info!(%peer, user = %user_id, "user disconnected");
        }
        Err(Rejection::Disconnected) => {
            debug!(%peer, "closed before handshake");
        }
        Err(Rejection::Refused(reason)) => {
            warn!(%peer, %reason, "handshake rejected");
            let _ = outbox.send(ServerMessage::error(reason).to_string()).await;
        }
    }
    drop(outbox);
    let _ = writer_task.await;
}

async fn handshake(
    reader: &mut OwnedReadHalf,
    registry: &ConnectionRegistry,
    outbox: &Outbox,
) -> Result<String, Rejection> {
    let body = read_frame(reader)
        .await
        .map_err(|_| Rejection::Disconnected)?;
    let raw = String::from_utf8(body).map_err(|_| Rejection::Refused(INVALID_UTF8.into()))?;
    let user_id = validate_user_id(&raw).map_err(|e| Rejection::Refused(e.to_string()))?;
    registry
        .register(user_id, outbox.clone())
        .await
        .map_err(|e| Rejection::Refused(e.to_string()))?;
    Ok(user_id.to_string())
}

async fn relay_loop(
    reader: &mut OwnedReadHalf,
    user_id: &str,
    registry: &ConnectionRegistry,
    outbox: &Outbox,
    injector: &ErrorInjector,
    rng: &mut StdRng,
) {
    loop {
        let body = match read_frame(reader).await {
            Ok(body) => body,
            Err(e) => {
                debug!(user = %user_id, error = %e, "read ended");
                return;
            }
        };
        let notice = match std::str::from_utf8(&body) {
            Ok(text) => forward(text, user_id, registry, injector, rng).await,
            Err(_) => Some(INVALID_UTF8.to_string()),
        };
        if let Some(reason) = notice {
            if outbox
                .send(ServerMessage::error(reason).to_string())
                .await
                .is_err()
            {
                return;
            }
        }
    }
}

/// Route one chat frame. Returns the notice for the sender, if any.
async fn forward(
    body: &str,
    sender: &str,
    registry: &ConnectionRegistry,
    injector: &ErrorInjector,
    rng: &mut StdRng,
) -> Option<String> {
    let frame = match ChatFrame::parse(body) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(user = %sender, error = %e, "malformed frame");
            return Some(INVALID_FORMAT.to_string());
        }
    };
    let (recipient, mut relayed) = frame.into_relayed();
    let Some(outbox) = registry.lookup(&recipient).await else {
        warn!(from = %sender, to = %recipient, "unknown recipient");
        return Some(format!("User '{recipient}' not found or offline."));
    };
    let record = injector.inject(&mut relayed.codeword, rng);
    match registry.deliver(&recipient, &outbox, relayed.to_string()).await {
        Delivery::Delivered => {
            if !record.is_clean() {
                warn!(
                    from = %sender,
                    to = %recipient,
                    kind = ?record.kind,
                    positions = ?record.positions,
                    "injected bit error"
                );
            }
            info!(from = %sender, to = %recipient, bits = relayed.codeword.len(), "relayed");
            None
        }
        Delivery::Closed => {
            warn!(from = %sender, to = %recipient, "recipient connection closed");
            Some(format!(
                "Failed to send message to '{recipient}', they might have disconnected."
            ))
        }
    }
}
