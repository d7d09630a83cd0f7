//! hamchat: relay server and chat client for Hamming-protected text messages.
//! Codec, framing and error injection live in `hamchat-core`.

pub mod client;
pub mod config;
pub mod error;
pub mod registry;
pub mod server;
pub mod transport;

pub use client::{ClientEvent, ReceivedMessage, Session};
pub use config::{ClientConfig, Config, ServerConfig};
pub use error::{ConfigError, ServerError, SessionError};
pub use registry::{ConnectionRegistry, Delivery, RegisterError};
pub use server::RelayServer;
