//! Connection registry: user id -> outbox of the live connection registered under it.

use std::collections::HashMap;

use tokio::sync::Mutex;

use crate::transport::Outbox;

/// Outcome of handing one body to a looked-up outbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// The writer is gone; the entry has been removed.
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegisterError {
    #[error("User ID '{0}' is already in use.")]
    InUse(String),
}

/// At most one connection per user id. Shared by every connection task.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    inner: Mutex<HashMap<String, Outbox>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `user_id`. Check and insert happen under one lock.
    pub async fn register(&self, user_id: &str, outbox: Outbox) -> Result<(), RegisterError> {
        let mut map = self.inner.lock().await;
        if map.contains_key(user_id) {
            return Err(RegisterError::InUse(user_id.to_string()));
        }
        map.insert(user_id.to_string(), outbox);
        Ok(())
    }

    /// Release `user_id` if it is still held by `outbox`. Returns whether an entry was removed.
    pub async fn unregister(&self, user_id: &str, outbox: &Outbox) -> bool {
        let mut map = self.inner.lock().await;
        match map.get(user_id) {
            Some(current) if current.same_channel(outbox) => {
                map.remove(user_id);
                true
            }
            _ => false,
        }
    }

    /// Outbox registered under `user_id`. A miss is not an error here; callers
    /// decide how to report an unknown recipient.
    pub async fn lookup(&self, user_id: &str) -> Option<Outbox> {
        self.inner.lock().await.get(user_id).cloned()
    }

    /// Hand `body` to an outbox obtained from [`lookup`](Self::lookup), waiting
    /// while it is full. The registry lock is not held while waiting.
    pub async fn deliver(&self, user_id: &str, outbox: &Outbox, body: String) -> Delivery {
        if outbox.send(body).await.is_ok() {
            return Delivery::Delivered;
        }
        self.unregister(user_id, outbox).await;
        Delivery::Closed
    }

    pub async fn contains(&self, user_id: &str) -> bool {
        self.inner.lock().await.contains_key(user_id)
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }
}
