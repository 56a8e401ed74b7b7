//! One live duplex connection, as seen by the rest of the gateway.

use std::sync::Arc;

use axum::extract::ws::Utf8Bytes;
use chrono::{DateTime, Utc};
use marketplace_common::id::{prefix, prefixed_ulid};
use tokio::sync::mpsc;

/// Why a frame could not be queued for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PushError {
    #[error("outbound queue is full")]
    QueueFull,
    #[error("connection is closed")]
    Closed,
}

/// A single device/tab connection owned by the lifecycle manager.
///
/// The handle owns the sending half of its connection's outbound queue, so a
/// push never has to look the socket up anywhere else. The socket task owns
/// the receiving half and is the only writer to the transport.
#[derive(Debug)]
pub struct ConnectionHandle {
    id: String,
    user_id: String,
    created_at: DateTime<Utc>,
    outbound: mpsc::Sender<Utf8Bytes>,
}

impl ConnectionHandle {
    /// Create a handle with a fresh `conn_` id and a bounded outbound queue.
    pub fn open(user_id: &str, capacity: usize) -> (Arc<Self>, mpsc::Receiver<Utf8Bytes>) {
        Self::open_with_id(prefixed_ulid(prefix::CONNECTION), user_id, capacity)
    }

    pub fn open_with_id(
        id: String,
        user_id: &str,
        capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<Utf8Bytes>) {
        let (outbound, rx) = mpsc::channel(capacity.max(1));
        let handle = Self {
            id,
            user_id: user_id.to_string(),
            created_at: Utc::now(),
            outbound,
        };
        (Arc::new(handle), rx)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Queue a text frame without waiting.
    pub fn push(&self, frame: Utf8Bytes) -> Result<(), PushError> {
        self.outbound.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => PushError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => PushError::Closed,
        })
    }

    /// True once the socket task has dropped its receiver.
    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }
}
