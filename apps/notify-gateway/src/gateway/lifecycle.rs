//! Connection lifecycle: authenticate, register, serve client events, unregister.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Utf8Bytes;
use tokio::sync::mpsc;
use tokio::time;

use crate::auth::{AuthFailure, Authenticator};
use crate::config::Config;

use super::events::{ClientEvent, ServerEvent};
use super::handle::ConnectionHandle;
use super::registry::ConnectionRegistry;

/// WebSocket close codes (4000-range for application-level).
pub const CLOSE_NORMAL: u16 = 1000;
pub const CLOSE_MALFORMED_FRAME: u16 = 4000;
pub const CLOSE_MISSING_CREDENTIAL: u16 = 4001;
pub const CLOSE_AUTH_FAILED: u16 = 4004;
pub const CLOSE_IDLE_TIMEOUT: u16 = 4009;

/// Per-connection state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Authenticating,
    Connected,
    Rejected,
    Disconnected,
}

impl ConnectionState {
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Connecting, Authenticating)
                | (Connecting, Rejected)
                | (Authenticating, Connected)
                | (Authenticating, Rejected)
                | (Connecting | Authenticating | Connected, Disconnected)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Rejected | ConnectionState::Disconnected)
    }
}

/// Why a connection attempt was refused. Logged, never sent to the client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RejectReason {
    #[error("no credential presented")]
    MissingCredential,
    #[error("{0}")]
    AuthFailed(AuthFailure),
    #[error("authentication timed out")]
    Timeout,
    #[error("handle could not be registered")]
    RegistryConflict,
}

impl RejectReason {
    /// Close code sent to the client. Timeouts look like any other failure.
    pub fn close_code(&self) -> u16 {
        match self {
            RejectReason::MissingCredential => CLOSE_MISSING_CREDENTIAL,
            _ => CLOSE_AUTH_FAILED,
        }
    }

    /// Generic close reason; the detailed cause stays in the logs.
    pub fn client_message(&self) -> &'static str {
        match self {
            RejectReason::MissingCredential => "Authentication required",
            _ => "Authentication failed",
        }
    }
}

/// What ended a connected session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    ClientClosed,
    Logout,
    TransportError,
    IdleTimeout,
    MalformedFrame,
    ServerShutdown,
}

impl DisconnectReason {
    pub fn close_code(self) -> u16 {
        match self {
            DisconnectReason::IdleTimeout => CLOSE_IDLE_TIMEOUT,
            DisconnectReason::MalformedFrame => CLOSE_MALFORMED_FRAME,
            _ => CLOSE_NORMAL,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DisconnectReason::ClientClosed => "client_closed",
            DisconnectReason::Logout => "logout",
            DisconnectReason::TransportError => "transport_error",
            DisconnectReason::IdleTimeout => "idle_timeout",
            DisconnectReason::MalformedFrame => "malformed_frame",
            DisconnectReason::ServerShutdown => "server_shutdown",
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response to a client event on a connected session.
#[derive(Debug)]
pub enum SessionReply {
    Send(ServerEvent),
    Ignore,
    Close(DisconnectReason),
}

/// Accepts or rejects new connections and owns their registry membership.
pub struct ConnectionLifecycleManager {
    registry: Arc<ConnectionRegistry>,
    authenticator: Arc<dyn Authenticator>,
    auth_timeout: Duration,
    heartbeat_interval: Duration,
    queue_capacity: usize,
}

impl ConnectionLifecycleManager {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        authenticator: Arc<dyn Authenticator>,
        config: &Config,
    ) -> Self {
        Self {
            registry,
            authenticator,
            auth_timeout: config.auth_timeout,
            heartbeat_interval: config.heartbeat_interval,
            queue_capacity: config.outbound_queue_capacity,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Run a connection attempt from Connecting to Connected or Rejected.
    ///
    /// On success the handle is already registered; the returned receiver
    /// yields every frame pushed to it. A rejected attempt never touches the
    /// registry.
    pub async fn accept(
        &self,
        credential: Option<String>,
    ) -> Result<(Session, mpsc::Receiver<Utf8Bytes>), RejectReason> {
        let mut state = ConnectionState::Connecting;

        let Some(credential) = credential else {
            advance(&mut state, ConnectionState::Rejected);
            tracing::debug!("connection rejected: missing credential");
            return Err(RejectReason::MissingCredential);
        };

        advance(&mut state, ConnectionState::Authenticating);
        let verify = self.authenticator.verify(&credential);
        let identity = match time::timeout(self.auth_timeout, verify).await {
            Ok(Ok(identity)) => identity,
            Ok(Err(failure)) => {
                advance(&mut state, ConnectionState::Rejected);
                tracing::debug!(%failure, "connection rejected: authentication failed");
                return Err(RejectReason::AuthFailed(failure));
            }
            Err(_elapsed) => {
                advance(&mut state, ConnectionState::Rejected);
                tracing::debug!(
                    timeout_ms = self.auth_timeout.as_millis() as u64,
                    "connection rejected: authentication timed out"
                );
                return Err(RejectReason::Timeout);
            }
        };

        let (handle, outbound_rx) = ConnectionHandle::open(&identity.user_id, self.queue_capacity);
        if !self.registry.add(&identity.user_id, handle.clone()) {
            advance(&mut state, ConnectionState::Rejected);
            tracing::error!(
                user_id = %identity.user_id,
                socket_id = %handle.id(),
                "fresh handle could not be registered"
            );
            return Err(RejectReason::RegistryConflict);
        }
        advance(&mut state, ConnectionState::Connected);

        tracing::info!(
            user_id = %identity.user_id,
            socket_id = %handle.id(),
            "notification connection established"
        );

        let session = Session {
            handle,
            state,
            registry: self.registry.clone(),
            heartbeat_interval: self.heartbeat_interval,
        };
        Ok((session, outbound_rx))
    }
}

fn advance(state: &mut ConnectionState, next: ConnectionState) {
    debug_assert!(
        state.can_transition_to(next),
        "invalid connection transition {state:?} -> {next:?}"
    );
    tracing::trace!(from = ?*state, to = ?next, "connection state change");
    *state = next;
}

/// A connected client. Dropping the session unregisters its handle, so the
/// registry entry never outlives the connection task.
pub struct Session {
    handle: Arc<ConnectionHandle>,
    state: ConnectionState,
    registry: Arc<ConnectionRegistry>,
    heartbeat_interval: Duration,
}

impl Session {
    pub fn handle(&self) -> &Arc<ConnectionHandle> {
        &self.handle
    }

    pub fn user_id(&self) -> &str {
        self.handle.user_id()
    }

    pub fn socket_id(&self) -> &str {
        self.handle.id()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// The `connection-confirmed` event sent once after authentication.
    pub fn confirmation(&self) -> ServerEvent {
        ServerEvent::connection_confirmed(
            self.user_id(),
            self.socket_id(),
            self.heartbeat_interval.as_millis() as u64,
        )
    }

    pub fn on_event(&mut self, event: ClientEvent) -> SessionReply {
        if self.state != ConnectionState::Connected {
            return SessionReply::Ignore;
        }

        match event {
            ClientEvent::Ping => SessionReply::Send(ServerEvent::pong()),
            ClientEvent::MarkRead { notification_id } => {
                tracing::debug!(
                    user_id = %self.user_id(),
                    notification_id = %notification_id,
                    "mark-read acknowledged"
                );
                SessionReply::Send(ServerEvent::marked_read(&notification_id))
            }
            ClientEvent::SyncRequest { last_sync_time } => {
                tracing::debug!(
                    user_id = %self.user_id(),
                    last_sync_time = last_sync_time.as_deref().unwrap_or("-"),
                    "sync requested"
                );
                SessionReply::Send(ServerEvent::sync_response(
                    self.user_id(),
                    last_sync_time.as_deref(),
                ))
            }
            ClientEvent::Logout => SessionReply::Close(DisconnectReason::Logout),
            ClientEvent::Unknown(name) => {
                tracing::debug!(
                    socket_id = %self.socket_id(),
                    event = %name,
                    "ignoring unknown client event"
                );
                SessionReply::Ignore
            }
        }
    }

    /// Move to Disconnected and unregister the handle.
    pub fn disconnect(mut self, reason: DisconnectReason) {
        self.unregister();
        tracing::info!(
            user_id = %self.user_id(),
            socket_id = %self.socket_id(),
            %reason,
            "notification connection closed"
        );
    }

    fn unregister(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        advance(&mut self.state, ConnectionState::Disconnected);
        self.registry.remove(self.handle.id());
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.unregister();
    }
}
