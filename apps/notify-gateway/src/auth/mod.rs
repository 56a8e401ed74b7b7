//! Connection-time credential verification.
//!
//! The gateway only needs a user identity out of a bearer credential; how the
//! credential is checked is behind the [`Authenticator`] trait.

pub mod handshake;
pub mod jwt;
pub mod middleware;

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

/// Identity resolved from a valid credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub user_id: String,
    pub email: Option<String>,
    pub role: Option<String>,
}

impl UserIdentity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: None,
            role: None,
        }
    }
}

/// Why a credential was refused. Logged server-side, never sent to clients.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthFailure {
    #[error("credential is malformed")]
    Malformed,
    #[error("credential has expired")]
    Expired,
    #[error("credential signature or claims are invalid")]
    Invalid,
    #[error("credential carries no user identity")]
    MissingSubject,
    #[error("authenticator unavailable: {0}")]
    Unavailable(String),
}

/// Validates a bearer credential presented at connection time.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn verify(&self, credential: &str) -> Result<UserIdentity, AuthFailure>;
}

/// Fixed token → identity table, for local development and tests.
#[derive(Default)]
pub struct StaticAuthenticator {
    tokens: RwLock<HashMap<String, UserIdentity>>,
}

impl StaticAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(self, token: &str, user_id: &str) -> Self {
        self.insert(token, user_id);
        self
    }

    pub fn insert(&self, token: &str, user_id: &str) {
        self.tokens
            .write()
            .insert(token.to_string(), UserIdentity::new(user_id));
    }

    /// Revoke a token; later connection attempts with it are rejected.
    pub fn revoke(&self, token: &str) {
        self.tokens.write().remove(token);
    }
}

#[async_trait]
impl Authenticator for StaticAuthenticator {
    async fn verify(&self, credential: &str) -> Result<UserIdentity, AuthFailure> {
        self.tokens
            .read()
            .get(credential)
            .cloned()
            .ok_or(AuthFailure::Invalid)
    }
}
