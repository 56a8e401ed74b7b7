//! Credential extraction from the WebSocket upgrade request.

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use serde::Deserialize;

/// Query parameters accepted on the upgrade request. Browsers cannot set
/// headers on a WebSocket handshake, so the token usually arrives here.
#[derive(Debug, Default, Deserialize)]
pub struct HandshakeParams {
    #[serde(default)]
    pub token: Option<String>,
}

/// Pull the bearer credential out of the handshake: the `token` query
/// parameter first, then an `Authorization: Bearer` header.
pub fn extract_credential(headers: &HeaderMap, params: &HandshakeParams) -> Option<String> {
    if let Some(token) = params.token.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        return Some(token.to_string());
    }

    let header = headers.get(AUTHORIZATION)?.to_str().ok()?;
    bearer_token(header).map(str::to_string)
}

/// Strip a case-insensitive `Bearer ` scheme. Empty tokens count as missing.
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}
