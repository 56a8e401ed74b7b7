#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use jsonwebtoken::{Algorithm, EncodingKey, Header};

use notify_gateway::auth::jwt::{AccessClaims, JwtAuthenticator};
use notify_gateway::config::Config;
use notify_gateway::AppState;

pub const TEST_SECRET: &str = "test-secret-do-not-use-in-production";
pub const INTERNAL_KEY: &str = "internal-test-key";

/// Config with fast timeouts and no environment lookups.
pub fn test_config() -> Config {
    Config {
        jwt_secret: TEST_SECRET.to_string(),
        jwt_issuer: None,
        port: 0,
        auth_timeout: Duration::from_secs(2),
        heartbeat_interval: Duration::from_secs(20),
        outbound_queue_capacity: 16,
        registry_audit_interval: Duration::from_secs(60),
        internal_api_key: None,
    }
}

/// Build a test AppState backed by the real JWT authenticator.
pub fn test_state_with(config: Config) -> AppState {
    let authenticator = Arc::new(JwtAuthenticator::new(
        &config.jwt_secret,
        config.jwt_issuer.as_deref(),
    ));
    AppState::new(config, authenticator)
}

pub fn test_state() -> AppState {
    test_state_with(test_config())
}

/// Build the full application router wired to the given state.
pub fn test_app(state: &AppState) -> Router {
    notify_gateway::routes::router().with_state(state.clone())
}

/// Mint an access token for `user_id` signed with the test secret.
pub fn mint_token(user_id: &str) -> String {
    mint_with_expiry(user_id, 300)
}

/// Mint a token that expired five minutes ago.
pub fn mint_expired_token(user_id: &str) -> String {
    mint_with_expiry(user_id, -300)
}

fn mint_with_expiry(user_id: &str, offset_secs: i64) -> String {
    let claims = AccessClaims {
        sub: Some(user_id.to_string()),
        user_id: None,
        email: Some(format!("{user_id}@example.com")),
        role: Some("client".to_string()),
        iss: None,
        exp: chrono::Utc::now().timestamp() + offset_secs,
    };
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
    )
    .expect("mint test token")
}

/// Start an actual TCP server for WebSocket testing. The server runs in the
/// background for the rest of the test.
pub async fn start_server(state: &AppState) -> SocketAddr {
    let app = test_app(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    addr
}

/// Poll until `check` holds or a second has passed.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
