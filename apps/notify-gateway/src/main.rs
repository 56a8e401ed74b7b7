use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use notify_gateway::auth::jwt::JwtAuthenticator;
use notify_gateway::auth::Authenticator;
use notify_gateway::config::Config;
use notify_gateway::gateway::registry::ConnectionRegistry;
use notify_gateway::AppState;

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing, env vars may be set externally)
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;
    let audit_interval = config.registry_audit_interval;

    let authenticator: Arc<dyn Authenticator> = Arc::new(JwtAuthenticator::new(
        &config.jwt_secret,
        config.jwt_issuer.as_deref(),
    ));

    tracing::info!(
        auth_timeout_ms = config.auth_timeout.as_millis() as u64,
        heartbeat_interval_ms = config.heartbeat_interval.as_millis() as u64,
        internal_key = config.internal_api_key.is_some(),
        "notify-gateway configured"
    );

    let state = AppState::new(config, authenticator);
    tokio::spawn(run_registry_audit(state.registry.clone(), audit_interval));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(notify_gateway::routes::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "notify-gateway listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

/// Periodically repair any drift between the registry's two indexes.
async fn run_registry_audit(registry: Arc<ConnectionRegistry>, every: std::time::Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let repaired = registry.audit();
        let stats = registry.count();
        if repaired > 0 {
            tracing::error!(repaired, "registry audit repaired inconsistent entries");
        }
        tracing::debug!(users = stats.users, connections = stats.connections, "registry audit");
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(?e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
