pub mod auth;
pub mod config;
pub mod error;
pub mod gateway;
pub mod routes;

use std::sync::Arc;

use auth::Authenticator;
use config::Config;
use gateway::dispatcher::Dispatcher;
use gateway::lifecycle::ConnectionLifecycleManager;
use gateway::registry::ConnectionRegistry;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<ConnectionRegistry>,
    pub lifecycle: Arc<ConnectionLifecycleManager>,
    pub dispatcher: Dispatcher,
}

impl AppState {
    /// Wire one registry into both the lifecycle manager and the dispatcher.
    pub fn new(config: Config, authenticator: Arc<dyn Authenticator>) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let lifecycle = Arc::new(ConnectionLifecycleManager::new(
            registry.clone(),
            authenticator,
            &config,
        ));
        let dispatcher = Dispatcher::new(registry.clone());
        Self {
            config: Arc::new(config),
            registry,
            lifecycle,
            dispatcher,
        }
    }
}
