use std::time::Duration;

/// Gateway configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// HMAC secret shared with the REST API that issues access tokens.
    pub jwt_secret: String,
    /// Expected `iss` claim. Issuer is not checked when unset.
    pub jwt_issuer: Option<String>,
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Upper bound on a single credential verification.
    pub auth_timeout: Duration,
    /// Heartbeat interval advertised to clients in `connection-confirmed`.
    pub heartbeat_interval: Duration,
    /// Per-connection outbound queue length before pushes start failing.
    pub outbound_queue_capacity: usize,
    /// How often the registry audit sweeper runs.
    pub registry_audit_interval: Duration,
    /// Bearer key required on the internal dispatch endpoint, if set.
    pub internal_api_key: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a required variable is missing.
    pub fn from_env() -> Self {
        Self {
            jwt_secret: required_var("JWT_SECRET"),
            jwt_issuer: optional_var("JWT_ISSUER"),
            port: parsed_var("PORT").unwrap_or(4003),
            auth_timeout: Duration::from_millis(parsed_var("AUTH_TIMEOUT_MS").unwrap_or(5_000)),
            heartbeat_interval: Duration::from_millis(
                parsed_var("HEARTBEAT_INTERVAL_MS")
                    .filter(|ms: &u64| *ms > 0)
                    .unwrap_or(25_000),
            ),
            outbound_queue_capacity: parsed_var("OUTBOUND_QUEUE_CAPACITY")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(64),
            registry_audit_interval: Duration::from_secs(
                parsed_var("REGISTRY_AUDIT_INTERVAL_SECS")
                    .filter(|secs: &u64| *secs > 0)
                    .unwrap_or(60),
            ),
            internal_api_key: optional_var("INTERNAL_API_KEY"),
        }
    }

    /// A connection with no client traffic for this long is closed.
    pub fn idle_timeout(&self) -> Duration {
        self.heartbeat_interval * 3 / 2
    }
}

fn required_var(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} env var is required"))
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
