use std::net::SocketAddr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

impl Environment {
    /// Carrier production endpoints are only used in production.
    #[must_use]
    pub fn uses_carrier_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

/// Where tracked records are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Clone)]
pub struct PurolatorCredentials {
    pub key: String,
    pub password: String,
    pub account_number: String,
    /// Overrides the environment-selected endpoint.
    pub base_url: Option<String>,
}

impl std::fmt::Debug for PurolatorCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PurolatorCredentials")
            .field("key", &"[redacted]")
            .field("password", &"[redacted]")
            .field("account_number", &self.account_number)
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Clone)]
pub struct UpsCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub merchant_id: Option<String>,
    /// Overrides the environment-selected endpoint.
    pub base_url: Option<String>,
}

impl std::fmt::Debug for UpsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpsCredentials")
            .field("client_id", &"[redacted]")
            .field("client_secret", &"[redacted]")
            .field("merchant_id", &self.merchant_id)
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub store_backend: StoreBackend,
    pub database_url: Option<String>,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub carrier_request_timeout_secs: u64,
    pub carrier_user_agent: String,
    pub carrier_max_retries: u32,
    pub carrier_retry_backoff_base_ms: u64,
    pub reconcile_interval_minutes: u64,
    pub stale_after_minutes: i64,
    pub error_threshold: i32,
    pub inter_call_delay_ms: u64,
    pub scheduler_enabled: bool,
    pub purolator: Option<PurolatorCredentials>,
    pub ups: Option<UpsCredentials>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("store_backend", &self.store_backend)
            .field("database_url", &self.database_url.as_ref().map(|_| "[redacted]"))
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field(
                "carrier_request_timeout_secs",
                &self.carrier_request_timeout_secs,
            )
            .field("carrier_user_agent", &self.carrier_user_agent)
            .field("carrier_max_retries", &self.carrier_max_retries)
            .field(
                "carrier_retry_backoff_base_ms",
                &self.carrier_retry_backoff_base_ms,
            )
            .field(
                "reconcile_interval_minutes",
                &self.reconcile_interval_minutes,
            )
            .field("stale_after_minutes", &self.stale_after_minutes)
            .field("error_threshold", &self.error_threshold)
            .field("inter_call_delay_ms", &self.inter_call_delay_ms)
            .field("scheduler_enabled", &self.scheduler_enabled)
            .field("purolator", &self.purolator)
            .field("ups", &self.ups)
            .finish()
    }
}
