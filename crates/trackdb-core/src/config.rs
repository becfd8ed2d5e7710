use crate::app_config::{
    AppConfig, Environment, PurolatorCredentials, StoreBackend, UpsCredentials,
};
use crate::ConfigError;

/// Default number of consecutive failures before a record stops being polled.
pub const DEFAULT_ERROR_THRESHOLD: &str = "10";
/// Default reconciliation cadence and staleness cutoff, in minutes.
pub const DEFAULT_RECONCILE_MINUTES: &str = "15";
/// Upper bound for the reconciliation cadence and staleness cutoff (one year).
pub const MAX_RECONCILE_MINUTES: u64 = 525_600;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// The parsing and validation logic lives here, decoupled from the process
/// environment so it can be exercised with a plain `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_addr = |var: &str, default: &str| -> Result<SocketAddr, ConfigError> {
        or_default(var, default)
            .parse::<SocketAddr>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_positive_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        match parse_u64(var, default)? {
            0 => Err(invalid(var, "must be greater than zero".to_string())),
            n => Ok(n),
        }
    };

    let parse_minutes = |var: &str| -> Result<u64, ConfigError> {
        match parse_positive_u64(var, DEFAULT_RECONCILE_MINUTES)? {
            n if n > MAX_RECONCILE_MINUTES => Err(invalid(
                var,
                format!("must be at most {MAX_RECONCILE_MINUTES} minutes"),
            )),
            n => Ok(n),
        }
    };

    let parse_bool = |var: &str, default: &str| -> Result<bool, ConfigError> {
        let raw = or_default(var, default);
        match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(invalid(var, format!("expected a boolean, got '{raw}'"))),
        }
    };

    let env = parse_environment(&or_default("TRACKDB_ENV", "development"))?;
    let store_backend = parse_store_backend(&or_default("TRACKDB_STORE", "postgres"))?;

    let database_url = lookup("DATABASE_URL").ok();
    if store_backend == StoreBackend::Postgres && database_url.is_none() {
        return Err(ConfigError::MissingEnvVar("DATABASE_URL".to_string()));
    }

    let bind_addr = parse_addr("TRACKDB_BIND_ADDR", "0.0.0.0:3000")?;
    let log_level = or_default("TRACKDB_LOG_LEVEL", "info");

    let db_max_connections = parse_u32("TRACKDB_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("TRACKDB_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("TRACKDB_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let carrier_request_timeout_secs = parse_u64("TRACKDB_CARRIER_REQUEST_TIMEOUT_SECS", "30")?;
    let carrier_user_agent = or_default(
        "TRACKDB_CARRIER_USER_AGENT",
        "trackdb/0.1 (shipment-tracking)",
    );
    let carrier_max_retries = parse_u32("TRACKDB_CARRIER_MAX_RETRIES", "2")?;
    let carrier_retry_backoff_base_ms = parse_u64("TRACKDB_CARRIER_RETRY_BACKOFF_BASE_MS", "500")?;

    let reconcile_interval_minutes = parse_minutes("TRACKDB_RECONCILE_INTERVAL_MINUTES")?;
    let stale_after_minutes = parse_minutes("TRACKDB_STALE_AFTER_MINUTES")?;
    let stale_after_minutes = i64::try_from(stale_after_minutes)
        .map_err(|e| invalid("TRACKDB_STALE_AFTER_MINUTES", e.to_string()))?;
    let error_threshold = parse_positive_u64("TRACKDB_ERROR_THRESHOLD", DEFAULT_ERROR_THRESHOLD)?;
    let error_threshold = i32::try_from(error_threshold)
        .map_err(|e| invalid("TRACKDB_ERROR_THRESHOLD", e.to_string()))?;
    let inter_call_delay_ms = parse_u64("TRACKDB_INTER_CALL_DELAY_MS", "1000")?;
    let scheduler_enabled = parse_bool("TRACKDB_SCHEDULER_ENABLED", "true")?;

    let purolator = match (lookup("PUROLATOR_KEY"), lookup("PUROLATOR_PASSWORD")) {
        (Ok(key), Ok(password)) => Some(PurolatorCredentials {
            key,
            password,
            account_number: or_default("PUROLATOR_ACCOUNT", ""),
            base_url: lookup("PUROLATOR_BASE_URL").ok(),
        }),
        _ => None,
    };

    let ups = match (lookup("UPS_CLIENT_ID"), lookup("UPS_CLIENT_SECRET")) {
        (Ok(client_id), Ok(client_secret)) => Some(UpsCredentials {
            client_id,
            client_secret,
            merchant_id: lookup("UPS_MERCHANT_ID").ok(),
            base_url: lookup("UPS_BASE_URL").ok(),
        }),
        _ => None,
    };

    Ok(AppConfig {
        store_backend,
        database_url,
        env,
        bind_addr,
        log_level,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        carrier_request_timeout_secs,
        carrier_user_agent,
        carrier_max_retries,
        carrier_retry_backoff_base_ms,
        reconcile_interval_minutes,
        stale_after_minutes,
        error_threshold,
        inter_call_delay_ms,
        scheduler_enabled,
        purolator,
        ups,
    })
}

fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "TRACKDB_ENV".to_string(),
            reason: format!("expected development, test, or production; got '{other}'"),
        }),
    }
}

fn parse_store_backend(s: &str) -> Result<StoreBackend, ConfigError> {
    match s {
        "postgres" => Ok(StoreBackend::Postgres),
        "memory" => Ok(StoreBackend::Memory),
        other => Err(ConfigError::InvalidEnvVar {
            var: "TRACKDB_STORE".to_string(),
            reason: format!("expected postgres or memory; got '{other}'"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
