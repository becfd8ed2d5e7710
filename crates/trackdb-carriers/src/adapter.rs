//! The capability set every carrier implements.
//!
//! Adding a carrier means adding one [`CarrierAdapter`] implementation and one
//! [`crate::CarrierRegistry::register`] call; nothing else branches on the
//! carrier id.

use async_trait::async_trait;
use trackdb_core::{AppConfig, CanonicalResponse, TrackRequest};

use crate::error::CarrierError;

/// Loosely typed carrier payload, exactly as the adapter received it.
///
/// SOAP carriers convert their XML body into the same `serde_json::Value`
/// tree shape so every normalizer walks one representation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPayload {
    /// The tracking number the payload was requested for.
    pub tracking_number: String,
    pub body: serde_json::Value,
}

/// HTTP behaviour shared by every carrier client.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub timeout_secs: u64,
    pub user_agent: String,
    /// Additional attempts after the first failure for retriable errors.
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    /// Selects carrier production endpoints instead of sandbox ones.
    pub production: bool,
}

impl ClientSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            timeout_secs: config.carrier_request_timeout_secs,
            user_agent: config.carrier_user_agent.clone(),
            max_retries: config.carrier_max_retries,
            backoff_base_ms: config.carrier_retry_backoff_base_ms,
            production: config.env.uses_carrier_production(),
        }
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: "trackdb/0.1 (shipment-tracking)".to_string(),
            max_retries: 2,
            backoff_base_ms: 500,
            production: false,
        }
    }
}

#[async_trait]
pub trait CarrierAdapter: Send + Sync {
    /// Registry id of this carrier, e.g. `"ups"`.
    fn carrier(&self) -> &'static str;

    /// Performs the carrier call(s) for `request` and returns the raw payload.
    ///
    /// # Errors
    ///
    /// Returns [`CarrierError`] on transport, authentication, or decode
    /// failure. A carrier-reported "not found" is not an error.
    async fn fetch_raw(&self, request: &TrackRequest) -> Result<RawPayload, CarrierError>;

    /// Converts a raw payload into the canonical model. Never fails.
    fn normalize(&self, raw: &RawPayload) -> CanonicalResponse;

    /// Fetches and normalizes in one step.
    ///
    /// # Errors
    ///
    /// Propagates any [`CarrierError`] from [`CarrierAdapter::fetch_raw`].
    async fn track(&self, request: &TrackRequest) -> Result<CanonicalResponse, CarrierError> {
        let raw = self.fetch_raw(request).await?;
        Ok(self.normalize(&raw))
    }
}
