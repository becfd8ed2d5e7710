//! Retry with exponential back-off and jitter for carrier calls.
//!
//! [`retry_with_backoff`] wraps any fallible async operation and retries on
//! transient errors (network failures, 5xx, 429). Authentication failures,
//! SOAP faults, and undecodable bodies are returned immediately.

use std::future::Future;
use std::time::Duration;

use crate::error::CarrierError;

/// Returns `true` for errors that are worth retrying after a back-off delay.
pub(crate) fn is_retriable(err: &CarrierError) -> bool {
    match err {
        CarrierError::Http(e) => {
            e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
        }
        CarrierError::UnexpectedStatus { status, .. } => *status >= 500 || *status == 429,
        CarrierError::NotSupported { .. }
        | CarrierError::InvalidRequest(_)
        | CarrierError::Auth(_)
        | CarrierError::Fault { .. }
        | CarrierError::Decode { .. }
        | CarrierError::InvalidBaseUrl { .. } => false,
    }
}

/// Runs `operation` with up to `max_retries` additional attempts on transient errors.
///
/// The delay before retry `n` is `backoff_base_ms × 2ⁿ⁻¹` with ±25 % jitter,
/// capped at 60 s.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    carrier: &str,
    max_retries: u32,
    backoff_base_ms: u64,
    mut operation: F,
) -> Result<T, CarrierError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CarrierError>>,
{
    const MAX_DELAY_MS: u64 = 60_000;
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_retriable(&err) || attempt >= max_retries {
                    return Err(err);
                }
                attempt += 1;
                let computed = backoff_base_ms.saturating_mul(1u64 << (attempt - 1).min(10));
                let capped = computed.min(MAX_DELAY_MS);
                #[allow(
                    clippy::cast_possible_truncation,
                    clippy::cast_sign_loss,
                    clippy::cast_precision_loss
                )]
                let delay_ms = (capped as f64 * (rand::random::<f64>() * 0.5 + 0.75)) as u64;
                tracing::warn!(
                    carrier,
                    attempt,
                    max_retries,
                    delay_ms,
                    error = %err,
                    "transient carrier error, retrying after back-off"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}
