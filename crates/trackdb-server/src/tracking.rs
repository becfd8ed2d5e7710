//! Foreground lookups shared by the HTTP handlers and the CLI.

use thiserror::Error;
use trackdb_carriers::{CarrierAdapter, CarrierError};
use trackdb_core::{CanonicalResponse, ResponseStatus, TrackOptions, TrackRequest};
use trackdb_db::{DbError, TrackedRecord, TrackingStore};

/// A lookup that failed at the carrier, either in transport or because the
/// carrier answered with errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarrierFailure {
    /// One-line message stored as the record's `last_error`.
    pub message: String,
    /// Error-status response carrying the description and error list.
    pub response: CanonicalResponse,
}

#[derive(Debug, Error)]
pub enum TrackError {
    /// The request was refused before reaching the carrier. Never stored.
    #[error(transparent)]
    Invalid(CarrierError),
    #[error("{}", .0.message)]
    Carrier(CarrierFailure),
    #[error(transparent)]
    Store(#[from] DbError),
}

/// Live carrier lookup without persistence.
///
/// # Errors
///
/// Returns [`TrackError::Invalid`] for a blank tracking number or a request
/// the adapter refuses, and [`TrackError::Carrier`] on transport failure or an
/// error-status response. `not_found` is a normal result.
pub async fn lookup(
    adapter: &dyn CarrierAdapter,
    tracking_number: &str,
    options: TrackOptions,
) -> Result<CanonicalResponse, TrackError> {
    if tracking_number.trim().is_empty() {
        return Err(TrackError::Invalid(CarrierError::InvalidRequest(
            "tracking number must not be empty".to_string(),
        )));
    }

    let request = TrackRequest::single(tracking_number, options);
    match adapter.track(&request).await {
        Ok(response) if response.status == ResponseStatus::Error => {
            Err(TrackError::Carrier(CarrierFailure {
                message: response.error_summary(),
                response,
            }))
        }
        Ok(response) => Ok(response),
        Err(e) if e.is_validation() => Err(TrackError::Invalid(e)),
        Err(e) => {
            let message = e.to_string();
            Err(TrackError::Carrier(CarrierFailure {
                response: CanonicalResponse::error("carrier request failed", vec![message.clone()]),
                message,
            }))
        }
    }
}

/// Looks up `tracking_number` and stores the outcome.
///
/// A carrier failure is recorded against the key; a key seen for the first
/// time is stored with the error response so later passes retry it. The
/// failure is still returned to the caller. Invalid requests leave the store
/// untouched.
///
/// # Errors
///
/// Returns [`TrackError::Invalid`] or [`TrackError::Carrier`] when the lookup
/// fails and [`TrackError::Store`] when a successful response cannot be
/// stored.
pub async fn track_and_store(
    store: &dyn TrackingStore,
    adapter: &dyn CarrierAdapter,
    carrier: &str,
    tracking_number: &str,
    options: TrackOptions,
) -> Result<TrackedRecord, TrackError> {
    match lookup(adapter, tracking_number, options).await {
        Ok(response) => {
            let record = store.upsert(tracking_number, carrier, &response).await?;
            tracing::info!(
                carrier,
                tracking_number,
                status = %response.status,
                "track: record stored"
            );
            Ok(record)
        }
        Err(TrackError::Carrier(failure)) => {
            tracing::warn!(
                carrier,
                tracking_number,
                error = %failure.message,
                "track: carrier lookup failed"
            );
            if let Err(e) = record_failure(store, carrier, tracking_number, &failure).await {
                tracing::error!(
                    carrier,
                    tracking_number,
                    error = %e,
                    "track: failed to record carrier error"
                );
            }
            Err(TrackError::Carrier(failure))
        }
        Err(e) => {
            tracing::debug!(carrier, tracking_number, error = %e, "track: request rejected");
            Err(e)
        }
    }
}

async fn record_failure(
    store: &dyn TrackingStore,
    carrier: &str,
    tracking_number: &str,
    failure: &CarrierFailure,
) -> Result<Option<TrackedRecord>, DbError> {
    if let Some(record) = store
        .record_error(tracking_number, carrier, &failure.message)
        .await?
    {
        return Ok(Some(record));
    }
    store
        .upsert(tracking_number, carrier, &failure.response)
        .await?;
    store
        .record_error(tracking_number, carrier, &failure.message)
        .await
}
