//! The persistence contract shared by the Postgres and in-memory stores.

use async_trait::async_trait;
use trackdb_core::CanonicalResponse;

use crate::records::{RecordSummary, StaleKey, StoreStats, TrackedRecord};
use crate::DbError;

/// Default number of consecutive errors after which a record stops being
/// reconciled.
pub const DEFAULT_ERROR_THRESHOLD: i32 = 10;

/// Sole owner of tracked-record persistence.
///
/// Every write for a key is one atomic step, so concurrent foreground requests
/// and the reconciliation pass never lose each other's updates.
#[async_trait]
pub trait TrackingStore: Send + Sync {
    /// Inserts a new active record or overwrites the existing one.
    ///
    /// An overwrite refreshes `last_updated`, resets `error_count` and
    /// `last_error`, and re-activates the record unless a user deactivated it.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the write fails.
    async fn upsert(
        &self,
        tracking_number: &str,
        carrier: &str,
        response: &CanonicalResponse,
    ) -> Result<TrackedRecord, DbError>;

    /// # Errors
    ///
    /// Returns [`DbError`] if the read fails.
    async fn get(
        &self,
        tracking_number: &str,
        carrier: &str,
    ) -> Result<Option<TrackedRecord>, DbError>;

    /// Same lookup as [`TrackingStore::get`] without loading the response blob.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the read fails.
    async fn get_summary(
        &self,
        tracking_number: &str,
        carrier: &str,
    ) -> Result<Option<RecordSummary>, DbError>;

    /// Active, undelivered records last updated more than
    /// `older_than_minutes` ago, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the read fails.
    async fn list_stale(&self, older_than_minutes: i64) -> Result<Vec<StaleKey>, DbError>;

    /// Increments `error_count`, stores `message` as `last_error`, and
    /// deactivates the record in the same step once the threshold is reached.
    ///
    /// Returns `None` when no record exists for the key.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the write fails.
    async fn record_error(
        &self,
        tracking_number: &str,
        carrier: &str,
        message: &str,
    ) -> Result<Option<TrackedRecord>, DbError>;

    /// Removes the record. Returns `true` if one existed.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the write fails.
    async fn delete(&self, tracking_number: &str, carrier: &str) -> Result<bool, DbError>;

    /// User-driven deactivation; survives later successful upserts.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the write fails.
    async fn deactivate(
        &self,
        tracking_number: &str,
        carrier: &str,
    ) -> Result<Option<TrackedRecord>, DbError>;

    /// Re-activates the record and clears its error counters.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the write fails.
    async fn reactivate(
        &self,
        tracking_number: &str,
        carrier: &str,
    ) -> Result<Option<TrackedRecord>, DbError>;

    /// # Errors
    ///
    /// Returns [`DbError`] if the read fails.
    async fn statistics(&self) -> Result<StoreStats, DbError>;

    /// Cheap liveness check used by the health endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the backing store is unreachable.
    async fn ping(&self) -> Result<(), DbError>;
}
