//! Database operations for `tracked_shipments`.
//!
//! Each operation is a single SQL statement, which gives per-key write
//! atomicity without explicit locking.

use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;
use trackdb_core::CanonicalResponse;

use crate::records::{RecordSummary, StaleKey, StoreStats, TrackedRecord};
use crate::store::{TrackingStore, DEFAULT_ERROR_THRESHOLD};
use crate::DbError;

const RECORD_COLUMNS: &str = "id, tracking_number, carrier, last_response, is_delivered, \
     last_updated, created_at, is_active, error_count, last_error, deactivated_by_user";

const SUMMARY_COLUMNS: &str = "id, tracking_number, carrier, is_delivered, \
     last_updated, created_at, is_active, error_count, last_error, deactivated_by_user";

// ---------------------------------------------------------------------------
// Free functions
// ---------------------------------------------------------------------------

/// Inserts or overwrites the record for `(tracking_number, carrier)`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the statement fails.
pub async fn upsert_tracked_shipment(
    pool: &PgPool,
    tracking_number: &str,
    carrier: &str,
    response: &CanonicalResponse,
) -> Result<TrackedRecord, DbError> {
    let sql = format!(
        "INSERT INTO tracked_shipments (tracking_number, carrier, last_response, is_delivered) \
         VALUES ($1, $2, $3, $4) \
         ON CONFLICT (tracking_number, carrier) DO UPDATE SET \
             last_response = EXCLUDED.last_response, \
             is_delivered = EXCLUDED.is_delivered, \
             last_updated = NOW(), \
             error_count = 0, \
             last_error = NULL, \
             is_active = NOT tracked_shipments.deactivated_by_user \
         RETURNING {RECORD_COLUMNS}"
    );
    let row = sqlx::query_as::<_, TrackedRecord>(&sql)
        .bind(tracking_number)
        .bind(carrier)
        .bind(Json(response))
        .bind(response.is_delivered())
        .fetch_one(pool)
        .await?;
    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_tracked_shipment(
    pool: &PgPool,
    tracking_number: &str,
    carrier: &str,
) -> Result<Option<TrackedRecord>, DbError> {
    let sql = format!(
        "SELECT {RECORD_COLUMNS} FROM tracked_shipments \
         WHERE tracking_number = $1 AND carrier = $2"
    );
    let row = sqlx::query_as::<_, TrackedRecord>(&sql)
        .bind(tracking_number)
        .bind(carrier)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_tracked_shipment_summary(
    pool: &PgPool,
    tracking_number: &str,
    carrier: &str,
) -> Result<Option<RecordSummary>, DbError> {
    let sql = format!(
        "SELECT {SUMMARY_COLUMNS} FROM tracked_shipments \
         WHERE tracking_number = $1 AND carrier = $2"
    );
    let row = sqlx::query_as::<_, RecordSummary>(&sql)
        .bind(tracking_number)
        .bind(carrier)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Lists keys of active, undelivered records older than the cutoff, oldest
/// first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_stale_shipments(
    pool: &PgPool,
    older_than_minutes: i64,
) -> Result<Vec<StaleKey>, DbError> {
    let minutes = i32::try_from(older_than_minutes.max(0)).unwrap_or(i32::MAX);
    let rows = sqlx::query_as::<_, StaleKey>(
        "SELECT tracking_number, carrier FROM tracked_shipments \
         WHERE is_active \
           AND NOT is_delivered \
           AND last_updated < NOW() - make_interval(mins => $1) \
         ORDER BY last_updated ASC, id ASC",
    )
    .bind(minutes)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Increments the error count and applies the deactivation threshold in the
/// same statement.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the statement fails.
pub async fn record_shipment_error(
    pool: &PgPool,
    tracking_number: &str,
    carrier: &str,
    message: &str,
    error_threshold: i32,
) -> Result<Option<TrackedRecord>, DbError> {
    let sql = format!(
        "UPDATE tracked_shipments SET \
             error_count = error_count + 1, \
             last_error = $3, \
             last_updated = NOW(), \
             is_active = CASE WHEN error_count + 1 >= $4 THEN FALSE ELSE is_active END \
         WHERE tracking_number = $1 AND carrier = $2 \
         RETURNING {RECORD_COLUMNS}"
    );
    let row = sqlx::query_as::<_, TrackedRecord>(&sql)
        .bind(tracking_number)
        .bind(carrier)
        .bind(message)
        .bind(error_threshold)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the statement fails.
pub async fn delete_tracked_shipment(
    pool: &PgPool,
    tracking_number: &str,
    carrier: &str,
) -> Result<bool, DbError> {
    let result =
        sqlx::query("DELETE FROM tracked_shipments WHERE tracking_number = $1 AND carrier = $2")
            .bind(tracking_number)
            .bind(carrier)
            .execute(pool)
            .await?;
    Ok(result.rows_affected() > 0)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the statement fails.
pub async fn set_shipment_active(
    pool: &PgPool,
    tracking_number: &str,
    carrier: &str,
    active: bool,
) -> Result<Option<TrackedRecord>, DbError> {
    let sql = if active {
        format!(
            "UPDATE tracked_shipments SET \
                 is_active = TRUE, deactivated_by_user = FALSE, error_count = 0, last_error = NULL \
             WHERE tracking_number = $1 AND carrier = $2 \
             RETURNING {RECORD_COLUMNS}"
        )
    } else {
        format!(
            "UPDATE tracked_shipments SET is_active = FALSE, deactivated_by_user = TRUE \
             WHERE tracking_number = $1 AND carrier = $2 \
             RETURNING {RECORD_COLUMNS}"
        )
    };
    let row = sqlx::query_as::<_, TrackedRecord>(&sql)
        .bind(tracking_number)
        .bind(carrier)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

#[derive(Debug, sqlx::FromRow)]
struct CarrierCountRow {
    carrier: String,
    total: i64,
    active: i64,
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn tracked_shipment_statistics(pool: &PgPool) -> Result<StoreStats, DbError> {
    let rows = sqlx::query_as::<_, CarrierCountRow>(
        "SELECT carrier, COUNT(*) AS total, COUNT(*) FILTER (WHERE is_active) AS active \
         FROM tracked_shipments \
         GROUP BY carrier",
    )
    .fetch_all(pool)
    .await?;

    let mut stats = StoreStats {
        by_carrier: BTreeMap::new(),
        ..StoreStats::default()
    };
    for row in rows {
        stats.total += row.total;
        stats.active += row.active;
        stats.by_carrier.insert(row.carrier, row.total);
    }
    stats.inactive = stats.total - stats.active;
    Ok(stats)
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Postgres-backed [`TrackingStore`].
#[derive(Debug, Clone)]
pub struct PgTrackingStore {
    pool: PgPool,
    error_threshold: i32,
}

impl PgTrackingStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            error_threshold: DEFAULT_ERROR_THRESHOLD,
        }
    }

    #[must_use]
    pub fn with_error_threshold(mut self, error_threshold: i32) -> Self {
        self.error_threshold = error_threshold;
        self
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl TrackingStore for PgTrackingStore {
    async fn upsert(
        &self,
        tracking_number: &str,
        carrier: &str,
        response: &CanonicalResponse,
    ) -> Result<TrackedRecord, DbError> {
        upsert_tracked_shipment(&self.pool, tracking_number, carrier, response).await
    }

    async fn get(
        &self,
        tracking_number: &str,
        carrier: &str,
    ) -> Result<Option<TrackedRecord>, DbError> {
        get_tracked_shipment(&self.pool, tracking_number, carrier).await
    }

    async fn get_summary(
        &self,
        tracking_number: &str,
        carrier: &str,
    ) -> Result<Option<RecordSummary>, DbError> {
        get_tracked_shipment_summary(&self.pool, tracking_number, carrier).await
    }

    async fn list_stale(&self, older_than_minutes: i64) -> Result<Vec<StaleKey>, DbError> {
        list_stale_shipments(&self.pool, older_than_minutes).await
    }

    async fn record_error(
        &self,
        tracking_number: &str,
        carrier: &str,
        message: &str,
    ) -> Result<Option<TrackedRecord>, DbError> {
        record_shipment_error(
            &self.pool,
            tracking_number,
            carrier,
            message,
            self.error_threshold,
        )
        .await
    }

    async fn delete(&self, tracking_number: &str, carrier: &str) -> Result<bool, DbError> {
        delete_tracked_shipment(&self.pool, tracking_number, carrier).await
    }

    async fn deactivate(
        &self,
        tracking_number: &str,
        carrier: &str,
    ) -> Result<Option<TrackedRecord>, DbError> {
        set_shipment_active(&self.pool, tracking_number, carrier, false).await
    }

    async fn reactivate(
        &self,
        tracking_number: &str,
        carrier: &str,
    ) -> Result<Option<TrackedRecord>, DbError> {
        set_shipment_active(&self.pool, tracking_number, carrier, true).await
    }

    async fn statistics(&self) -> Result<StoreStats, DbError> {
        tracked_shipment_statistics(&self.pool).await
    }

    async fn ping(&self) -> Result<(), DbError> {
        crate::ping(&self.pool).await?;
        Ok(())
    }
}
