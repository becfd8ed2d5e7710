//! Row types for `tracked_shipments`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use trackdb_core::CanonicalResponse;

/// A full row from the `tracked_shipments` table.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct TrackedRecord {
    pub id: i64,
    pub tracking_number: String,
    pub carrier: String,
    /// The canonical response from the most recent successful (or first
    /// failed) lookup, stored as JSONB.
    #[sqlx(json)]
    pub last_response: CanonicalResponse,
    /// Mirrors `last_response.shipment.is_delivered` so staleness scans do not
    /// have to open the blob.
    pub is_delivered: bool,
    pub last_updated: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
    /// The schema defines this as `INTEGER NOT NULL DEFAULT 0`.
    pub error_count: i32,
    pub last_error: Option<String>,
    /// Set by an explicit stop request; only `reactivate` clears it.
    pub deactivated_by_user: bool,
}

impl TrackedRecord {
    #[must_use]
    pub fn summary(&self) -> RecordSummary {
        RecordSummary {
            id: self.id,
            tracking_number: self.tracking_number.clone(),
            carrier: self.carrier.clone(),
            is_delivered: self.is_delivered,
            last_updated: self.last_updated,
            created_at: self.created_at,
            is_active: self.is_active,
            error_count: self.error_count,
            last_error: self.last_error.clone(),
            deactivated_by_user: self.deactivated_by_user,
        }
    }
}

/// Record projection without the response blob.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct RecordSummary {
    pub id: i64,
    pub tracking_number: String,
    pub carrier: String,
    pub is_delivered: bool,
    pub last_updated: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
    pub error_count: i32,
    pub last_error: Option<String>,
    pub deactivated_by_user: bool,
}

/// Key of a record due for reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct StaleKey {
    pub tracking_number: String,
    pub carrier: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub total: i64,
    pub active: i64,
    pub inactive: i64,
    /// Record count per carrier id, sorted by id.
    pub by_carrier: BTreeMap<String, i64>,
}
