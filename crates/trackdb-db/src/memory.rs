//! In-process [`TrackingStore`] for tests and database-less runs.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use trackdb_core::CanonicalResponse;

use crate::records::{RecordSummary, StaleKey, StoreStats, TrackedRecord};
use crate::store::{TrackingStore, DEFAULT_ERROR_THRESHOLD};
use crate::DbError;

type Key = (String, String);

#[derive(Debug, Default)]
struct State {
    next_id: i64,
    records: HashMap<Key, TrackedRecord>,
}

/// Keeps every record in a mutex-guarded map. Each operation runs inside one
/// critical section, matching the single-statement writes of the Postgres
/// store.
#[derive(Debug)]
pub struct MemoryTrackingStore {
    state: Mutex<State>,
    error_threshold: i32,
}

impl Default for MemoryTrackingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTrackingStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            error_threshold: DEFAULT_ERROR_THRESHOLD,
        }
    }

    #[must_use]
    pub fn with_error_threshold(mut self, error_threshold: i32) -> Self {
        self.error_threshold = error_threshold;
        self
    }

    /// Moves a record's `last_updated` into the past. Returns `false` if no
    /// record exists for the key.
    ///
    /// Used to seed stale records without waiting for the clock.
    pub fn backdate(&self, tracking_number: &str, carrier: &str, by: Duration) -> bool {
        let mut state = self.lock();
        match state.records.get_mut(&key(tracking_number, carrier)) {
            Some(record) => {
                record.last_updated -= by;
                true
            }
            None => false,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update<F>(&self, tracking_number: &str, carrier: &str, apply: F) -> Option<TrackedRecord>
    where
        F: FnOnce(&mut TrackedRecord),
    {
        let mut state = self.lock();
        let record = state.records.get_mut(&key(tracking_number, carrier))?;
        apply(record);
        Some(record.clone())
    }
}

fn key(tracking_number: &str, carrier: &str) -> Key {
    (tracking_number.to_string(), carrier.to_string())
}

#[async_trait]
impl TrackingStore for MemoryTrackingStore {
    async fn upsert(
        &self,
        tracking_number: &str,
        carrier: &str,
        response: &CanonicalResponse,
    ) -> Result<TrackedRecord, DbError> {
        let now = Utc::now();
        let mut state = self.lock();
        let state = &mut *state;

        let record = match state.records.get_mut(&key(tracking_number, carrier)) {
            Some(existing) => {
                existing.last_response = response.clone();
                existing.is_delivered = response.is_delivered();
                existing.last_updated = now;
                existing.error_count = 0;
                existing.last_error = None;
                existing.is_active = !existing.deactivated_by_user;
                existing.clone()
            }
            None => {
                state.next_id += 1;
                let record = TrackedRecord {
                    id: state.next_id,
                    tracking_number: tracking_number.to_string(),
                    carrier: carrier.to_string(),
                    last_response: response.clone(),
                    is_delivered: response.is_delivered(),
                    last_updated: now,
                    created_at: now,
                    is_active: true,
                    error_count: 0,
                    last_error: None,
                    deactivated_by_user: false,
                };
                state
                    .records
                    .insert(key(tracking_number, carrier), record.clone());
                record
            }
        };
        Ok(record)
    }

    async fn get(
        &self,
        tracking_number: &str,
        carrier: &str,
    ) -> Result<Option<TrackedRecord>, DbError> {
        Ok(self
            .lock()
            .records
            .get(&key(tracking_number, carrier))
            .cloned())
    }

    async fn get_summary(
        &self,
        tracking_number: &str,
        carrier: &str,
    ) -> Result<Option<RecordSummary>, DbError> {
        Ok(self
            .lock()
            .records
            .get(&key(tracking_number, carrier))
            .map(TrackedRecord::summary))
    }

    async fn list_stale(&self, older_than_minutes: i64) -> Result<Vec<StaleKey>, DbError> {
        // A window wider than chrono can represent reaches past every record.
        let Some(cutoff) = Duration::try_minutes(older_than_minutes.max(0))
            .and_then(|window| Utc::now().checked_sub_signed(window))
        else {
            return Ok(Vec::new());
        };
        let state = self.lock();
        let mut stale: Vec<(DateTime<Utc>, i64, StaleKey)> = state
            .records
            .values()
            .filter(|r| r.is_active && !r.is_delivered && r.last_updated < cutoff)
            .map(|r| {
                (
                    r.last_updated,
                    r.id,
                    StaleKey {
                        tracking_number: r.tracking_number.clone(),
                        carrier: r.carrier.clone(),
                    },
                )
            })
            .collect();
        stale.sort_by_key(|(updated, id, _)| (*updated, *id));
        Ok(stale.into_iter().map(|(_, _, k)| k).collect())
    }

    async fn record_error(
        &self,
        tracking_number: &str,
        carrier: &str,
        message: &str,
    ) -> Result<Option<TrackedRecord>, DbError> {
        let threshold = self.error_threshold;
        Ok(self.update(tracking_number, carrier, |record| {
            record.error_count += 1;
            record.last_error = Some(message.to_string());
            record.last_updated = Utc::now();
            if record.error_count >= threshold {
                record.is_active = false;
            }
        }))
    }

    async fn delete(&self, tracking_number: &str, carrier: &str) -> Result<bool, DbError> {
        Ok(self
            .lock()
            .records
            .remove(&key(tracking_number, carrier))
            .is_some())
    }

    async fn deactivate(
        &self,
        tracking_number: &str,
        carrier: &str,
    ) -> Result<Option<TrackedRecord>, DbError> {
        Ok(self.update(tracking_number, carrier, |record| {
            record.is_active = false;
            record.deactivated_by_user = true;
        }))
    }

    async fn reactivate(
        &self,
        tracking_number: &str,
        carrier: &str,
    ) -> Result<Option<TrackedRecord>, DbError> {
        Ok(self.update(tracking_number, carrier, |record| {
            record.is_active = true;
            record.deactivated_by_user = false;
            record.error_count = 0;
            record.last_error = None;
        }))
    }

    async fn statistics(&self) -> Result<StoreStats, DbError> {
        let state = self.lock();
        let mut by_carrier = BTreeMap::new();
        let mut active = 0;
        for record in state.records.values() {
            *by_carrier.entry(record.carrier.clone()).or_insert(0) += 1;
            if record.is_active {
                active += 1;
            }
        }
        let total = i64::try_from(state.records.len()).unwrap_or(i64::MAX);
        Ok(StoreStats {
            total,
            active,
            inactive: total - active,
            by_carrier,
        })
    }

    async fn ping(&self) -> Result<(), DbError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use trackdb_core::{CanonicalPackage, CanonicalShipment};

    use super::*;

    fn in_transit() -> CanonicalResponse {
        CanonicalResponse::success(CanonicalShipment {
            status_code: "IN_TRANSIT".to_string(),
            packages: vec![CanonicalPackage::default()],
            ..CanonicalShipment::default()
        })
    }

    fn delivered() -> CanonicalResponse {
        CanonicalResponse::success(CanonicalShipment {
            status_code: "DELIVERED".to_string(),
            is_delivered: true,
            ..CanonicalShipment::default()
        })
    }

    #[tokio::test]
    async fn upsert_is_idempotent_apart_from_timestamp() {
        let store = MemoryTrackingStore::new();
        let first = store.upsert("A1", "ups", &in_transit()).await.unwrap();
        let second = store.upsert("A1", "ups", &in_transit()).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.last_response, second.last_response);
        assert_eq!(first.created_at, second.created_at);
        assert_eq!(second.error_count, 0);
        assert!(second.is_active);
        assert_eq!(store.statistics().await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn consecutive_errors_count_up_and_deactivate_at_threshold() {
        let store = MemoryTrackingStore::new();
        store.upsert("A1", "ups", &in_transit()).await.unwrap();

        for n in 1..=9 {
            let record = store
                .record_error("A1", "ups", &format!("timeout #{n}"))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(record.error_count, n);
            assert!(record.is_active, "still active after {n} errors");
        }
        let record = store
            .record_error("A1", "ups", "timeout #10")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.error_count, 10);
        assert!(!record.is_active);
        assert_eq!(record.last_error.as_deref(), Some("timeout #10"));
    }

    #[tokio::test]
    async fn upsert_resets_errors_and_undoes_threshold_deactivation() {
        let store = MemoryTrackingStore::new().with_error_threshold(2);
        store.upsert("A1", "ups", &in_transit()).await.unwrap();
        store.record_error("A1", "ups", "e1").await.unwrap();
        let deactivated = store.record_error("A1", "ups", "e2").await.unwrap().unwrap();
        assert!(!deactivated.is_active);

        let refreshed = store.upsert("A1", "ups", &in_transit()).await.unwrap();
        assert_eq!(refreshed.error_count, 0);
        assert!(refreshed.last_error.is_none());
        assert!(refreshed.is_active);
    }

    #[tokio::test]
    async fn upsert_does_not_reactivate_user_deactivated_record() {
        let store = MemoryTrackingStore::new();
        store.upsert("A1", "ups", &in_transit()).await.unwrap();
        store.deactivate("A1", "ups").await.unwrap();

        let refreshed = store.upsert("A1", "ups", &in_transit()).await.unwrap();
        assert!(!refreshed.is_active);
        assert!(refreshed.deactivated_by_user);

        let reactivated = store.reactivate("A1", "ups").await.unwrap().unwrap();
        assert!(reactivated.is_active);
        assert!(!reactivated.deactivated_by_user);
    }

    #[tokio::test]
    async fn reactivate_clears_counters() {
        let store = MemoryTrackingStore::new();
        store.upsert("A1", "ups", &in_transit()).await.unwrap();
        store.record_error("A1", "ups", "boom").await.unwrap();
        let record = store.reactivate("A1", "ups").await.unwrap().unwrap();
        assert_eq!(record.error_count, 0);
        assert!(record.last_error.is_none());
    }

    #[tokio::test]
    async fn record_error_without_record_is_none() {
        let store = MemoryTrackingStore::new();
        assert!(store.record_error("nope", "ups", "x").await.unwrap().is_none());
        assert!(store.deactivate("nope", "ups").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_stale_excludes_fresh_delivered_and_inactive() {
        let store = MemoryTrackingStore::new();
        store.upsert("OLD", "ups", &in_transit()).await.unwrap();
        store.upsert("OLDER", "purolator", &in_transit()).await.unwrap();
        store.upsert("FRESH", "ups", &in_transit()).await.unwrap();
        store.upsert("DONE", "ups", &delivered()).await.unwrap();
        store.upsert("PAUSED", "ups", &in_transit()).await.unwrap();
        store.deactivate("PAUSED", "ups").await.unwrap();

        assert!(store.backdate("OLD", "ups", Duration::minutes(20)));
        assert!(store.backdate("OLDER", "purolator", Duration::minutes(60)));
        assert!(store.backdate("FRESH", "ups", Duration::minutes(5)));
        assert!(store.backdate("DONE", "ups", Duration::minutes(90)));
        assert!(store.backdate("PAUSED", "ups", Duration::minutes(90)));

        let stale = store.list_stale(15).await.unwrap();
        let numbers: Vec<&str> = stale.iter().map(|k| k.tracking_number.as_str()).collect();
        assert_eq!(numbers, vec!["OLDER", "OLD"]);
        assert_eq!(stale[0].carrier, "purolator");
    }

    #[tokio::test]
    async fn list_stale_with_huge_window_is_empty() {
        let store = MemoryTrackingStore::new();
        store.upsert("OLD", "ups", &in_transit()).await.unwrap();
        assert!(store.backdate("OLD", "ups", Duration::minutes(90)));

        assert!(store.list_stale(i64::MAX).await.unwrap().is_empty());
        assert!(store.list_stale(525_600).await.unwrap().is_empty());
        assert_eq!(store.list_stale(-5).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn statistics_count_by_carrier() {
        let store = MemoryTrackingStore::new();
        store.upsert("A", "ups", &in_transit()).await.unwrap();
        store.upsert("B", "ups", &in_transit()).await.unwrap();
        store.upsert("C", "purolator", &in_transit()).await.unwrap();
        store.deactivate("B", "ups").await.unwrap();

        let stats = store.statistics().await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.active, 2);
        assert_eq!(stats.inactive, 1);
        assert_eq!(stats.by_carrier.get("ups"), Some(&2));
        assert_eq!(stats.by_carrier.get("purolator"), Some(&1));
    }

    #[tokio::test]
    async fn delete_reports_whether_a_record_existed() {
        let store = MemoryTrackingStore::new();
        store.upsert("A", "ups", &in_transit()).await.unwrap();
        assert!(store.delete("A", "ups").await.unwrap());
        assert!(!store.delete("A", "ups").await.unwrap());
        assert!(store.get("A", "ups").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn summary_matches_full_record() {
        let store = MemoryTrackingStore::new();
        let record = store.upsert("A", "ups", &in_transit()).await.unwrap();
        let summary = store.get_summary("A", "ups").await.unwrap().unwrap();
        assert_eq!(summary, record.summary());
    }
}
