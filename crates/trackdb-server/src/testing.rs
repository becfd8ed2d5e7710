//! Scripted carrier adapter shared by the server's unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use trackdb_carriers::{CarrierAdapter, CarrierError, CarrierRegistry, RawPayload};
use trackdb_core::{
    CanonicalEvent, CanonicalPackage, CanonicalResponse, CanonicalShipment, TrackRequest,
};

#[derive(Debug, Clone)]
pub(crate) enum Outcome {
    Respond(CanonicalResponse),
    Fail(String),
    Reject(String),
}

/// Answers each tracking number with a preset outcome; unknown numbers are
/// reported as not found.
#[derive(Debug)]
pub(crate) struct ScriptedAdapter {
    carrier: &'static str,
    outcomes: Mutex<HashMap<String, Outcome>>,
    calls: AtomicUsize,
}

impl ScriptedAdapter {
    pub(crate) fn new(carrier: &'static str) -> Self {
        Self {
            carrier,
            outcomes: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with(self, tracking_number: &str, outcome: Outcome) -> Self {
        self.set(tracking_number, outcome);
        self
    }

    pub(crate) fn set(&self, tracking_number: &str, outcome: Outcome) {
        self.outcomes
            .lock()
            .unwrap()
            .insert(tracking_number.to_string(), outcome);
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CarrierAdapter for ScriptedAdapter {
    fn carrier(&self) -> &'static str {
        self.carrier
    }

    async fn fetch_raw(&self, request: &TrackRequest) -> Result<RawPayload, CarrierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let tracking_number = request.primary_id().unwrap_or_default().to_string();
        let outcome = self.outcomes.lock().unwrap().get(&tracking_number).cloned();
        match outcome {
            Some(Outcome::Fail(message)) => Err(CarrierError::Auth(message)),
            Some(Outcome::Reject(message)) => Err(CarrierError::InvalidRequest(message)),
            Some(Outcome::Respond(response)) => Ok(RawPayload {
                tracking_number,
                body: serde_json::to_value(response).unwrap(),
            }),
            None => Ok(RawPayload {
                tracking_number,
                body: Value::Null,
            }),
        }
    }

    fn normalize(&self, raw: &RawPayload) -> CanonicalResponse {
        serde_json::from_value(raw.body.clone())
            .unwrap_or_else(|_| CanonicalResponse::not_found("no shipment for this number"))
    }
}

pub(crate) fn registry_with(adapters: Vec<Arc<ScriptedAdapter>>) -> Arc<CarrierRegistry> {
    let mut registry = CarrierRegistry::new();
    for adapter in adapters {
        registry.register(adapter.carrier(), adapter);
    }
    Arc::new(registry)
}

pub(crate) fn in_transit(package_ids: &[&str]) -> CanonicalResponse {
    CanonicalResponse::success(CanonicalShipment {
        status_code: "IN_TRANSIT".to_string(),
        status_description: "In transit".to_string(),
        packages: package_ids
            .iter()
            .map(|id| CanonicalPackage {
                id: Some((*id).to_string()),
                status_code: "IN_TRANSIT".to_string(),
                status_description: "In transit".to_string(),
                most_recent_event: CanonicalEvent {
                    code: "2300".to_string(),
                    description: "Departed facility".to_string(),
                    ..CanonicalEvent::default()
                },
            })
            .collect(),
        ..CanonicalShipment::default()
    })
}

pub(crate) fn delivered() -> CanonicalResponse {
    CanonicalResponse::success(CanonicalShipment {
        status_code: "DELIVERED".to_string(),
        status_description: "Delivered".to_string(),
        is_delivered: true,
        ..CanonicalShipment::default()
    })
}
