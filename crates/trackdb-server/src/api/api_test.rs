use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;
use trackdb_core::CanonicalResponse;
use trackdb_db::{MemoryTrackingStore, TrackingStore};

use super::*;
use crate::scheduler::{ReconcileSettings, Reconciler};
use crate::testing::{in_transit, registry_with, Outcome, ScriptedAdapter};

struct Harness {
    app: Router,
    store: Arc<MemoryTrackingStore>,
    ups: Arc<ScriptedAdapter>,
}

fn harness_with(auth: AuthState, rate_limit: RateLimitState) -> Harness {
    let store = Arc::new(MemoryTrackingStore::new());
    let ups = Arc::new(
        ScriptedAdapter::new("ups")
            .with("1Z1", Outcome::Respond(in_transit(&["P1", "P2"])))
            .with("BAD", Outcome::Fail("token rejected".to_string()))
            .with(
                "ERR",
                Outcome::Respond(CanonicalResponse::error(
                    "UPS reported errors for this request",
                    vec!["151044: No tracking information available".to_string()],
                )),
            ),
    );
    let registry = registry_with(vec![ups.clone()]);
    let reconciler = Arc::new(Reconciler::new(
        store.clone(),
        Arc::clone(&registry),
        ReconcileSettings {
            stale_after_minutes: 15,
            inter_call_delay: Duration::ZERO,
        },
    ));
    let state = AppState {
        store: store.clone(),
        registry,
        scheduler: Arc::new(SchedulerHandle::manual(reconciler)),
    };

    Harness {
        app: build_app(state, auth, rate_limit),
        store,
        ups,
    }
}

fn harness() -> Harness {
    harness_with(AuthState::disabled(), default_rate_limit_state())
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, Value) {
    let (status, bytes) = send_raw(app, method, uri, body, None).await;
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json parse")
    };
    (status, json)
}

async fn send_raw(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<&str>,
    token: Option<&str>,
) -> (StatusCode, Vec<u8>) {
    let mut builder = Request::builder().method(method).uri(uri);
    if body.is_some() {
        builder = builder.header("content-type", "application/json");
    }
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let request = builder
        .body(body.map_or_else(Body::empty, |b| Body::from(b.to_string())))
        .expect("request");

    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    (status, bytes.to_vec())
}

// -------------------------------------------------------------------------
// Envelope and health
// -------------------------------------------------------------------------

#[test]
fn api_error_codes_map_to_statuses() {
    let cases = [
        ("validation_error", StatusCode::BAD_REQUEST),
        ("not_found", StatusCode::NOT_FOUND),
        ("carrier_error", StatusCode::BAD_GATEWAY),
        ("internal_error", StatusCode::INTERNAL_SERVER_ERROR),
    ];
    for (code, expected) in cases {
        let response = ApiError::new("req-1", code, "message").into_response();
        assert_eq!(response.status(), expected, "code {code}");
    }
}

#[test]
fn api_error_omits_absent_details() {
    let json = serde_json::to_value(ApiError::new("req-1", "not_found", "gone")).unwrap();
    assert!(json["error"].get("details").is_none());
    assert_eq!(json["meta"]["request_id"], "req-1");
}

#[tokio::test]
async fn health_reports_store_ok_and_echoes_request_id() {
    let h = harness();
    let response = h
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/health")
                .header("x-request-id", "abc-123")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-request-id"], "abc-123");
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["data"]["status"], "ok");
    assert_eq!(json["data"]["store"], "ok");
    assert_eq!(json["meta"]["request_id"], "abc-123");
}

// -------------------------------------------------------------------------
// Track, query, status, untrack
// -------------------------------------------------------------------------

#[tokio::test]
async fn track_stores_record_and_status_reads_it_back() {
    let h = harness();

    let (status, json) = send(&h.app, "POST", "/api/v1/track/UPS/1Z1", None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["data"]["tracking_number"], "1Z1");
    assert_eq!(json["data"]["carrier"], "ups");
    assert_eq!(json["data"]["is_active"], true);
    assert_eq!(
        json["data"]["last_response"]["shipment"]["packages"]
            .as_array()
            .map(Vec::len),
        Some(2)
    );

    let (status, json) = send(&h.app, "GET", "/api/v1/status/ups/1Z1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["last_response"]["status"], "success");

    let (status, json) = send(&h.app, "GET", "/api/v1/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["total"], 1);
    assert_eq!(json["data"]["active"], 1);
    assert_eq!(json["data"]["by_carrier"]["ups"], 1);
}

#[tokio::test]
async fn unsupported_carrier_is_a_validation_error_naming_the_supported_set() {
    let h = harness();
    let (status, json) = send(&h.app, "POST", "/api/v1/track/fedex/123", None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "validation_error");
    assert!(json["error"]["message"].as_str().unwrap().contains("fedex"));
    assert_eq!(json["error"]["details"]["requested"], "fedex");
    assert_eq!(json["error"]["details"]["supported"], serde_json::json!(["ups"]));
    assert_eq!(h.ups.calls(), 0);
}

#[tokio::test]
async fn transport_failure_returns_carrier_error_and_records_it() {
    let h = harness();
    let (status, json) = send(&h.app, "POST", "/api/v1/track/ups/BAD", None).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["error"]["code"], "carrier_error");
    assert_eq!(json["error"]["details"]["description"], "carrier request failed");
    assert!(json["error"]["details"]["errors"][0]
        .as_str()
        .unwrap()
        .contains("token rejected"));

    let record = h.store.get("BAD", "ups").await.unwrap().unwrap();
    assert_eq!(record.error_count, 1);
    assert!(record.is_active);

    send(&h.app, "POST", "/api/v1/track/ups/BAD", None).await;
    let record = h.store.get("BAD", "ups").await.unwrap().unwrap();
    assert_eq!(record.error_count, 2);
}

#[tokio::test]
async fn carrier_reported_error_is_surfaced_with_its_errors() {
    let h = harness();
    let (status, json) = send(&h.app, "POST", "/api/v1/track/ups/ERR", None).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(
        json["error"]["details"]["description"],
        "UPS reported errors for this request"
    );
    assert_eq!(
        json["error"]["details"]["errors"],
        serde_json::json!(["151044: No tracking information available"])
    );

    let record = h.store.get("ERR", "ups").await.unwrap().unwrap();
    assert_eq!(record.error_count, 1);
    assert_eq!(
        record.last_error.as_deref(),
        Some("UPS reported errors for this request: 151044: No tracking information available")
    );
}

#[tokio::test]
async fn failure_after_success_keeps_the_stored_response() {
    let h = harness();
    send(&h.app, "POST", "/api/v1/track/ups/1Z1", None).await;
    h.ups.set("1Z1", Outcome::Fail("timeout".to_string()));

    let (status, _) = send(&h.app, "POST", "/api/v1/track/ups/1Z1", None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);

    let record = h.store.get("1Z1", "ups").await.unwrap().unwrap();
    assert_eq!(record.error_count, 1);
    assert_eq!(record.last_response, in_transit(&["P1", "P2"]));
}

#[tokio::test]
async fn query_returns_live_response_without_persisting() {
    let h = harness();
    let (status, json) = send(
        &h.app,
        "GET",
        "/api/v1/query/ups/1Z1?proof_of_delivery=true&date_from=2024-11-01&date_to=2024-11-30",
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["status"], "success");
    assert!(h.store.get("1Z1", "ups").await.unwrap().is_none());
}

#[tokio::test]
async fn query_for_unknown_number_is_not_found_status_not_an_error() {
    let h = harness();
    let (status, json) = send(&h.app, "GET", "/api/v1/query/ups/NOPE", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["status"], "not_found");
}

#[tokio::test]
async fn malformed_date_option_is_rejected_before_calling_the_carrier() {
    let h = harness();
    let (status, json) = send(
        &h.app,
        "GET",
        "/api/v1/query/ups/1Z1?date_from=11/01/2024",
        None,
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["details"]["fields"][0]["field"], "date_from");
    assert_eq!(h.ups.calls(), 0);
}

#[tokio::test]
async fn status_of_unknown_record_is_404() {
    let h = harness();
    let (status, json) = send(&h.app, "GET", "/api/v1/status/ups/MISSING", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"]["code"], "not_found");
}

#[tokio::test]
async fn untrack_reports_whether_a_record_was_removed() {
    let h = harness();
    send(&h.app, "POST", "/api/v1/track/ups/1Z1", None).await;

    let (status, json) = send(&h.app, "DELETE", "/api/v1/track/ups/1Z1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["removed"], true);

    let (_, json) = send(&h.app, "DELETE", "/api/v1/track/ups/1Z1", None).await;
    assert_eq!(json["data"]["removed"], false);
}

#[tokio::test]
async fn deactivate_and_reactivate_round_trip() {
    let h = harness();
    send(&h.app, "POST", "/api/v1/track/ups/1Z1", None).await;

    let (status, json) = send(&h.app, "POST", "/api/v1/track/ups/1Z1/deactivate", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["is_active"], false);
    assert_eq!(json["data"]["deactivated_by_user"], true);

    // A later successful track keeps the user's deactivation.
    let (_, json) = send(&h.app, "POST", "/api/v1/track/ups/1Z1", None).await;
    assert_eq!(json["data"]["is_active"], false);

    let (_, json) = send(&h.app, "POST", "/api/v1/track/ups/1Z1/reactivate", None).await;
    assert_eq!(json["data"]["is_active"], true);

    let (status, _) = send(&h.app, "POST", "/api/v1/track/ups/NOPE/reactivate", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn carriers_lists_registered_ids() {
    let h = harness();
    let (status, json) = send(&h.app, "GET", "/api/v1/carriers", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["supported"], serde_json::json!(["ups"]));
}

// -------------------------------------------------------------------------
// Scheduler control
// -------------------------------------------------------------------------

#[tokio::test]
async fn scheduler_status_and_trigger() {
    let h = harness();
    let (status, json) = send(&h.app, "GET", "/api/v1/scheduler", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["running"], false);
    assert_eq!(json["data"]["pass_in_progress"], false);

    let (status, json) = send(&h.app, "POST", "/api/v1/scheduler/trigger", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json["data"]["accepted"], true);
}

// -------------------------------------------------------------------------
// Reports
// -------------------------------------------------------------------------

#[tokio::test]
async fn json_report_includes_not_found_rows() {
    let h = harness();
    send(&h.app, "POST", "/api/v1/track/ups/1Z1", None).await;

    let (status, json) = send(
        &h.app,
        "POST",
        "/api/v1/reports",
        Some(r#"{"format":"json","ids_by_carrier":[{"carrier":"ups","ids":["MISSING","1Z1"]}]}"#),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let rows = json["data"].as_array().expect("rows");
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0]["status"], "NOT_FOUND");
    assert_eq!(rows[1]["package_id"], "P1");
    assert_eq!(rows[2]["package_id"], "P2");
}

#[tokio::test]
async fn csv_report_is_returned_as_text() {
    let h = harness();
    send(&h.app, "POST", "/api/v1/track/ups/1Z1", None).await;

    let response = h
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/reports")
                .header("content-type", "application/json")
                .body(Body::from(
                    r#"{"format":"csv","ids_by_carrier":[{"carrier":"ups","ids":["1Z1"]}]}"#,
                ))
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"],
        "text/csv; charset=utf-8"
    );
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.starts_with("carrier,tracking_number,status,"));
    assert_eq!(text.matches("\r\n").count(), 3);
}

#[tokio::test]
async fn invalid_report_lists_every_bad_field() {
    let h = harness();
    let (status, json) = send(
        &h.app,
        "POST",
        "/api/v1/reports",
        Some(r#"{"format":"pdf","ids_by_carrier":[{"carrier":"","ids":"1Z1"}]}"#),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let fields: Vec<&str> = json["error"]["details"]["fields"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["field"].as_str().unwrap())
        .collect();
    assert_eq!(
        fields,
        vec![
            "format",
            "ids_by_carrier[0].carrier",
            "ids_by_carrier[0].ids"
        ]
    );
}

#[tokio::test]
async fn non_json_report_body_is_a_validation_error() {
    let h = harness();
    let (status, json) = send(&h.app, "POST", "/api/v1/reports", Some("format=csv")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["details"]["fields"][0]["field"], "body");
}

// -------------------------------------------------------------------------
// Auth
// -------------------------------------------------------------------------

#[tokio::test]
async fn protected_routes_require_a_configured_bearer_token() {
    let h = harness_with(
        AuthState::from_keys("sekret", false).unwrap(),
        default_rate_limit_state(),
    );

    let (status, _) = send_raw(&h.app, "GET", "/api/v1/stats", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send_raw(&h.app, "GET", "/api/v1/stats", None, Some("wrong")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send_raw(&h.app, "GET", "/api/v1/stats", None, Some("sekret")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send_raw(&h.app, "GET", "/api/v1/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn unauthorized_response_uses_the_error_envelope() {
    let h = harness_with(
        AuthState::from_keys("sekret", false).unwrap(),
        default_rate_limit_state(),
    );
    let request = Request::builder()
        .uri("/api/v1/stats")
        .header("x-request-id", "req-auth-1")
        .body(Body::empty())
        .unwrap();
    let response = h.app.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["error"]["code"], "unauthorized");
    assert_eq!(json["meta"]["request_id"], "req-auth-1");
}

#[tokio::test]
async fn rate_limit_is_enforced_per_token() {
    let h = harness_with(
        AuthState::from_keys("alpha,beta", false).unwrap(),
        RateLimitState::new(2, Duration::from_secs(60)),
    );

    for _ in 0..2 {
        let (status, _) = send_raw(&h.app, "GET", "/api/v1/carriers", None, Some("alpha")).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, bytes) = send_raw(&h.app, "GET", "/api/v1/carriers", None, Some("alpha")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    let json: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["error"]["code"], "rate_limited");

    let (status, _) = send_raw(&h.app, "GET", "/api/v1/carriers", None, Some("beta")).await;
    assert_eq!(status, StatusCode::OK);
}
