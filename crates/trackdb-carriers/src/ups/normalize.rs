//! UPS Track API (`/api/track/v1/details`) → canonical model.

use chrono::{DateTime, Utc};
use serde_json::Value;
use trackdb_core::{
    Address, CanonicalEvent, CanonicalPackage, CanonicalResponse, CanonicalShipment, Location,
};

use crate::adapter::RawPayload;
use crate::fields::{at, most_recent, one_or_many, parse_date_time, parse_timestamp, text};

/// Status type UPS uses for a delivered package.
const DELIVERED_TYPE: &str = "D";
/// Status code UPS uses for a delivered package.
const DELIVERED_CODE: &str = "011";
/// Error codes meaning "UPS has no record of this number" rather than a failure.
const NOT_FOUND_CODES: [&str; 2] = ["151044", "151018"];

const ORIGIN_TYPES: [&str; 2] = ["ORIGIN", "SHIPPER"];
const DESTINATION_TYPES: [&str; 2] = ["DESTINATION", "SHIP_TO"];

/// Converts one UPS payload into a [`CanonicalResponse`].
///
/// Total over its input: missing or oddly shaped fields become empty values.
#[must_use]
pub fn normalize(raw: &RawPayload) -> CanonicalResponse {
    let reported = one_or_many(at(&raw.body, &["response"]).and_then(|r| r.get("errors")));
    if !reported.is_empty() {
        let all_not_found = reported
            .iter()
            .all(|error| NOT_FOUND_CODES.contains(&text(error, &["code"]).as_str()));
        if all_not_found {
            let message = text(reported[0], &["message"]);
            return CanonicalResponse::not_found(if message.is_empty() {
                format!("no UPS tracking information for {}", raw.tracking_number)
            } else {
                message
            });
        }
        let errors = reported.into_iter().filter_map(render_error).collect();
        return CanonicalResponse::error("UPS reported errors for this request", errors);
    }

    let shipments = one_or_many(at(&raw.body, &["trackResponse"]).and_then(|t| t.get("shipment")));
    let Some(shipment) = matching_shipment(&shipments, &raw.tracking_number) else {
        return CanonicalResponse::not_found(format!(
            "no UPS shipment for {}",
            raw.tracking_number
        ));
    };

    let packages = one_or_many(shipment.get("package"));
    if packages.is_empty() {
        // UPS answers unknown numbers with a shipment that only carries warnings.
        let warning = one_or_many(shipment.get("warnings"))
            .into_iter()
            .map(|w| text(w, &["message"]))
            .find(|m| !m.is_empty());
        return CanonicalResponse::not_found(warning.unwrap_or_else(|| {
            format!("UPS returned no packages for {}", raw.tracking_number)
        }));
    }

    CanonicalResponse::success(shipment_from(shipment, &packages))
}

fn render_error(error: &Value) -> Option<String> {
    let code = text(error, &["code"]);
    let message = text(error, &["message"]);
    if code.is_empty() && message.is_empty() {
        return None;
    }
    Some(format!("{code}: {message}"))
}

fn matching_shipment<'a>(shipments: &[&'a Value], tracking_number: &str) -> Option<&'a Value> {
    let wanted = tracking_number.trim();
    shipments
        .iter()
        .copied()
        .find(|s| text(s, &["inquiryNumber"]).eq_ignore_ascii_case(wanted))
        .or_else(|| shipments.first().copied())
}

fn shipment_from(shipment: &Value, packages: &[&Value]) -> CanonicalShipment {
    let canonical: Vec<(CanonicalPackage, bool)> =
        packages.iter().map(|package| package_from(package)).collect();

    let (status_code, status_description) = canonical
        .first()
        .map(|(p, _)| (p.status_code.clone(), p.status_description.clone()))
        .unwrap_or_default();

    let pickup = text(shipment, &["pickupDate"]);
    let created_date =
        (!pickup.is_empty()).then(|| parse_timestamp(&pickup).unwrap_or_else(Utc::now));

    let addresses = one_or_many(packages.first().and_then(|p| p.get("packageAddress")));
    let find_address = |types: &[&str]| {
        addresses
            .iter()
            .find(|a| {
                let kind = text(a, &["type"]);
                types.iter().any(|t| kind.eq_ignore_ascii_case(t))
            })
            .map(|a| address_from(a))
            .unwrap_or_default()
    };

    CanonicalShipment {
        status_code,
        status_description,
        is_delivered: canonical.iter().any(|(_, delivered)| *delivered),
        created_date,
        shipper: find_address(&ORIGIN_TYPES),
        receiver: find_address(&DESTINATION_TYPES),
        packages: canonical.into_iter().map(|(p, _)| p).collect(),
    }
}

/// Returns the package along with whether UPS considers it delivered.
fn package_from(package: &Value) -> (CanonicalPackage, bool) {
    let activities = one_or_many(package.get("activity"));
    let most_recent_event = most_recent(activities.iter().map(|a| event_from(a)).collect());
    let most_recent_type = activities
        .iter()
        .map(|a| (activity_timestamp(a), text(a, &["status", "type"])))
        .max_by_key(|(ts, _)| *ts)
        .map(|(_, kind)| kind)
        .unwrap_or_default();

    let current_type = text(package, &["currentStatus", "type"]);
    let mut status_code = text(package, &["currentStatus", "code"]);
    if status_code.is_empty() {
        status_code = text(package, &["currentStatus", "statusCode"]);
    }
    let mut status_description = text(package, &["currentStatus", "description"]);
    if status_code.is_empty() {
        status_code.clone_from(&most_recent_event.code);
    }
    if status_description.is_empty() {
        status_description.clone_from(&most_recent_event.description);
    }

    let delivered = current_type.eq_ignore_ascii_case(DELIVERED_TYPE)
        || status_code == DELIVERED_CODE
        || (current_type.is_empty() && most_recent_type.eq_ignore_ascii_case(DELIVERED_TYPE));

    let id = text(package, &["trackingNumber"]);
    let canonical = CanonicalPackage {
        id: (!id.is_empty()).then_some(id),
        status_code,
        status_description,
        most_recent_event,
    };
    (canonical, delivered)
}

fn activity_timestamp(activity: &Value) -> Option<DateTime<Utc>> {
    let gmt_date = text(activity, &["gmtDate"]);
    if gmt_date.is_empty() {
        parse_date_time(&text(activity, &["date"]), &text(activity, &["time"]))
    } else {
        parse_date_time(&gmt_date, &text(activity, &["gmtTime"]))
    }
}

fn event_from(activity: &Value) -> (Option<DateTime<Utc>>, CanonicalEvent) {
    let parsed = activity_timestamp(activity);
    let reported =
        !text(activity, &["date"]).is_empty() || !text(activity, &["gmtDate"]).is_empty();
    let timestamp = match parsed {
        Some(ts) => ts,
        None if reported => Utc::now(),
        None => DateTime::<Utc>::default(),
    };

    let mut code = text(activity, &["status", "code"]);
    if code.is_empty() {
        code = text(activity, &["status", "type"]);
    }

    let event = CanonicalEvent {
        timestamp,
        code,
        description: text(activity, &["status", "description"]),
        location: location_from(at(activity, &["location", "address"])),
    };
    (parsed, event)
}

fn location_from(address: Option<&Value>) -> Location {
    let Some(address) = address else {
        return Location::default();
    };
    Location {
        street1: text(address, &["addressLine1"]),
        street2: text(address, &["addressLine2"]),
        city: text(address, &["city"]),
        region: text(address, &["stateProvince"]),
        country_code: country_code(address),
        postal_code: text(address, &["postalCode"]),
    }
}

fn address_from(entry: &Value) -> Address {
    let address = at(entry, &["address"]).unwrap_or(&Value::Null);
    Address {
        name: text(entry, &["name"]),
        company: text(entry, &["attentionName"]),
        street1: text(address, &["addressLine1"]),
        street2: text(address, &["addressLine2"]),
        city: text(address, &["city"]),
        region: text(address, &["stateProvince"]),
        country_code: country_code(address),
        postal_code: text(address, &["postalCode"]),
        phone: text(entry, &["phoneNumber"]),
    }
}

fn country_code(address: &Value) -> String {
    match text(address, &["countryCode"]) {
        code if code.is_empty() => text(address, &["country"]),
        code => code,
    }
}
