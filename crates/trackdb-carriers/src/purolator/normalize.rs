//! Purolator `TrackingInformationResponse` → canonical model.

use chrono::{DateTime, Utc};
use serde_json::Value;
use trackdb_core::{
    Address, CanonicalEvent, CanonicalPackage, CanonicalResponse, CanonicalShipment, Location,
};

use crate::adapter::RawPayload;
use crate::fields::{at, most_recent, one_or_many, parse_date_time, parse_timestamp, text};

/// Shipment or package status codes meaning the piece reached its receiver.
const DELIVERED_STATUS_CODES: [&str; 2] = ["DELIVERED", "DEL"];
/// Scan codes Purolator emits for a completed delivery.
const DELIVERED_SCAN_CODES: [&str; 2] = ["3000", "3100"];

pub(crate) const RESPONSE_ELEMENT: &str = "TrackingInformationResponse";

/// Converts one Purolator payload into a [`CanonicalResponse`].
///
/// Total over its input: missing or oddly shaped fields become empty values.
#[must_use]
pub fn normalize(raw: &RawPayload) -> CanonicalResponse {
    let response = raw.body.get(RESPONSE_ELEMENT).unwrap_or(&raw.body);
    let results =
        one_or_many(at(response, &["SearchResults"]).and_then(|r| r.get("SearchResult")));

    let mut errors = collect_errors(at(response, &["ResponseInformation", "Errors"]));
    for result in &results {
        errors.extend(collect_errors(result.get("Errors")));
    }
    if !errors.is_empty() {
        return CanonicalResponse::error("Purolator reported errors for this request", errors);
    }

    let Some(result) = matching_result(&results, &raw.tracking_number) else {
        return CanonicalResponse::not_found(format!(
            "no Purolator search result for {}",
            raw.tracking_number
        ));
    };
    let Some(shipment) = at(result, &["Shipment"]).filter(|s| s.is_object()) else {
        return CanonicalResponse::not_found(format!(
            "Purolator returned no shipment for {}",
            raw.tracking_number
        ));
    };

    CanonicalResponse::success(shipment_from(shipment))
}

fn collect_errors(errors: Option<&Value>) -> Vec<String> {
    let Some(container) = errors else {
        return Vec::new();
    };
    one_or_many(container.get("Error"))
        .into_iter()
        .filter_map(render_error)
        .collect()
}

fn render_error(error: &Value) -> Option<String> {
    let code = text(error, &["Code"]);
    let description = text(error, &["Description"]);
    let additional = text(error, &["AdditionalInformation"]);
    if code.is_empty() && description.is_empty() && additional.is_empty() {
        return None;
    }
    let mut rendered = format!("{code}: {description}");
    if !additional.is_empty() {
        rendered.push_str(&format!(" ({additional})"));
    }
    Some(rendered)
}

/// The result whose `SearchValue` names the requested PIN. A result without a
/// search value is accepted as the answer for the request.
fn matching_result<'a>(results: &[&'a Value], tracking_number: &str) -> Option<&'a Value> {
    let wanted = tracking_number.trim();
    results.iter().copied().find(|result| {
        let value = text(result, &["SearchValue"]);
        value.is_empty() || wanted.is_empty() || value.eq_ignore_ascii_case(wanted)
    })
}

fn shipment_from(shipment: &Value) -> CanonicalShipment {
    let packages: Vec<CanonicalPackage> =
        one_or_many(at(shipment, &["Packages"]).and_then(|p| p.get("Package")))
            .into_iter()
            .map(package_from)
            .collect();

    let mut status_code = text(shipment, &["StatusCode"]);
    let mut status_description = text(shipment, &["StatusDescription"]);
    if status_code.is_empty() {
        if let Some(first) = packages.first() {
            status_code.clone_from(&first.status_code);
            if status_description.is_empty() {
                status_description.clone_from(&first.status_description);
            }
        }
    }

    let created = text(shipment, &["ShipmentDate"]);
    let created_date =
        (!created.is_empty()).then(|| parse_timestamp(&created).unwrap_or_else(Utc::now));

    let is_delivered = is_delivered_status(&status_code)
        || packages.iter().any(|package| {
            is_delivered_status(&package.status_code)
                || DELIVERED_SCAN_CODES.contains(&package.most_recent_event.code.as_str())
        });

    CanonicalShipment {
        status_code,
        status_description,
        is_delivered,
        created_date,
        shipper: address_from(at(shipment, &["Sender"])),
        receiver: address_from(at(shipment, &["Receiver"])),
        packages,
    }
}

fn is_delivered_status(code: &str) -> bool {
    DELIVERED_STATUS_CODES
        .iter()
        .any(|delivered| code.eq_ignore_ascii_case(delivered))
}

fn package_from(package: &Value) -> CanonicalPackage {
    let events = one_or_many(at(package, &["Events"]).and_then(|e| e.get("Event")))
        .into_iter()
        .map(event_from)
        .collect();
    let most_recent_event = most_recent(events);

    let pin = text(package, &["PIN", "Value"]);
    let mut status_code = text(package, &["StatusCode"]);
    let mut status_description = text(package, &["StatusDescription"]);
    if status_code.is_empty() {
        status_code.clone_from(&most_recent_event.code);
        if status_description.is_empty() {
            status_description.clone_from(&most_recent_event.description);
        }
    }

    CanonicalPackage {
        id: (!pin.is_empty()).then_some(pin),
        status_code,
        status_description,
        most_recent_event,
    }
}

/// Returns the parsed timestamp alongside the event so an unparsable date
/// does not outrank real scans when picking the most recent one.
fn event_from(event: &Value) -> (Option<DateTime<Utc>>, CanonicalEvent) {
    let date_time = text(event, &["DateTime"]);
    let date = text(event, &["Date"]);
    let time = text(event, &["Time"]);

    let parsed = if date_time.is_empty() {
        parse_date_time(&date, &time)
    } else {
        parse_timestamp(&date_time)
    };
    let reported = !(date_time.is_empty() && date.is_empty());
    let timestamp = match parsed {
        Some(ts) => ts,
        None if reported => Utc::now(),
        None => DateTime::<Utc>::default(),
    };

    let code = match text(event, &["Code"]) {
        c if c.is_empty() => text(event, &["ScanType"]),
        c => c,
    };

    let canonical = CanonicalEvent {
        timestamp,
        code,
        description: text(event, &["Description"]),
        location: location_from(at(event, &["Location"])),
    };
    (parsed, canonical)
}

fn location_from(location: Option<&Value>) -> Location {
    let Some(location) = location else {
        return Location::default();
    };
    // Older responses carry a bare depot name instead of an address block.
    if location.is_string() {
        return Location {
            city: text(location, &[]),
            ..Location::default()
        };
    }
    Location {
        street1: text(location, &["StreetAddress1"]),
        street2: text(location, &["StreetAddress2"]),
        city: text(location, &["City"]),
        region: text(location, &["Province"]),
        country_code: text(location, &["Country"]),
        postal_code: text(location, &["PostalCode"]),
    }
}

fn address_from(party: Option<&Value>) -> Address {
    let Some(party) = party else {
        return Address::default();
    };
    Address {
        name: text(party, &["Name"]),
        company: text(party, &["Company"]),
        street1: text(party, &["StreetAddress1"]),
        street2: text(party, &["StreetAddress2"]),
        city: text(party, &["City"]),
        region: text(party, &["Province"]),
        country_code: text(party, &["Country"]),
        postal_code: text(party, &["PostalCode"]),
        phone: phone_from(at(party, &["PhoneNumber"])),
    }
}

fn phone_from(phone: Option<&Value>) -> String {
    match phone {
        Some(phone @ Value::Object(_)) => ["CountryCode", "AreaCode", "Phone", "Extension"]
            .iter()
            .map(|part| text(phone, &[*part]))
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("-"),
        Some(other) => text(other, &[]),
        None => String::new(),
    }
}
