//! Canonical shipment model shared by every carrier.
//!
//! Carrier normalizers produce these types and the tracking store persists
//! them as an opaque JSON blob. Text fields are never optional: a value the
//! carrier did not report is an empty string, so consumers never branch on
//! presence.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Where a scan happened.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Location {
    pub street1: String,
    pub street2: String,
    pub city: String,
    pub region: String,
    pub country_code: String,
    pub postal_code: String,
}

/// Shipper or receiver address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Address {
    pub name: String,
    pub company: String,
    pub street1: String,
    pub street2: String,
    pub city: String,
    pub region: String,
    pub country_code: String,
    pub postal_code: String,
    pub phone: String,
}

/// One carrier scan or status change.
///
/// The default event (used for packages the carrier reported without any
/// scans) carries the Unix epoch as its timestamp.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanonicalEvent {
    pub timestamp: DateTime<Utc>,
    pub code: String,
    pub description: String,
    pub location: Location,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanonicalPackage {
    /// Carrier-assigned piece identifier, when the carrier reports one.
    pub id: Option<String>,
    pub status_code: String,
    pub status_description: String,
    /// Event with the largest timestamp among all events for this package.
    pub most_recent_event: CanonicalEvent,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanonicalShipment {
    pub status_code: String,
    pub status_description: String,
    /// Derived from the carrier's own status vocabulary by its normalizer.
    pub is_delivered: bool,
    pub created_date: Option<DateTime<Utc>>,
    pub shipper: Address,
    pub receiver: Address,
    pub packages: Vec<CanonicalPackage>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Success,
    #[default]
    NotFound,
    Error,
}

impl ResponseStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::NotFound => "not_found",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResponseStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "not_found" => Ok(Self::NotFound),
            "error" => Ok(Self::Error),
            other => Err(CoreError::InvalidResponseStatus(other.to_string())),
        }
    }
}

/// The single shape every carrier lookup resolves to.
///
/// `shipment` is always populated, with empty values when the lookup failed
/// or found nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanonicalResponse {
    pub status: ResponseStatus,
    pub description: String,
    pub errors: Vec<String>,
    pub shipment: CanonicalShipment,
}

impl CanonicalResponse {
    #[must_use]
    pub fn success(shipment: CanonicalShipment) -> Self {
        Self {
            status: ResponseStatus::Success,
            description: "tracking information retrieved".to_string(),
            errors: Vec::new(),
            shipment,
        }
    }

    #[must_use]
    pub fn not_found(description: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::NotFound,
            description: description.into(),
            errors: Vec::new(),
            shipment: CanonicalShipment::default(),
        }
    }

    #[must_use]
    pub fn error(description: impl Into<String>, errors: Vec<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            description: description.into(),
            errors,
            shipment: CanonicalShipment::default(),
        }
    }

    #[must_use]
    pub fn is_delivered(&self) -> bool {
        self.shipment.is_delivered
    }

    /// One-line summary of the response suitable for a record's `last_error`.
    #[must_use]
    pub fn error_summary(&self) -> String {
        if self.errors.is_empty() {
            self.description.clone()
        } else {
            format!("{}: {}", self.description, self.errors.join("; "))
        }
    }
}
