use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Caller-supplied knobs for a tracking lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackOptions {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub proof_of_delivery: bool,
    pub include_detailed_view: bool,
}

/// Why a search window was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DateRangeError {
    #[error("date_from requires date_to")]
    MissingTo,
    #[error("date_to requires date_from")]
    MissingFrom,
    #[error("date_from must not be after date_to")]
    Inverted,
}

impl DateRangeError {
    /// Option name the error is reported against.
    #[must_use]
    pub fn field(self) -> &'static str {
        match self {
            DateRangeError::MissingTo | DateRangeError::Inverted => "date_from",
            DateRangeError::MissingFrom => "date_to",
        }
    }

    #[must_use]
    pub fn reason(self) -> &'static str {
        match self {
            DateRangeError::MissingTo => "requires date_to",
            DateRangeError::MissingFrom => "requires date_from",
            DateRangeError::Inverted => "must not be after date_to",
        }
    }
}

impl TrackOptions {
    /// A search window needs both ends, in order. No window at all is fine.
    ///
    /// # Errors
    ///
    /// Returns [`DateRangeError`] for a half-open or inverted window.
    pub fn check_date_range(&self) -> Result<(), DateRangeError> {
        match (self.date_from, self.date_to) {
            (None, None) => Ok(()),
            (Some(_), None) => Err(DateRangeError::MissingTo),
            (None, Some(_)) => Err(DateRangeError::MissingFrom),
            (Some(from), Some(to)) if from > to => Err(DateRangeError::Inverted),
            (Some(_), Some(_)) => Ok(()),
        }
    }
}

/// A carrier-agnostic tracking request handed to a carrier adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackRequest {
    pub tracking_ids: Vec<String>,
    pub options: TrackOptions,
}

impl TrackRequest {
    #[must_use]
    pub fn single(tracking_number: impl Into<String>, options: TrackOptions) -> Self {
        Self {
            tracking_ids: vec![tracking_number.into()],
            options,
        }
    }

    /// First tracking id, used by carriers that accept one id per call.
    #[must_use]
    pub fn primary_id(&self) -> Option<&str> {
        self.tracking_ids.first().map(String::as_str)
    }
}
