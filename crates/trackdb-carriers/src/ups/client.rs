//! OAuth2 + REST client for the UPS Track API.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;
use trackdb_core::{CanonicalResponse, TrackRequest, UpsCredentials};

use crate::adapter::{CarrierAdapter, ClientSettings, RawPayload};
use crate::error::CarrierError;
use crate::retry::retry_with_backoff;

use super::normalize::normalize;

const PRODUCTION_BASE_URL: &str = "https://onlinetools.ups.com/";
const SANDBOX_BASE_URL: &str = "https://wwwcie.ups.com/";
const TOKEN_PATH: &str = "security/v1/oauth/token";
const DETAILS_PATH: &str = "api/track/v1/details/";
const TRANSACTION_SOURCE: &str = "trackdb";
/// Tokens are refreshed this long before UPS says they expire.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default, deserialize_with = "lenient_u64")]
    expires_in: u64,
}

/// UPS sends `expires_in` as a string; accept a number too.
fn lenient_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(n) => Ok(n.as_u64().unwrap_or(0)),
        Value::String(s) => Ok(s.trim().parse().unwrap_or(0)),
        _ => Ok(0),
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// UPS adapter.
///
/// Holds one cached bearer token shared by every request made through this
/// client. The Track API accepts a single inquiry number per call.
pub struct UpsClient {
    client: Client,
    credentials: UpsCredentials,
    base_url: Url,
    token: Mutex<Option<CachedToken>>,
    max_retries: u32,
    backoff_base_ms: u64,
}

impl UpsClient {
    /// # Errors
    ///
    /// Returns [`CarrierError::Http`] if the HTTP client cannot be built or
    /// [`CarrierError::InvalidBaseUrl`] if a configured base URL is malformed.
    pub fn new(
        credentials: UpsCredentials,
        settings: &ClientSettings,
    ) -> Result<Self, CarrierError> {
        let base_url = match &credentials.base_url {
            Some(url) => url.clone(),
            None if settings.production => PRODUCTION_BASE_URL.to_string(),
            None => SANDBOX_BASE_URL.to_string(),
        };
        Self::with_base_url(credentials, settings, &base_url)
    }

    /// # Errors
    ///
    /// Same as [`UpsClient::new`].
    pub fn with_base_url(
        credentials: UpsCredentials,
        settings: &ClientSettings,
        base_url: &str,
    ) -> Result<Self, CarrierError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(settings.user_agent.as_str())
            .build()?;

        // A trailing slash keeps `Url::join` appending instead of replacing
        // the last path segment.
        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalised).map_err(|e| CarrierError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            client,
            credentials,
            base_url,
            token: Mutex::new(None),
            max_retries: settings.max_retries,
            backoff_base_ms: settings.backoff_base_ms,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, CarrierError> {
        self.base_url
            .join(path)
            .map_err(|e| CarrierError::InvalidBaseUrl {
                url: format!("{}{path}", self.base_url),
                reason: e.to_string(),
            })
    }

    /// Details URL with `tracking_number` as one percent-encoded path segment.
    fn details_url(&self, tracking_number: &str) -> Result<Url, CarrierError> {
        let mut url = self.endpoint(DETAILS_PATH)?;
        url.path_segments_mut()
            .map_err(|()| CarrierError::InvalidBaseUrl {
                url: self.base_url.to_string(),
                reason: "cannot be a base URL".to_string(),
            })?
            .pop_if_empty()
            .push(tracking_number);
        Ok(url)
    }

    /// Returns a cached token, exchanging client credentials when none is
    /// cached or the cached one is inside the refresh margin.
    async fn access_token(&self) -> Result<String, CarrierError> {
        let mut guard = self.token.lock().await;
        if let Some(cached) = guard.as_ref() {
            if Instant::now() < cached.refresh_at {
                return Ok(cached.value.clone());
            }
        }

        let url = self.endpoint(TOKEN_PATH)?;
        let mut request = self
            .client
            .post(url.clone())
            .basic_auth(&self.credentials.client_id, Some(&self.credentials.client_secret))
            .form(&[("grant_type", "client_credentials")]);
        if let Some(merchant_id) = &self.credentials.merchant_id {
            request = request.header("x-merchant-id", merchant_id);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(CarrierError::Auth(format!(
                "UPS token exchange rejected (HTTP {})",
                status.as_u16()
            )));
        }
        if !status.is_success() {
            return Err(CarrierError::UnexpectedStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.text().await?;
        let token: TokenResponse =
            serde_json::from_str(&body).map_err(|e| CarrierError::Decode {
                context: "UPS token response".to_string(),
                reason: e.to_string(),
            })?;

        let lifetime = Duration::from_secs(token.expires_in);
        let refresh_at = Instant::now() + lifetime.saturating_sub(TOKEN_REFRESH_MARGIN);
        tracing::debug!(expires_in = token.expires_in, "obtained UPS access token");
        *guard = Some(CachedToken {
            value: token.access_token.clone(),
            refresh_at,
        });
        Ok(token.access_token)
    }

    async fn forget_token(&self) {
        *self.token.lock().await = None;
    }

    async fn fetch_details(
        &self,
        tracking_number: &str,
        request: &TrackRequest,
    ) -> Result<Value, CarrierError> {
        let token = self.access_token().await?;
        let url = self.details_url(tracking_number)?;

        let response = self
            .client
            .get(url.clone())
            .bearer_auth(&token)
            .header("transId", uuid::Uuid::new_v4().simple().to_string())
            .header("transactionSrc", TRANSACTION_SOURCE)
            .query(&[
                ("locale", "en_US"),
                ("returnSignature", bool_param(request.options.proof_of_delivery)),
                ("returnPOD", bool_param(request.options.proof_of_delivery)),
                ("returnMilestones", bool_param(request.options.include_detailed_view)),
            ])
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            self.forget_token().await;
            return Err(CarrierError::Auth("UPS rejected the access token".to_string()));
        }

        let body = response.text().await?;
        // Unknown numbers come back as 404/400 with an error document the
        // normalizer understands.
        let readable = status.is_success()
            || status == StatusCode::NOT_FOUND
            || status == StatusCode::BAD_REQUEST;
        if !readable {
            return Err(CarrierError::UnexpectedStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        match serde_json::from_str::<Value>(&body) {
            Ok(value) if status.is_success() || value.get("response").is_some() => Ok(value),
            Ok(_) => Err(CarrierError::UnexpectedStatus {
                status: status.as_u16(),
                url: url.to_string(),
            }),
            Err(e) if status.is_success() => Err(CarrierError::Decode {
                context: "UPS tracking response".to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(CarrierError::UnexpectedStatus {
                status: status.as_u16(),
                url: url.to_string(),
            }),
        }
    }
}

fn bool_param(flag: bool) -> &'static str {
    if flag {
        "true"
    } else {
        "false"
    }
}

#[async_trait]
impl CarrierAdapter for UpsClient {
    fn carrier(&self) -> &'static str {
        crate::UPS
    }

    async fn fetch_raw(&self, request: &TrackRequest) -> Result<RawPayload, CarrierError> {
        let Some(tracking_number) = request.primary_id().map(str::trim) else {
            return Err(CarrierError::InvalidRequest(
                "at least one tracking id is required".to_string(),
            ));
        };
        if tracking_number.is_empty() {
            return Err(CarrierError::InvalidRequest(
                "tracking id must not be empty".to_string(),
            ));
        }
        if matches!(tracking_number, "." | "..") {
            return Err(CarrierError::InvalidRequest(format!(
                "'{tracking_number}' is not a tracking id"
            )));
        }
        if request.tracking_ids.len() > 1 {
            tracing::debug!(
                tracking_number,
                ignored = request.tracking_ids.len() - 1,
                "UPS tracks one number per call; extra ids ignored"
            );
        }

        let body = retry_with_backoff(crate::UPS, self.max_retries, self.backoff_base_ms, || {
            self.fetch_details(tracking_number, request)
        })
        .await?;

        Ok(RawPayload {
            tracking_number: tracking_number.to_string(),
            body,
        })
    }

    fn normalize(&self, raw: &RawPayload) -> CanonicalResponse {
        normalize(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> UpsCredentials {
        UpsCredentials {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            merchant_id: None,
            base_url: None,
        }
    }

    #[test]
    fn base_url_follows_environment() {
        let sandbox = UpsClient::new(credentials(), &ClientSettings::default()).unwrap();
        assert_eq!(sandbox.base_url.as_str(), SANDBOX_BASE_URL);

        let settings = ClientSettings {
            production: true,
            ..ClientSettings::default()
        };
        let production = UpsClient::new(credentials(), &settings).unwrap();
        assert_eq!(production.base_url.as_str(), PRODUCTION_BASE_URL);
    }

    #[test]
    fn endpoints_join_under_base_path() {
        let client =
            UpsClient::with_base_url(credentials(), &ClientSettings::default(), "http://mock/ups")
                .unwrap();
        assert_eq!(
            client.endpoint("api/track/v1/details/1Z").unwrap().as_str(),
            "http://mock/ups/api/track/v1/details/1Z"
        );
    }

    #[test]
    fn details_url_encodes_the_tracking_number() {
        let client =
            UpsClient::with_base_url(credentials(), &ClientSettings::default(), "http://mock/ups")
                .unwrap();
        let cases = [
            ("1Z999AA1", "http://mock/ups/api/track/v1/details/1Z999AA1"),
            ("1Z#frag", "http://mock/ups/api/track/v1/details/1Z%23frag"),
            ("1Z?locale=fr", "http://mock/ups/api/track/v1/details/1Z%3Flocale=fr"),
            (
                "../../security/v1/oauth/token",
                "http://mock/ups/api/track/v1/details/..%2F..%2Fsecurity%2Fv1%2Foauth%2Ftoken",
            ),
        ];
        for (tracking_number, expected) in cases {
            let url = client.details_url(tracking_number).unwrap();
            assert_eq!(url.as_str(), expected, "for {tracking_number}");
            assert!(url.fragment().is_none());
            assert!(url.query().is_none());
        }
    }

    #[test]
    fn expires_in_accepts_string_or_number() {
        let text: TokenResponse =
            serde_json::from_str(r#"{"access_token":"a","expires_in":"14399"}"#).unwrap();
        assert_eq!(text.expires_in, 14399);
        let number: TokenResponse =
            serde_json::from_str(r#"{"access_token":"a","expires_in":3600}"#).unwrap();
        assert_eq!(number.expires_in, 3600);
        let missing: TokenResponse = serde_json::from_str(r#"{"access_token":"a"}"#).unwrap();
        assert_eq!(missing.expires_in, 0);
    }
}
