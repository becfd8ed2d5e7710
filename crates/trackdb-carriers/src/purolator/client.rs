//! SOAP client for the Purolator tracking web service.

use std::fmt::Write as _;
use std::time::Duration;

use async_trait::async_trait;
use quick_xml::escape::escape;
use reqwest::{Client, StatusCode, Url};
use serde_json::Value;
use trackdb_core::{CanonicalResponse, PurolatorCredentials, TrackRequest};

use crate::adapter::{CarrierAdapter, ClientSettings, RawPayload};
use crate::error::CarrierError;
use crate::fields::{at, text};
use crate::retry::retry_with_backoff;
use crate::xml::xml_to_value;

use super::normalize::{normalize, RESPONSE_ELEMENT};

const DEVELOPMENT_ENDPOINT: &str =
    "https://devwebservices.purolator.com/EWS/V1/Tracking/TrackingService.asmx";
const PRODUCTION_ENDPOINT: &str =
    "https://webservices.purolator.com/EWS/V1/Tracking/TrackingService.asmx";
const SOAP_ACTION: &str = "http://purolator.com/pws/service/v1/TrackingInformation";
const SERVICE_VERSION: &str = "1.2";

/// Purolator adapter.
///
/// Use [`PurolatorClient::new`] to pick the endpoint from the environment or
/// [`PurolatorClient::with_endpoint`] to point at a mock server in tests.
pub struct PurolatorClient {
    client: Client,
    credentials: PurolatorCredentials,
    endpoint: Url,
    max_retries: u32,
    backoff_base_ms: u64,
}

impl PurolatorClient {
    /// # Errors
    ///
    /// Returns [`CarrierError::Http`] if the HTTP client cannot be built or
    /// [`CarrierError::InvalidBaseUrl`] if a configured endpoint is malformed.
    pub fn new(
        credentials: PurolatorCredentials,
        settings: &ClientSettings,
    ) -> Result<Self, CarrierError> {
        let endpoint = match &credentials.base_url {
            Some(url) => url.clone(),
            None if settings.production => PRODUCTION_ENDPOINT.to_string(),
            None => DEVELOPMENT_ENDPOINT.to_string(),
        };
        Self::with_endpoint(credentials, settings, &endpoint)
    }

    /// # Errors
    ///
    /// Same as [`PurolatorClient::new`].
    pub fn with_endpoint(
        credentials: PurolatorCredentials,
        settings: &ClientSettings,
        endpoint: &str,
    ) -> Result<Self, CarrierError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(settings.user_agent.as_str())
            .build()?;
        let endpoint = Url::parse(endpoint).map_err(|e| CarrierError::InvalidBaseUrl {
            url: endpoint.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            client,
            credentials,
            endpoint,
            max_retries: settings.max_retries,
            backoff_base_ms: settings.backoff_base_ms,
        })
    }

    /// Builds the SOAP 1.1 envelope for `request`. Every supplied PIN is sent.
    fn build_envelope(&self, request: &TrackRequest) -> String {
        let mut pins = String::new();
        for pin in &request.tracking_ids {
            let _ = write!(pins, "<v1:PIN><v1:Value>{}</v1:Value></v1:PIN>", escape(pin.trim()));
        }

        let mut options = String::new();
        if let (Some(from), Some(to)) = (request.options.date_from, request.options.date_to) {
            let _ = write!(
                options,
                "<v1:SearchDateRange><v1:From>{}</v1:From><v1:To>{}</v1:To></v1:SearchDateRange>",
                from.format("%Y-%m-%d"),
                to.format("%Y-%m-%d")
            );
        }
        let _ = write!(
            options,
            "<v1:ProofOfDelivery>{}</v1:ProofOfDelivery><v1:IncludeDetailedView>{}</v1:IncludeDetailedView>",
            request.options.proof_of_delivery,
            request.options.include_detailed_view
        );

        format!(
            concat!(
                r#"<?xml version="1.0" encoding="utf-8"?>"#,
                r#"<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/" "#,
                r#"xmlns:v1="http://purolator.com/pws/datatypes/v1">"#,
                "<soapenv:Header><v1:RequestContext>",
                "<v1:Version>{version}</v1:Version>",
                "<v1:Language>en</v1:Language>",
                "<v1:GroupID>{group}</v1:GroupID>",
                "<v1:RequestReference>{reference}</v1:RequestReference>",
                "</v1:RequestContext></soapenv:Header>",
                "<soapenv:Body><v1:TrackingInformationRequest>",
                "<v1:PINs>{pins}</v1:PINs>{options}",
                "</v1:TrackingInformationRequest></soapenv:Body>",
                "</soapenv:Envelope>"
            ),
            version = SERVICE_VERSION,
            group = escape(self.credentials.account_number.as_str()),
            reference = uuid::Uuid::new_v4(),
            pins = pins,
            options = options,
        )
    }

    async fn post_envelope(&self, envelope: &str) -> Result<Value, CarrierError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .basic_auth(&self.credentials.key, Some(&self.credentials.password))
            .header("Content-Type", "text/xml; charset=utf-8")
            .header("SOAPAction", SOAP_ACTION)
            .body(envelope.to_owned())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(CarrierError::Auth(format!(
                "Purolator rejected the credentials (HTTP {})",
                status.as_u16()
            )));
        }

        let document = match xml_to_value(&body) {
            Ok(document) => document,
            Err(_) if !status.is_success() => {
                return Err(CarrierError::UnexpectedStatus {
                    status: status.as_u16(),
                    url: self.endpoint.to_string(),
                });
            }
            Err(err) => return Err(err),
        };

        // Faults usually arrive with HTTP 500 but are not transient.
        if let Some(fault) = at(&document, &["Envelope", "Body", "Fault"]) {
            return Err(CarrierError::Fault {
                code: text(fault, &["faultcode"]),
                message: text(fault, &["faultstring"]),
            });
        }
        if !status.is_success() {
            return Err(CarrierError::UnexpectedStatus {
                status: status.as_u16(),
                url: self.endpoint.to_string(),
            });
        }

        at(&document, &["Envelope", "Body", RESPONSE_ELEMENT])
            .cloned()
            .ok_or_else(|| CarrierError::Decode {
                context: "Purolator tracking response".to_string(),
                reason: format!("missing {RESPONSE_ELEMENT} element"),
            })
    }
}

#[async_trait]
impl CarrierAdapter for PurolatorClient {
    fn carrier(&self) -> &'static str {
        crate::PUROLATOR
    }

    async fn fetch_raw(&self, request: &TrackRequest) -> Result<RawPayload, CarrierError> {
        let Some(tracking_number) = request.primary_id() else {
            return Err(CarrierError::InvalidRequest(
                "at least one tracking id is required".to_string(),
            ));
        };
        request
            .options
            .check_date_range()
            .map_err(|e| CarrierError::InvalidRequest(e.to_string()))?;

        let envelope = self.build_envelope(request);
        tracing::debug!(
            tracking_number,
            pins = request.tracking_ids.len(),
            "requesting Purolator tracking information"
        );
        let response = retry_with_backoff(
            crate::PUROLATOR,
            self.max_retries,
            self.backoff_base_ms,
            || self.post_envelope(&envelope),
        )
        .await?;

        let mut body = serde_json::Map::new();
        body.insert(RESPONSE_ELEMENT.to_string(), response);
        Ok(RawPayload {
            tracking_number: tracking_number.to_string(),
            body: Value::Object(body),
        })
    }

    fn normalize(&self, raw: &RawPayload) -> CanonicalResponse {
        normalize(raw)
    }
}
