use crate::config::Config;
use crate::errors::AppError;
use crate::session::{ApiKey, API_KEY_HEADER};
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

/// Why a billing API request did not produce a usable body.
///
/// Services translate this into an [`AppError`] with resource-specific wording.
#[derive(Debug, Clone)]
pub enum RequestFailure {
    /// The backend answered with a non-success status.
    Status {
        status: StatusCode,
        /// Parsed JSON body, when the error body was JSON.
        body: Option<Value>,
    },
    /// The request went out but no response came back (connect error, timeout).
    NoResponse(String),
    /// Anything else: URL building, unreadable success body.
    Other(String),
}

impl RequestFailure {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            RequestFailure::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// `message` field of the error body, if the backend sent one.
    pub fn body_message(&self) -> Option<String> {
        match self {
            RequestFailure::Status {
                body: Some(body), ..
            } => body
                .get("message")
                .and_then(|m| m.as_str())
                .or_else(|| body.get("error").and_then(|m| m.as_str()))
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string),
            _ => None,
        }
    }
}

/// Thin wrapper over the billing backend.
///
/// Every call is a JSON POST carrying the operator's API key. Nothing is retried here.
#[derive(Clone)]
pub struct BillingApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl BillingApiClient {
    /// Creates a new `BillingApiClient`.
    ///
    /// # Arguments
    ///
    /// * `config` - Supplies the base URL and the transport timeout.
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.billing_api_timeout_secs))
            .build()
            .map_err(|e| {
                AppError::InternalError(format!("Failed to create billing API client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: config.billing_api_base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Posts `body` to `endpoint` and returns the parsed response body.
    ///
    /// An empty success body comes back as `Value::Null`; deciding whether that is an error is
    /// left to the caller.
    ///
    /// # Arguments
    ///
    /// * `endpoint` - Path below the base URL, e.g. `/admin/kyb/clients`.
    /// * `body` - Request payload, serialized as JSON.
    /// * `api_key` - Operator credential sent in the `X-API-Key` header.
    pub async fn post<B>(
        &self,
        endpoint: &str,
        body: &B,
        api_key: &ApiKey,
    ) -> Result<Value, RequestFailure>
    where
        B: Serialize + ?Sized,
    {
        let url = format!("{}{}", self.base_url, endpoint);
        tracing::info!(
            "POST {} (key {})",
            endpoint,
            api_key.fingerprint()
        );

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, api_key.expose())
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_builder() {
                    RequestFailure::Other(format!("Failed to build request: {}", e))
                } else {
                    tracing::error!("Billing API request to {} failed: {}", endpoint, e);
                    RequestFailure::NoResponse(e.to_string())
                }
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            tracing::error!("Failed to read billing API response from {}: {}", endpoint, e);
            RequestFailure::NoResponse(e.to_string())
        })?;

        if !status.is_success() {
            tracing::error!("Billing API {} returned {}: {}", endpoint, status, text);
            return Err(RequestFailure::Status {
                status,
                body: serde_json::from_str(&text).ok(),
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&text).map_err(|e| {
            RequestFailure::Other(format!("Failed to parse billing API response: {}", e))
        })
    }
}
