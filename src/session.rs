//! The operator session.
//!
//! The API key is a session credential. Every data-access call receives the session explicitly,
//! and [`Session::require`] is the only place the "no credential, no request" rule lives.

use crate::alerts::{AlertSink, TracingAlerts};
use crate::errors::AppError;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

/// Header carrying the operator's API key, both inbound and towards the billing backend.
pub const API_KEY_HEADER: &str = "X-API-Key";

const MISSING_KEY_MESSAGE: &str = "API key is required. Please set your API key first.";

/// A non-empty billing API key.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Builds a key from raw input, rejecting blank values.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Short SHA-256 fingerprint used in cache keys and logs in place of the key itself.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        let digest = hex::encode(hasher.finalize());
        digest[..16].to_string()
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiKey({})", self.fingerprint())
    }
}

/// Credential plus alert destination for one operator.
#[derive(Clone)]
pub struct Session {
    api_key: Option<ApiKey>,
    alerts: Arc<dyn AlertSink>,
}

impl Session {
    pub fn new(api_key: Option<ApiKey>, alerts: Arc<dyn AlertSink>) -> Self {
        Self { api_key, alerts }
    }

    /// Session from an optional raw header value; blank values count as absent.
    pub fn from_raw_key(raw: Option<&str>, alerts: Arc<dyn AlertSink>) -> Self {
        Self::new(raw.and_then(ApiKey::parse), alerts)
    }

    /// Session without a credential. Reads stay disabled and writes are refused.
    pub fn anonymous() -> Self {
        Self::new(None, Arc::new(TracingAlerts))
    }

    pub fn api_key(&self) -> Option<&ApiKey> {
        self.api_key.as_ref()
    }

    /// True when data access is allowed.
    pub fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    /// Returns the credential or the missing-credential error.
    pub fn require(&self) -> Result<&ApiKey, AppError> {
        self.api_key
            .as_ref()
            .ok_or_else(|| AppError::MissingCredential(MISSING_KEY_MESSAGE.to_string()))
    }

    pub fn alerts(&self) -> &dyn AlertSink {
        self.alerts.as_ref()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("api_key", &self.api_key)
            .finish()
    }
}
