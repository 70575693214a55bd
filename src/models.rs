use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

use crate::envelope::lenient_u64;

// ============ Lenient field helpers ============

/// Money amounts arrive as JSON numbers or numeric strings and leave as decimal strings.
pub mod money {
    use super::*;
    use std::str::FromStr;

    pub(crate) fn from_value(value: &Value) -> Option<BigDecimal> {
        match value {
            Value::Number(n) => BigDecimal::from_str(&n.to_string()).ok(),
            Value::String(s) => BigDecimal::from_str(s.trim()).ok(),
            _ => None,
        }
    }

    pub fn serialize<S: Serializer>(amount: &BigDecimal, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&amount.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigDecimal, D::Error> {
        let value = Value::deserialize(deserializer)?;
        from_value(&value)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid amount: {}", value)))
    }

    /// Same as the parent module, for optional amounts. `null` and missing become `None`.
    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(
            amount: &Option<BigDecimal>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match amount {
                Some(amount) => super::serialize(amount, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<BigDecimal>, D::Error> {
            let value = Option::<Value>::deserialize(deserializer)?;
            Ok(value.as_ref().and_then(from_value))
        }
    }
}

fn de_lenient_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(lenient_u64))
}

fn de_lenient_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    lenient_i64(&value).ok_or_else(|| serde::de::Error::custom(format!("invalid integer: {}", value)))
}

fn de_lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Bool(b)) => b,
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0) != 0,
        Some(Value::String(s)) => matches!(s.trim().to_lowercase().as_str(), "true" | "1" | "yes"),
        _ => false,
    })
}

fn lenient_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Stringifies scalars; used for fields the backend sends as either text or number.
fn lenient_string(value: Option<Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn default_true() -> bool {
    true
}

/// Parses the timestamp formats seen across billing endpoints.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}

// ============ KYB ============

/// Canonical KYB status.
///
/// The admin list speaks `PENDING/APPROVED/REJECTED/LEGACY` while detail and history views speak
/// lowercase `pending/approved/rejected`. Both dialects parse into this enum; anything else is
/// kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KybStatus {
    Pending,
    Approved,
    Rejected,
    Legacy,
    Other(String),
}

impl KybStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "pending" => KybStatus::Pending,
            "approved" => KybStatus::Approved,
            "rejected" => KybStatus::Rejected,
            "legacy" => KybStatus::Legacy,
            _ => KybStatus::Other(raw.trim().to_string()),
        }
    }

    /// Admin-list dialect, used in list filters.
    pub fn as_admin_code(&self) -> String {
        match self {
            KybStatus::Pending => "PENDING".to_string(),
            KybStatus::Approved => "APPROVED".to_string(),
            KybStatus::Rejected => "REJECTED".to_string(),
            KybStatus::Legacy => "LEGACY".to_string(),
            KybStatus::Other(raw) => raw.to_uppercase(),
        }
    }

    /// Detail/history dialect.
    pub fn as_history_code(&self) -> String {
        self.as_admin_code().to_lowercase()
    }
}

impl fmt::Display for KybStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_admin_code())
    }
}

impl Serialize for KybStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_admin_code())
    }
}

impl<'de> Deserialize<'de> for KybStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(KybStatus::parse(&raw))
    }
}

/// A client's KYB (Know-Your-Business) verification request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawKybRecord")]
pub struct KybRecord {
    /// Client id (`id` or `client_id` on the wire).
    pub id: Option<u64>,
    /// Business name (`client_name` or `name`).
    pub client_name: Option<String>,
    pub email: Option<String>,
    pub msisdn: Option<String>,
    /// Status in either dialect (`kyb_status` or `status`).
    pub status: Option<KybStatus>,
    /// Submission time (`submitted_at` or `created`).
    pub submitted_at: Option<String>,
    pub documents_count: Option<u64>,
    pub notes: Option<String>,
    pub reviewer: Option<String>,
    pub updated_at: Option<String>,
}

impl KybRecord {
    pub fn display_name(&self) -> &str {
        self.client_name.as_deref().unwrap_or("Unknown client")
    }

    pub fn submitted_at_utc(&self) -> Option<DateTime<Utc>> {
        self.submitted_at.as_deref().and_then(parse_timestamp)
    }
}

#[derive(Debug, Deserialize)]
struct RawKybRecord {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    client_id: Option<Value>,
    #[serde(default)]
    client_name: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    msisdn: Option<Value>,
    #[serde(default)]
    kyb_status: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    submitted_at: Option<String>,
    #[serde(default)]
    created: Option<String>,
    #[serde(default)]
    documents_count: Option<Value>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    reviewer: Option<String>,
    #[serde(default)]
    updated_at: Option<String>,
}

impl From<RawKybRecord> for KybRecord {
    fn from(raw: RawKybRecord) -> Self {
        let id = raw
            .id
            .as_ref()
            .and_then(lenient_u64)
            .or_else(|| raw.client_id.as_ref().and_then(lenient_u64));

        Self {
            id,
            client_name: raw.client_name.or(raw.name),
            email: raw.email,
            msisdn: lenient_string(raw.msisdn),
            status: raw
                .kyb_status
                .filter(|s| !s.trim().is_empty())
                .or(raw.status.filter(|s| !s.trim().is_empty()))
                .map(|s| KybStatus::parse(&s)),
            submitted_at: raw.submitted_at.or(raw.created),
            documents_count: raw.documents_count.as_ref().and_then(lenient_u64),
            notes: raw.notes,
            reviewer: raw.reviewer,
            updated_at: raw.updated_at,
        }
    }
}

/// Filter for the admin KYB request list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KybListParams {
    pub page: u32,
    pub per_page: u32,
    /// `None` lists every status.
    pub status: Option<KybStatus>,
    pub search: Option<String>,
}

impl Default for KybListParams {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 10,
            status: Some(KybStatus::Pending),
            search: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct KybListRequest {
    pub page: u32,
    pub per_page: u32,
    pub kyb_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

impl From<&KybListParams> for KybListRequest {
    fn from(params: &KybListParams) -> Self {
        Self {
            page: params.page.max(1),
            per_page: params.per_page.max(1),
            kyb_status: params
                .status
                .as_ref()
                .map(KybStatus::as_admin_code)
                .unwrap_or_else(|| "ALL".to_string()),
            search: clean_search(params.search.as_deref()),
        }
    }
}

/// Filter for the KYB decision history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KybHistoryParams {
    pub page: u32,
    pub per_page: u32,
    pub status: Option<KybStatus>,
    pub search: Option<String>,
}

impl Default for KybHistoryParams {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 10,
            status: None,
            search: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct KybHistoryRequest {
    pub page: u32,
    pub per_page: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

impl From<&KybHistoryParams> for KybHistoryRequest {
    fn from(params: &KybHistoryParams) -> Self {
        Self {
            page: params.page.max(1),
            per_page: params.per_page.max(1),
            status: params.status.as_ref().map(KybStatus::as_history_code),
            search: clean_search(params.search.as_deref()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ClientRef {
    pub client_id: u64,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct KybDecisionRequest {
    pub client_id: u64,
    pub message: String,
}

/// Approval as submitted from the review screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveKybInput {
    pub kyb_id: String,
    #[serde(default)]
    pub notes: String,
}

/// Rejection as submitted from the review screen. The reason is mandatory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectKybInput {
    pub kyb_id: String,
    #[serde(default)]
    pub reason: String,
}

// ============ Pricing ============

/// The single active purchase-price configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingConfig {
    #[serde(default, deserialize_with = "de_lenient_id")]
    pub id: Option<u64>,
    #[serde(with = "money")]
    pub purchase_price: BigDecimal,
    #[serde(default, deserialize_with = "de_lenient_bool")]
    pub is_active: bool,
    #[serde(default)]
    pub created: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingConfigUpdate {
    #[serde(with = "money")]
    pub purchase_price: BigDecimal,
}

/// Reads `volume_max` as `null`, a plain number, or a nullable wrapper `{Int64, Valid}`.
pub fn de_volume_max<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawVolumeMax {
        Plain(i64),
        Text(String),
        Nullable {
            #[serde(rename = "Int64")]
            int64: i64,
            #[serde(rename = "Valid")]
            valid: bool,
        },
    }

    let raw = Option::<RawVolumeMax>::deserialize(deserializer)?;
    Ok(match raw {
        None => None,
        Some(RawVolumeMax::Plain(n)) => Some(n),
        Some(RawVolumeMax::Text(s)) => s.trim().parse().ok(),
        Some(RawVolumeMax::Nullable { int64, valid }) => valid.then_some(int64),
    })
}

/// One SMS volume band and its sale price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingTier {
    #[serde(default, deserialize_with = "de_lenient_id")]
    pub id: Option<u64>,
    pub tier_name: String,
    #[serde(deserialize_with = "de_lenient_i64")]
    pub volume_min: i64,
    /// `None` means unbounded.
    #[serde(default, deserialize_with = "de_volume_max")]
    pub volume_max: Option<i64>,
    #[serde(with = "money")]
    pub sale_price: BigDecimal,
    #[serde(default)]
    pub tier_order: Option<i64>,
    #[serde(default = "default_true", deserialize_with = "de_lenient_bool")]
    pub is_active: bool,
}

impl PricingTier {
    /// Human-readable band, e.g. `1,000 - 4,999` or `50,000+`.
    pub fn volume_range_label(&self) -> String {
        match self.volume_max {
            Some(max) => format!("{} - {}", group_thousands(self.volume_min), group_thousands(max)),
            None => format!("{}+", group_thousands(self.volume_min)),
        }
    }
}

fn group_thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if value < 0 {
        format!("-{}", grouped)
    } else {
        grouped
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierListParams {
    pub page: u32,
    pub per_page: u32,
}

impl Default for TierListParams {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

/// Fields an operator supplies when creating or editing a tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierInput {
    pub tier_name: String,
    pub volume_min: i64,
    #[serde(default)]
    pub volume_max: Option<i64>,
    #[serde(with = "money")]
    pub sale_price: BigDecimal,
    #[serde(default)]
    pub tier_order: Option<i64>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct TierUpdateRequest<'a> {
    pub id: u64,
    #[serde(flatten)]
    pub tier: &'a TierInput,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct IdRef {
    pub id: u64,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct TierToggleRequest {
    pub id: u64,
    pub is_active: bool,
}

// ============ Top-up ============

/// Outcome class shared by every top-up status vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TopupStatusClass {
    Done,
    Pending,
    Failed,
    Other,
}

impl TopupStatusClass {
    pub fn classify(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "approved" | "completed" | "success" => TopupStatusClass::Done,
            "pending" | "processing" => TopupStatusClass::Pending,
            "rejected" | "failed" | "error" => TopupStatusClass::Failed,
            _ => TopupStatusClass::Other,
        }
    }
}

/// A manual top-up request backed by an invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualTopupRequest {
    #[serde(default, deserialize_with = "de_lenient_id")]
    pub id: Option<u64>,
    #[serde(with = "money")]
    pub amount: BigDecimal,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default, deserialize_with = "de_lenient_id")]
    pub connector_id: Option<u64>,
    #[serde(default)]
    pub connector_name: Option<String>,
    #[serde(default)]
    pub invoice_number: Option<String>,
    #[serde(default)]
    pub invoice_path: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub client_name: Option<String>,
}

impl ManualTopupRequest {
    pub fn status_class(&self) -> TopupStatusClass {
        TopupStatusClass::classify(&self.status)
    }
}

/// Fields an operator supplies when filing a manual top-up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualTopupInput {
    #[serde(with = "money")]
    pub amount: BigDecimal,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub connector_id: u64,
    pub invoice_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_currency() -> String {
    "KES".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManualTopupListParams {
    pub page: u32,
    pub per_page: u32,
    pub status: Option<String>,
    pub search: Option<String>,
}

impl Default for ManualTopupListParams {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 10,
            status: None,
            search: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ManualTopupListRequest {
    pub page: u32,
    pub per_page: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

impl From<&ManualTopupListParams> for ManualTopupListRequest {
    fn from(params: &ManualTopupListParams) -> Self {
        Self {
            page: params.page.max(1),
            per_page: params.per_page.max(1),
            status: params
                .status
                .as_deref()
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty() && s != "all"),
            search: clean_search(params.search.as_deref()),
        }
    }
}

/// A payment connector a manual top-up can be booked against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connector {
    #[serde(default, deserialize_with = "de_lenient_id")]
    pub id: Option<u64>,
    #[serde(alias = "connector_name")]
    pub name: String,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default = "default_true", deserialize_with = "de_lenient_bool")]
    pub is_active: bool,
}

/// A mobile network operator available for self top-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MnoProvider {
    #[serde(default, deserialize_with = "de_lenient_id")]
    pub id: Option<u64>,
    pub name: String,
    #[serde(default)]
    pub code: String,
    #[serde(default = "default_true", deserialize_with = "de_lenient_bool")]
    pub is_active: bool,
}

/// Providers served when the provider endpoint fails with a 500.
///
/// Self top-up stays usable while the backend cannot list operators.
pub fn fallback_mno_providers() -> Vec<MnoProvider> {
    [(1, "Safaricom", "SAFARICOM"), (2, "Airtel", "AIRTEL"), (3, "Telkom", "TELKOM"), (4, "Equitel", "EQUITEL")]
        .into_iter()
        .map(|(id, name, code)| MnoProvider {
            id: Some(id),
            name: name.to_string(),
            code: code.to_string(),
            is_active: true,
        })
        .collect()
}

/// One entry of the MNO self top-up history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MnoTopupRecord {
    #[serde(default, deserialize_with = "de_lenient_id")]
    pub id: Option<u64>,
    #[serde(with = "money")]
    pub amount: BigDecimal,
    #[serde(default)]
    pub msisdn: Option<String>,
    #[serde(default, alias = "provider_name")]
    pub provider: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MnoHistoryParams {
    pub page: u32,
    pub per_page: u32,
}

impl Default for MnoHistoryParams {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MpesaPaymentInput {
    #[serde(with = "money")]
    pub amount: BigDecimal,
    pub msisdn: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MnoSelfTopupInput {
    #[serde(with = "money")]
    pub amount: BigDecimal,
    pub msisdn: String,
    pub provider_id: u64,
}

// ============ Dashboard ============

/// Account overview shown on the dashboard; unknown fields are kept.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DashboardSummary {
    #[serde(default, with = "money::option", skip_serializing_if = "Option::is_none")]
    pub balance: Option<BigDecimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Aggregate billing figures; unknown fields are kept.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BillingStats {
    #[serde(default, with = "money::option", skip_serializing_if = "Option::is_none")]
    pub total_topups: Option<BigDecimal>,
    #[serde(default, with = "money::option", skip_serializing_if = "Option::is_none")]
    pub total_spent: Option<BigDecimal>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Trims a search box value; blank searches are dropped from payloads and cache keys.
pub(crate) fn clean_search(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::str::FromStr;

    #[test]
    fn test_kyb_record_accepts_both_field_dialects() {
        let admin: KybRecord = serde_json::from_value(json!({
            "id": 7,
            "client_name": "Acme Ltd",
            "kyb_status": "PENDING",
            "submitted_at": "2024-05-01T10:00:00Z"
        }))
        .unwrap();
        let detail: KybRecord = serde_json::from_value(json!({
            "client_id": "7",
            "name": "Acme Ltd",
            "status": "pending",
            "created": "2024-05-01 10:00:00",
            "msisdn": 254712345678u64
        }))
        .unwrap();

        assert_eq!(admin.id, Some(7));
        assert_eq!(detail.id, Some(7));
        assert_eq!(admin.status, detail.status);
        assert_eq!(detail.client_name.as_deref(), Some("Acme Ltd"));
        assert_eq!(detail.msisdn.as_deref(), Some("254712345678"));
        assert_eq!(admin.submitted_at_utc(), detail.submitted_at_utc());
    }

    #[test]
    fn test_kyb_record_with_both_id_keys_prefers_id() {
        let record: KybRecord =
            serde_json::from_value(json!({"id": 3, "client_id": 9, "status": "legacy"})).unwrap();
        assert_eq!(record.id, Some(3));
        assert_eq!(record.status, Some(KybStatus::Legacy));
    }

    #[test]
    fn test_blank_kyb_status_falls_through_to_status() {
        let record: KybRecord =
            serde_json::from_value(json!({"id": 4, "kyb_status": "", "status": "approved"}))
                .unwrap();
        assert_eq!(record.status, Some(KybStatus::Approved));

        let blank: KybRecord =
            serde_json::from_value(json!({"id": 4, "kyb_status": " ", "status": ""})).unwrap();
        assert_eq!(blank.status, None);
    }

    #[test]
    fn test_kyb_status_unknown_is_preserved() {
        assert_eq!(
            KybStatus::parse("under_review"),
            KybStatus::Other("under_review".to_string())
        );
        assert_eq!(KybStatus::Approved.as_history_code(), "approved");
    }

    #[test]
    fn test_volume_max_variants() {
        let base = json!({"tier_name": "Bronze", "volume_min": 0, "sale_price": 0.8});
        let with = |volume_max: Value| {
            let mut tier = base.clone();
            tier["volume_max"] = volume_max;
            serde_json::from_value::<PricingTier>(tier).unwrap().volume_max
        };

        assert_eq!(with(json!(null)), None);
        assert_eq!(with(json!(5000)), Some(5000));
        assert_eq!(with(json!({"Int64": 5000, "Valid": true})), Some(5000));
        assert_eq!(with(json!({"Int64": 5000, "Valid": false})), None);

        let missing: PricingTier = serde_json::from_value(base).unwrap();
        assert_eq!(missing.volume_max, None);
        assert!(missing.is_active);
    }

    #[test]
    fn test_money_reads_numbers_and_strings() {
        let config: PricingConfig = serde_json::from_value(json!({
            "id": 1, "purchase_price": "0.35", "is_active": 1
        }))
        .unwrap();
        assert_eq!(config.purchase_price, BigDecimal::from_str("0.35").unwrap());
        assert!(config.is_active);

        let tier: PricingTier = serde_json::from_value(json!({
            "tier_name": "Gold", "volume_min": "1000", "sale_price": 0.35
        }))
        .unwrap();
        assert_eq!(tier.sale_price, BigDecimal::from_str("0.35").unwrap());
        assert_eq!(tier.volume_min, 1000);
    }

    #[test]
    fn test_money_keeps_full_precision_on_the_wire() {
        let update = PricingConfigUpdate {
            purchase_price: BigDecimal::from_str("12345678901234567.89").unwrap(),
        };
        let body = serde_json::to_value(&update).unwrap();
        assert_eq!(body, json!({"purchase_price": "12345678901234567.89"}));

        let back: PricingConfigUpdate = serde_json::from_value(body).unwrap();
        assert_eq!(back, update);

        let summary = DashboardSummary {
            balance: Some(BigDecimal::from_str("0.10").unwrap()),
            ..DashboardSummary::default()
        };
        assert_eq!(serde_json::to_value(&summary).unwrap()["balance"], json!("0.10"));
    }

    #[test]
    fn test_volume_range_label() {
        let mut tier: PricingTier = serde_json::from_value(json!({
            "tier_name": "Gold", "volume_min": 1000, "volume_max": 49999, "sale_price": 0.5
        }))
        .unwrap();
        assert_eq!(tier.volume_range_label(), "1,000 - 49,999");
        tier.volume_max = None;
        assert_eq!(tier.volume_range_label(), "1,000+");
    }

    #[test]
    fn test_topup_status_classes() {
        for done in ["approved", "Completed", "SUCCESS"] {
            assert_eq!(TopupStatusClass::classify(done), TopupStatusClass::Done);
        }
        for pending in ["pending", "processing"] {
            assert_eq!(TopupStatusClass::classify(pending), TopupStatusClass::Pending);
        }
        for failed in ["rejected", "failed", "error"] {
            assert_eq!(TopupStatusClass::classify(failed), TopupStatusClass::Failed);
        }
        assert_eq!(TopupStatusClass::classify("queued"), TopupStatusClass::Other);
    }

    #[test]
    fn test_fallback_providers() {
        let providers = fallback_mno_providers();
        assert_eq!(providers.len(), 4);
        assert_eq!(providers[0].name, "Safaricom");
    }

    #[test]
    fn test_kyb_list_request_defaults_to_all_when_unfiltered() {
        let params = KybListParams {
            status: None,
            search: Some("   ".to_string()),
            ..KybListParams::default()
        };
        let body = serde_json::to_value(KybListRequest::from(&params)).unwrap();
        assert_eq!(body, json!({"page": 1, "per_page": 10, "kyb_status": "ALL"}));
    }

    #[test]
    fn test_dashboard_summary_keeps_unknown_fields() {
        let summary: DashboardSummary = serde_json::from_value(json!({
            "balance": "1500.50", "currency": "KES", "sms_sent": 120
        }))
        .unwrap();
        assert_eq!(summary.balance, Some(BigDecimal::from_str("1500.50").unwrap()));
        assert_eq!(summary.extra.get("sms_sent"), Some(&json!(120)));
    }
}
