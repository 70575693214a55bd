use crate::billing_client::{BillingApiClient, RequestFailure};
use crate::envelope::{normalize_list, unwrap_data, NormalizedList};
use crate::errors::{AppError, ResultExt, NO_SERVER_RESPONSE};
use crate::models::*;
use crate::session::ApiKey;
use crate::validation::{
    normalize_currency, normalize_invoice_number, normalize_msisdn, parse_client_id,
    require_positive_amount, require_positive_id, require_text,
};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

const KYB_UNAVAILABLE: &str = "KYB service is temporarily unavailable. Please try again later.";

/// How one resource family words its failures.
#[derive(Debug, Clone, Copy)]
struct FailurePolicy {
    /// Used when a 2xx response carries no body.
    empty_response: &'static str,
    /// When set, a 503 is reported with this message instead of the body's.
    unavailable: Option<&'static str>,
}

const KYB_POLICY: FailurePolicy = FailurePolicy {
    empty_response: "No response received from KYB server",
    unavailable: Some(KYB_UNAVAILABLE),
};

const PRICING_POLICY: FailurePolicy = FailurePolicy {
    empty_response: "No response received from pricing server",
    unavailable: None,
};

const TOPUP_POLICY: FailurePolicy = FailurePolicy {
    empty_response: "No response received from top-up server",
    unavailable: None,
};

const DASHBOARD_POLICY: FailurePolicy = FailurePolicy {
    empty_response: "No response received from dashboard server",
    unavailable: None,
};

/// Maps a transport-level failure onto the error the operator sees.
///
/// * HTTP error with a body: the body's `message`, else `fallback`.
/// * 503 on a family with an `unavailable` message: that message.
/// * No response at all: the fixed connectivity message.
/// * Anything else: `fallback`.
fn translate_failure(failure: RequestFailure, fallback: &str, policy: FailurePolicy) -> AppError {
    match &failure {
        RequestFailure::Status { status, .. } => {
            if *status == StatusCode::SERVICE_UNAVAILABLE {
                if let Some(message) = policy.unavailable {
                    return AppError::ServiceUnavailable(message.to_string());
                }
            }
            AppError::Server {
                status: status.as_u16(),
                message: failure.body_message().unwrap_or_else(|| fallback.to_string()),
            }
        }
        RequestFailure::NoResponse(_) => AppError::NoServerResponse(NO_SERVER_RESPONSE.to_string()),
        RequestFailure::Other(reason) => {
            tracing::error!("Billing API call failed: {}", reason);
            AppError::InternalError(fallback.to_string())
        }
    }
}

fn require_body(body: Value, policy: FailurePolicy) -> Result<Value, AppError> {
    if body.is_null() {
        return Err(AppError::EmptyResponse(policy.empty_response.to_string()));
    }
    Ok(body)
}

/// Decodes a singleton payload, taking the first element when the backend wraps it in a list.
fn decode_single<T: DeserializeOwned>(
    body: Value,
    policy: FailurePolicy,
    what: &str,
) -> Result<T, AppError> {
    let payload = match unwrap_data(body) {
        Value::Array(mut items) if !items.is_empty() => items.swap_remove(0),
        Value::Array(_) | Value::Null => {
            return Err(AppError::EmptyResponse(policy.empty_response.to_string()))
        }
        other => other,
    };
    serde_json::from_value(payload).with_context(|| format!("Failed to decode {}", what))
}

async fn call<B: Serialize + ?Sized>(
    api: &BillingApiClient,
    endpoint: &str,
    body: &B,
    key: &ApiKey,
    fallback: &str,
    policy: FailurePolicy,
) -> Result<Value, AppError> {
    let body = api
        .post(endpoint, body, key)
        .await
        .map_err(|failure| translate_failure(failure, fallback, policy))?;
    require_body(body, policy)
}

/// KYB review: request list, details, history and decisions.
#[derive(Clone)]
pub struct KybService {
    api: BillingApiClient,
}

impl KybService {
    pub fn new(api: BillingApiClient) -> Self {
        Self { api }
    }

    pub async fn list_requests(
        &self,
        params: &KybListParams,
        key: &ApiKey,
    ) -> Result<NormalizedList<KybRecord>, AppError> {
        let body = call(
            &self.api,
            "/admin/kyb/clients",
            &KybListRequest::from(params),
            key,
            "Failed to fetch KYB requests",
            KYB_POLICY,
        )
        .await?;

        let list = normalize_list::<KybRecord>(&body);
        tracing::info!("Fetched {} KYB requests", list.items.len());
        Ok(list)
    }

    /// Loads one client's KYB request. The id is validated before any request is sent.
    pub async fn get_details(&self, client_id: &str, key: &ApiKey) -> Result<KybRecord, AppError> {
        let client_id = parse_client_id(client_id)?;

        let body = call(
            &self.api,
            "/admin/kyb/details",
            &ClientRef { client_id },
            key,
            "Failed to fetch KYB details",
            KYB_POLICY,
        )
        .await?;

        let mut record: KybRecord = decode_single(body, KYB_POLICY, "KYB details")?;
        record.id.get_or_insert(client_id);
        Ok(record)
    }

    pub async fn list_history(
        &self,
        params: &KybHistoryParams,
        key: &ApiKey,
    ) -> Result<NormalizedList<KybRecord>, AppError> {
        let body = call(
            &self.api,
            "/admin/kyb/history",
            &KybHistoryRequest::from(params),
            key,
            "Failed to fetch KYB history",
            KYB_POLICY,
        )
        .await?;

        Ok(normalize_list::<KybRecord>(&body))
    }

    pub async fn approve(
        &self,
        client_id: &str,
        message: &str,
        key: &ApiKey,
    ) -> Result<Value, AppError> {
        let client_id = parse_client_id(client_id)?;

        let body = call(
            &self.api,
            "/admin/kyb/approve",
            &KybDecisionRequest {
                client_id,
                message: message.trim().to_string(),
            },
            key,
            "Failed to approve KYB request",
            KYB_POLICY,
        )
        .await?;

        tracing::info!("✓ KYB approved for client {}", client_id);
        Ok(unwrap_data(body))
    }

    /// Rejects a KYB request. A rejection reason is mandatory.
    pub async fn reject(
        &self,
        client_id: &str,
        message: &str,
        key: &ApiKey,
    ) -> Result<Value, AppError> {
        let client_id = parse_client_id(client_id)?;
        let message = require_text(message, "Rejection reason")?;

        let body = call(
            &self.api,
            "/admin/kyb/reject",
            &KybDecisionRequest { client_id, message },
            key,
            "Failed to reject KYB request",
            KYB_POLICY,
        )
        .await?;

        tracing::info!("✓ KYB rejected for client {}", client_id);
        Ok(unwrap_data(body))
    }
}

/// SMS pricing: purchase-price config and sale tiers.
#[derive(Clone)]
pub struct PricingService {
    api: BillingApiClient,
}

impl PricingService {
    pub fn new(api: BillingApiClient) -> Self {
        Self { api }
    }

    /// Fetches the active configuration. If the backend returns several, the active one wins.
    pub async fn get_active_config(&self, key: &ApiKey) -> Result<PricingConfig, AppError> {
        let body = call(
            &self.api,
            "/admin/pricing/config/active",
            &json!({}),
            key,
            "Failed to fetch pricing configuration",
            PRICING_POLICY,
        )
        .await?;

        if let Value::Array(configs) = unwrap_data(body.clone()) {
            let mut decoded: Vec<PricingConfig> = configs
                .into_iter()
                .filter_map(|c| serde_json::from_value(c).ok())
                .collect();
            let active = decoded.iter().position(|c| c.is_active).unwrap_or(0);
            if decoded.is_empty() {
                return Err(AppError::EmptyResponse(
                    PRICING_POLICY.empty_response.to_string(),
                ));
            }
            return Ok(decoded.swap_remove(active));
        }

        decode_single(body, PRICING_POLICY, "pricing configuration")
    }

    pub async fn update_config(
        &self,
        update: &PricingConfigUpdate,
        key: &ApiKey,
    ) -> Result<Value, AppError> {
        require_positive_amount(&update.purchase_price, "Purchase price")?;

        let body = call(
            &self.api,
            "/admin/pricing/config/update",
            update,
            key,
            "Failed to update pricing configuration",
            PRICING_POLICY,
        )
        .await?;

        tracing::info!("✓ Purchase price updated to {}", update.purchase_price);
        Ok(unwrap_data(body))
    }

    pub async fn list_tiers(
        &self,
        params: &TierListParams,
        key: &ApiKey,
    ) -> Result<NormalizedList<PricingTier>, AppError> {
        let body = call(
            &self.api,
            "/admin/pricing/tiers",
            &PageRequest {
                page: params.page.max(1),
                per_page: params.per_page.max(1),
            },
            key,
            "Failed to fetch pricing tiers",
            PRICING_POLICY,
        )
        .await?;

        Ok(normalize_list::<PricingTier>(&body))
    }

    pub async fn create_tier(&self, tier: &TierInput, key: &ApiKey) -> Result<Value, AppError> {
        let tier = validate_tier(tier)?;

        let body = call(
            &self.api,
            "/admin/pricing/tiers/create",
            &tier,
            key,
            "Failed to create pricing tier",
            PRICING_POLICY,
        )
        .await?;

        tracing::info!("✓ Pricing tier '{}' created", tier.tier_name);
        Ok(unwrap_data(body))
    }

    pub async fn update_tier(
        &self,
        id: u64,
        tier: &TierInput,
        key: &ApiKey,
    ) -> Result<Value, AppError> {
        let id = require_positive_id(id, "Tier ID")?;
        let tier = validate_tier(tier)?;

        let body = call(
            &self.api,
            "/admin/pricing/tiers/update",
            &TierUpdateRequest { id, tier: &tier },
            key,
            "Failed to update pricing tier",
            PRICING_POLICY,
        )
        .await?;

        Ok(unwrap_data(body))
    }

    pub async fn delete_tier(&self, id: u64, key: &ApiKey) -> Result<Value, AppError> {
        let id = require_positive_id(id, "Tier ID")?;

        let body = call(
            &self.api,
            "/admin/pricing/tiers/delete",
            &IdRef { id },
            key,
            "Failed to delete pricing tier",
            PRICING_POLICY,
        )
        .await?;

        tracing::info!("✓ Pricing tier {} deleted", id);
        Ok(unwrap_data(body))
    }

    pub async fn toggle_tier(
        &self,
        id: u64,
        is_active: bool,
        key: &ApiKey,
    ) -> Result<Value, AppError> {
        let id = require_positive_id(id, "Tier ID")?;

        let body = call(
            &self.api,
            "/admin/pricing/tiers/toggle",
            &TierToggleRequest { id, is_active },
            key,
            "Failed to update pricing tier status",
            PRICING_POLICY,
        )
        .await?;

        Ok(unwrap_data(body))
    }
}

fn validate_tier(tier: &TierInput) -> Result<TierInput, AppError> {
    let tier_name = require_text(&tier.tier_name, "Tier name")?;
    if tier.volume_min < 0 {
        return Err(AppError::Validation(
            "Minimum volume cannot be negative".to_string(),
        ));
    }
    if let Some(max) = tier.volume_max {
        if max <= tier.volume_min {
            return Err(AppError::Validation(
                "Maximum volume must be greater than minimum volume".to_string(),
            ));
        }
    }
    require_positive_amount(&tier.sale_price, "Sale price")?;

    Ok(TierInput {
        tier_name,
        ..tier.clone()
    })
}

/// Balance top-ups: MPESA, MNO self top-up and invoice-backed manual requests.
#[derive(Clone)]
pub struct TopupService {
    api: BillingApiClient,
}

impl TopupService {
    pub fn new(api: BillingApiClient) -> Self {
        Self { api }
    }

    pub async fn mpesa_payment(
        &self,
        input: &MpesaPaymentInput,
        key: &ApiKey,
    ) -> Result<Value, AppError> {
        require_positive_amount(&input.amount, "Amount")?;
        let msisdn = normalize_msisdn(&input.msisdn)?;

        let body = call(
            &self.api,
            "/topup/mpesa",
            &MpesaPaymentInput {
                amount: input.amount.clone(),
                msisdn,
            },
            key,
            "Failed to initiate MPESA payment",
            TOPUP_POLICY,
        )
        .await?;

        tracing::info!("✓ MPESA payment of {} initiated", input.amount);
        Ok(unwrap_data(body))
    }

    /// Lists MNO providers.
    ///
    /// A 500 from this endpoint is not an error: the built-in provider list from
    /// [`fallback_mno_providers`] is returned so self top-up keeps working.
    pub async fn get_mno_providers(&self, key: &ApiKey) -> Result<Vec<MnoProvider>, AppError> {
        let body = match self.api.post("/topup/mno/providers", &json!({}), key).await {
            Ok(body) => require_body(body, TOPUP_POLICY)?,
            Err(failure) if failure.status() == Some(StatusCode::INTERNAL_SERVER_ERROR) => {
                tracing::warn!("MNO provider endpoint returned 500, serving fallback providers");
                return Ok(fallback_mno_providers());
            }
            Err(failure) => {
                return Err(translate_failure(
                    failure,
                    "Failed to fetch MNO providers",
                    TOPUP_POLICY,
                ))
            }
        };

        Ok(normalize_list::<MnoProvider>(&body).items)
    }

    pub async fn mno_self_topup(
        &self,
        input: &MnoSelfTopupInput,
        key: &ApiKey,
    ) -> Result<Value, AppError> {
        require_positive_amount(&input.amount, "Amount")?;
        let msisdn = normalize_msisdn(&input.msisdn)?;
        let provider_id = require_positive_id(input.provider_id, "Provider")?;

        let body = call(
            &self.api,
            "/topup/mno/self",
            &MnoSelfTopupInput {
                amount: input.amount.clone(),
                msisdn,
                provider_id,
            },
            key,
            "Failed to complete MNO top-up",
            TOPUP_POLICY,
        )
        .await?;

        tracing::info!("✓ MNO self top-up of {} submitted", input.amount);
        Ok(unwrap_data(body))
    }

    pub async fn list_mno_history(
        &self,
        params: &MnoHistoryParams,
        key: &ApiKey,
    ) -> Result<NormalizedList<MnoTopupRecord>, AppError> {
        let body = call(
            &self.api,
            "/topup/mno/history",
            &PageRequest {
                page: params.page.max(1),
                per_page: params.per_page.max(1),
            },
            key,
            "Failed to fetch MNO top-up history",
            TOPUP_POLICY,
        )
        .await?;

        Ok(normalize_list::<MnoTopupRecord>(&body))
    }

    pub async fn create_manual_topup(
        &self,
        input: &ManualTopupInput,
        key: &ApiKey,
    ) -> Result<Value, AppError> {
        require_positive_amount(&input.amount, "Amount")?;
        let connector_id = require_positive_id(input.connector_id, "Connector")?;
        let request = ManualTopupInput {
            amount: input.amount.clone(),
            currency: normalize_currency(&input.currency)?,
            connector_id,
            invoice_number: normalize_invoice_number(&input.invoice_number)?,
            invoice_path: clean_search(input.invoice_path.as_deref()),
            description: clean_search(input.description.as_deref()),
        };

        let body = call(
            &self.api,
            "/topup/manual/create",
            &request,
            key,
            "Failed to create manual top-up request",
            TOPUP_POLICY,
        )
        .await?;

        tracing::info!(
            "✓ Manual top-up request {} created for {} {}",
            request.invoice_number,
            request.amount,
            request.currency
        );
        Ok(unwrap_data(body))
    }

    pub async fn list_manual_topups(
        &self,
        params: &ManualTopupListParams,
        key: &ApiKey,
    ) -> Result<NormalizedList<ManualTopupRequest>, AppError> {
        let body = call(
            &self.api,
            "/topup/manual/list",
            &ManualTopupListRequest::from(params),
            key,
            "Failed to fetch manual top-up requests",
            TOPUP_POLICY,
        )
        .await?;

        Ok(normalize_list::<ManualTopupRequest>(&body))
    }

    pub async fn get_manual_topup(
        &self,
        id: u64,
        key: &ApiKey,
    ) -> Result<ManualTopupRequest, AppError> {
        let id = require_positive_id(id, "Top-up request ID")?;

        let body = call(
            &self.api,
            "/topup/manual/details",
            &IdRef { id },
            key,
            "Failed to fetch top-up request details",
            TOPUP_POLICY,
        )
        .await?;

        decode_single(body, TOPUP_POLICY, "top-up request details")
    }

    pub async fn available_connectors(&self, key: &ApiKey) -> Result<Vec<Connector>, AppError> {
        let body = call(
            &self.api,
            "/topup/connectors/available",
            &json!({}),
            key,
            "Failed to fetch available connectors",
            TOPUP_POLICY,
        )
        .await?;

        Ok(normalize_list::<Connector>(&body).items)
    }
}

/// Balance and billing figures shown on the dashboard.
#[derive(Clone)]
pub struct DashboardService {
    api: BillingApiClient,
}

impl DashboardService {
    pub fn new(api: BillingApiClient) -> Self {
        Self { api }
    }

    pub async fn summary(&self, key: &ApiKey) -> Result<DashboardSummary, AppError> {
        let body = call(
            &self.api,
            "/dashboard/summary",
            &json!({}),
            key,
            "Failed to fetch dashboard summary",
            DASHBOARD_POLICY,
        )
        .await?;

        decode_single(body, DASHBOARD_POLICY, "dashboard summary")
    }

    pub async fn billing_stats(&self, key: &ApiKey) -> Result<BillingStats, AppError> {
        let body = call(
            &self.api,
            "/dashboard/billing-stats",
            &json!({}),
            key,
            "Failed to fetch billing statistics",
            DASHBOARD_POLICY,
        )
        .await?;

        decode_single(body, DASHBOARD_POLICY, "billing statistics")
    }
}

/// Every resource service, sharing one HTTP client.
#[derive(Clone)]
pub struct BillingServices {
    pub kyb: KybService,
    pub pricing: PricingService,
    pub topup: TopupService,
    pub dashboard: DashboardService,
}

impl BillingServices {
    pub fn new(api: BillingApiClient) -> Self {
        Self {
            kyb: KybService::new(api.clone()),
            pricing: PricingService::new(api.clone()),
            topup: TopupService::new(api.clone()),
            dashboard: DashboardService::new(api),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kyb_503_is_rewritten() {
        let failure = RequestFailure::Status {
            status: StatusCode::SERVICE_UNAVAILABLE,
            body: Some(json!({"message": "upstream down"})),
        };
        let err = translate_failure(failure, "fallback", KYB_POLICY);
        assert!(matches!(err, AppError::ServiceUnavailable(_)));
        assert_eq!(err.user_message(), KYB_UNAVAILABLE);
    }

    #[test]
    fn test_503_passes_through_elsewhere() {
        let failure = RequestFailure::Status {
            status: StatusCode::SERVICE_UNAVAILABLE,
            body: Some(json!({"message": "upstream down"})),
        };
        let err = translate_failure(failure, "fallback", PRICING_POLICY);
        assert_eq!(err.user_message(), "upstream down");
    }

    #[test]
    fn test_status_without_message_uses_fallback() {
        let failure = RequestFailure::Status {
            status: StatusCode::BAD_REQUEST,
            body: None,
        };
        let err = translate_failure(failure, "Failed to fetch pricing tiers", PRICING_POLICY);
        assert_eq!(err.user_message(), "Failed to fetch pricing tiers");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_no_response_and_other() {
        let err = translate_failure(
            RequestFailure::NoResponse("timed out".into()),
            "fallback",
            TOPUP_POLICY,
        );
        assert_eq!(err.user_message(), NO_SERVER_RESPONSE);

        let err = translate_failure(RequestFailure::Other("bad json".into()), "fallback", TOPUP_POLICY);
        assert_eq!(err.user_message(), "fallback");
    }

    #[test]
    fn test_require_body_rejects_null() {
        let err = require_body(Value::Null, KYB_POLICY).unwrap_err();
        assert_eq!(err.user_message(), "No response received from KYB server");
    }

    #[test]
    fn test_validate_tier_rules() {
        let tier = TierInput {
            tier_name: "  Silver ".to_string(),
            volume_min: 1000,
            volume_max: Some(5000),
            sale_price: bigdecimal::BigDecimal::from(1),
            tier_order: Some(2),
            is_active: true,
        };
        assert_eq!(validate_tier(&tier).unwrap().tier_name, "Silver");

        let inverted = TierInput {
            volume_max: Some(500),
            ..tier.clone()
        };
        assert!(validate_tier(&inverted).is_err());

        let free = TierInput {
            sale_price: bigdecimal::BigDecimal::from(0),
            ..tier
        };
        assert!(validate_tier(&free).is_err());
    }
}
