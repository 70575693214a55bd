use crate::alerts::{Alert, AlertLog};
use crate::billing_client::BillingApiClient;
use crate::config::Config;
use crate::envelope::{NormalizedList, Pagination};
use crate::errors::AppError;
use crate::events::BalanceEvents;
use crate::models::*;
use crate::mutations::AdminMutations;
use crate::queries::{AdminQueries, DashboardRefresher, FetchMode};
use crate::query_cache::{QueryCache, QueryState};
use crate::screens::{
    enforce, kyb_badge, sort_tiers, topup_badge, Badge, KybDecisionGate, ListScreen,
    KYB_HISTORY_ROUTE,
};
use crate::services::BillingServices;
use crate::session::{Session, API_KEY_HEADER};
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

/// Shared application state injected into handlers.
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Cached reads.
    pub queries: Arc<AdminQueries>,
    /// Writes with invalidation and balance events.
    pub mutations: AdminMutations,
}

impl AppState {
    /// Wires the billing client, services, query cache and balance listeners.
    pub fn new(config: Config) -> Result<Self, AppError> {
        let api = BillingApiClient::new(&config)?;
        let services = BillingServices::new(api);
        let cache = QueryCache::new(&config);

        let queries = Arc::new(AdminQueries::new(services.clone(), cache.clone()));
        let events = Arc::new(BalanceEvents::new());
        events.subscribe(Arc::new(DashboardRefresher::new(Arc::clone(&queries))));

        let mutations = AdminMutations::new(services, cache, events);

        Ok(Self {
            config,
            queries,
            mutations,
        })
    }
}

/// Builds the operator session for one request. Alerts are collected and returned with the
/// response.
fn console_session(headers: &HeaderMap) -> (Session, Arc<AlertLog>) {
    let log = Arc::new(AlertLog::new());
    let raw_key = headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());
    (Session::from_raw_key(raw_key, log.clone()), log)
}

/// Query string shared by the list screens.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub status: Option<String>,
    pub search: Option<String>,
    #[serde(default)]
    pub refresh: bool,
}

impl ListQuery {
    fn mode(&self) -> FetchMode {
        if self.refresh {
            FetchMode::Refetch
        } else {
            FetchMode::Cached
        }
    }

    /// Applies the query string to a freshly mounted screen.
    fn screen<T>(&self, session: &Session, default_per_page: u32) -> ListScreen<T> {
        let mut screen = ListScreen::new(self.per_page.unwrap_or(default_per_page));
        screen.mount(session);
        screen.change_status(self.status.as_deref());
        screen.change_search(self.search.as_deref().unwrap_or_default());
        screen.go_to_page(self.page.unwrap_or(1));
        if self.refresh {
            screen.begin_refresh();
        }
        screen
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RefreshQuery {
    #[serde(default)]
    pub refresh: bool,
}

impl RefreshQuery {
    fn mode(&self) -> FetchMode {
        if self.refresh {
            FetchMode::Refetch
        } else {
            FetchMode::Cached
        }
    }
}

/// JSON view-model returned by every console route.
#[derive(Debug, Serialize)]
pub struct ConsoleResponse<T: Serialize> {
    pub state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub data: Option<T>,
    pub pagination: Option<Pagination>,
    pub can_prev: bool,
    pub can_next: bool,
    pub navigation: Option<&'static str>,
    pub alerts: Vec<Alert>,
    #[serde(skip)]
    status: StatusCode,
}

impl<T: Serialize> ConsoleResponse<T> {
    fn new(state: &'static str, data: Option<T>, log: &AlertLog) -> Self {
        Self {
            state,
            error: None,
            data,
            pagination: None,
            can_prev: false,
            can_next: false,
            navigation: None,
            alerts: log.snapshot(),
            status: StatusCode::OK,
        }
    }

    fn failed(err: &AppError, log: &AlertLog) -> Self {
        Self {
            error: Some(err.user_message()),
            status: err.status_code(),
            ..Self::new("failed", None, log)
        }
    }
}

impl<T: Serialize> IntoResponse for ConsoleResponse<T> {
    fn into_response(self) -> Response {
        let status = self.status;
        (status, Json(self)).into_response()
    }
}

fn list_response<T, R: Serialize>(
    screen: &ListScreen<T>,
    result: &QueryState<NormalizedList<T>>,
    rows: Option<R>,
    log: &AlertLog,
) -> Response {
    let page_state = screen.state();
    ConsoleResponse {
        error: page_state.message().map(str::to_string),
        pagination: screen.pagination().cloned(),
        can_prev: screen.can_prev(),
        can_next: screen.can_next(),
        status: result
            .error()
            .map(AppError::status_code)
            .unwrap_or(StatusCode::OK),
        ..ConsoleResponse::new(page_state.as_str(), rows, log)
    }
    .into_response()
}

fn query_response<T: Serialize>(result: &QueryState<T>, log: &AlertLog) -> Response {
    match result {
        QueryState::Disabled => ConsoleResponse::<&T>::new("no_credential", None, log).into_response(),
        QueryState::Success { data, .. } => {
            ConsoleResponse::new("ready", Some(data.as_ref()), log).into_response()
        }
        QueryState::Error(err) => ConsoleResponse::<&T>::failed(err, log).into_response(),
    }
}

fn mutation_response(
    result: Result<Value, AppError>,
    log: &AlertLog,
    navigation: Option<&'static str>,
) -> Response {
    match result {
        Ok(data) => ConsoleResponse {
            navigation,
            ..ConsoleResponse::new("submitted", Some(data), log)
        }
        .into_response(),
        Err(err) => ConsoleResponse::<Value>::failed(&err, log).into_response(),
    }
}

/// Unwraps a JSON body. A malformed one is answered with a validation alert instead of
/// axum's plain-text rejection.
fn json_body<T>(
    payload: Result<Json<T>, JsonRejection>,
    session: &Session,
    log: &AlertLog,
) -> Result<T, Response> {
    match payload {
        Ok(Json(value)) => Ok(value),
        Err(rejection) => {
            tracing::warn!("Rejected request body: {}", rejection.body_text());
            let e = AppError::Validation(format!("Invalid request body: {}", rejection.body_text()));
            session.alerts().error(&e.user_message());
            Err(ConsoleResponse::<Value> {
                status: rejection.status(),
                ..ConsoleResponse::failed(&e, log)
            }
            .into_response())
        }
    }
}

/// Health check endpoint.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "billing-admin-console",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

// ============ KYB ============

#[derive(Debug, Serialize)]
pub struct KybRow {
    #[serde(flatten)]
    pub record: KybRecord,
    pub badge: Option<Badge>,
}

impl KybRow {
    pub fn new(record: &KybRecord) -> Self {
        Self {
            record: record.clone(),
            badge: record.status.as_ref().map(kyb_badge),
        }
    }
}

/// `None` (absent or "all") lists every status.
fn kyb_status_filter(raw: Option<&str>, default: Option<KybStatus>) -> Option<KybStatus> {
    match raw {
        None => default,
        Some(s) if s.eq_ignore_ascii_case("all") => None,
        Some(s) => Some(KybStatus::parse(s)),
    }
}

fn kyb_rows(screen: &ListScreen<KybRecord>) -> Option<Vec<KybRow>> {
    screen
        .data()
        .map(|list| list.items.iter().map(KybRow::new).collect())
}

/// GET /admin/kyb/requests
pub async fn kyb_requests(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Response {
    let (session, log) = console_session(&headers);
    let mut screen = query.screen::<KybRecord>(&session, 10);

    let params = KybListParams {
        page: screen.page(),
        per_page: screen.per_page(),
        status: kyb_status_filter(screen.status(), Some(KybStatus::Pending)),
        search: screen.search().map(str::to_string),
    };
    let result = state.queries.kyb_requests(&session, &params, query.mode()).await;
    screen.settle(&result);

    list_response(&screen, &result, kyb_rows(&screen), &log)
}

/// GET /admin/kyb/requests/:id
pub async fn kyb_details(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(query): Query<RefreshQuery>,
) -> Response {
    let (session, log) = console_session(&headers);
    let result = state.queries.kyb_details(&session, &id, query.mode()).await;
    query_response(&result.map(KybRow::new), &log)
}

/// GET /admin/kyb/history
pub async fn kyb_history(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Response {
    let (session, log) = console_session(&headers);
    let mut screen = query.screen::<KybRecord>(&session, 10);

    let params = KybHistoryParams {
        page: screen.page(),
        per_page: screen.per_page(),
        status: kyb_status_filter(screen.status(), None),
        search: screen.search().map(str::to_string),
    };
    let result = state.queries.kyb_history(&session, &params, query.mode()).await;
    screen.settle(&result);

    list_response(&screen, &result, kyb_rows(&screen), &log)
}

/// Loads the selected request so the decision gate can check it.
async fn decision_gate(state: &AppState, session: &Session, kyb_id: &str) -> KybDecisionGate {
    let details = state
        .queries
        .kyb_details(session, kyb_id, FetchMode::Cached)
        .await;
    KybDecisionGate::for_details(session, kyb_id, &details)
}

/// POST /admin/kyb/approve
pub async fn approve_kyb(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<ApproveKybInput>, JsonRejection>,
) -> Response {
    let (session, log) = console_session(&headers);
    let input = match json_body(payload, &session, &log) {
        Ok(input) => input,
        Err(response) => return response,
    };
    tracing::info!("POST /admin/kyb/approve - kyb_id: {}", input.kyb_id);

    let gate = decision_gate(&state, &session, &input.kyb_id).await;
    if let Err(e) = enforce(gate.check_approve(), &session) {
        return ConsoleResponse::<Value>::failed(&e, &log).into_response();
    }

    let result = state.mutations.approve_kyb(&session, &input).await;
    mutation_response(result, &log, Some(KYB_HISTORY_ROUTE))
}

/// POST /admin/kyb/reject
pub async fn reject_kyb(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<RejectKybInput>, JsonRejection>,
) -> Response {
    let (session, log) = console_session(&headers);
    let input = match json_body(payload, &session, &log) {
        Ok(input) => input,
        Err(response) => return response,
    };
    tracing::info!("POST /admin/kyb/reject - kyb_id: {}", input.kyb_id);

    // Reason is checked first so an empty one never triggers a details load.
    if input.reason.trim().is_empty() {
        let e = AppError::Validation("Please provide a reason for rejection".to_string());
        session.alerts().error(&e.user_message());
        return ConsoleResponse::<Value>::failed(&e, &log).into_response();
    }

    let gate = decision_gate(&state, &session, &input.kyb_id).await;
    if let Err(e) = enforce(gate.check_reject(&input.reason), &session) {
        return ConsoleResponse::<Value>::failed(&e, &log).into_response();
    }

    let result = state.mutations.reject_kyb(&session, &input).await;
    mutation_response(result, &log, Some(KYB_HISTORY_ROUTE))
}

// ============ Pricing ============

/// GET /admin/pricing/config
pub async fn pricing_config(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<RefreshQuery>,
) -> Response {
    let (session, log) = console_session(&headers);
    let result = state.queries.pricing_config(&session, query.mode()).await;
    query_response(&result, &log)
}

/// PUT /admin/pricing/config
pub async fn update_pricing_config(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<PricingConfigUpdate>, JsonRejection>,
) -> Response {
    let (session, log) = console_session(&headers);
    let update = match json_body(payload, &session, &log) {
        Ok(update) => update,
        Err(response) => return response,
    };
    let result = state.mutations.update_pricing_config(&session, &update).await;
    mutation_response(result, &log, None)
}

#[derive(Debug, Serialize)]
pub struct TierRow {
    #[serde(flatten)]
    pub tier: PricingTier,
    pub volume_range: String,
}

/// GET /admin/pricing/tiers
pub async fn pricing_tiers(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Response {
    let (session, log) = console_session(&headers);
    let mut screen = query.screen::<PricingTier>(&session, 50);

    let params = TierListParams {
        page: screen.page(),
        per_page: screen.per_page(),
    };
    let result = state.queries.pricing_tiers(&session, &params, query.mode()).await;
    screen.settle(&result);

    let rows: Option<Vec<TierRow>> = screen.data().map(|list| {
        let mut tiers = list.items.clone();
        sort_tiers(&mut tiers);
        tiers
            .into_iter()
            .map(|tier| TierRow {
                volume_range: tier.volume_range_label(),
                tier,
            })
            .collect()
    });
    list_response(&screen, &result, rows, &log)
}

/// POST /admin/pricing/tiers
pub async fn create_tier(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<TierInput>, JsonRejection>,
) -> Response {
    let (session, log) = console_session(&headers);
    let tier = match json_body(payload, &session, &log) {
        Ok(tier) => tier,
        Err(response) => return response,
    };
    let result = state.mutations.create_tier(&session, &tier).await;
    mutation_response(result, &log, None)
}

/// PUT /admin/pricing/tiers/:id
pub async fn update_tier(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<u64>,
    payload: Result<Json<TierInput>, JsonRejection>,
) -> Response {
    let (session, log) = console_session(&headers);
    let tier = match json_body(payload, &session, &log) {
        Ok(tier) => tier,
        Err(response) => return response,
    };
    let result = state.mutations.update_tier(&session, id, &tier).await;
    mutation_response(result, &log, None)
}

/// DELETE /admin/pricing/tiers/:id
pub async fn delete_tier(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> Response {
    let (session, log) = console_session(&headers);
    let result = state.mutations.delete_tier(&session, id).await;
    mutation_response(result, &log, None)
}

#[derive(Debug, Deserialize)]
pub struct ToggleBody {
    pub is_active: bool,
}

/// POST /admin/pricing/tiers/:id/toggle
pub async fn toggle_tier(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<u64>,
    payload: Result<Json<ToggleBody>, JsonRejection>,
) -> Response {
    let (session, log) = console_session(&headers);
    let body = match json_body(payload, &session, &log) {
        Ok(body) => body,
        Err(response) => return response,
    };
    let result = state.mutations.toggle_tier(&session, id, body.is_active).await;
    mutation_response(result, &log, None)
}

// ============ Top-up ============

#[derive(Debug, Serialize)]
pub struct TopupRow {
    #[serde(flatten)]
    pub request: ManualTopupRequest,
    pub badge: Badge,
}

impl TopupRow {
    pub fn new(request: &ManualTopupRequest) -> Self {
        Self {
            badge: topup_badge(&request.status),
            request: request.clone(),
        }
    }
}

/// GET /topup/manual
pub async fn manual_topups(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Response {
    let (session, log) = console_session(&headers);
    let mut screen = query.screen::<ManualTopupRequest>(&session, 10);

    let params = ManualTopupListParams {
        page: screen.page(),
        per_page: screen.per_page(),
        status: screen.status().map(str::to_string),
        search: screen.search().map(str::to_string),
    };
    let result = state.queries.manual_topups(&session, &params, query.mode()).await;
    screen.settle(&result);

    let rows: Option<Vec<TopupRow>> = screen
        .data()
        .map(|list| list.items.iter().map(TopupRow::new).collect());
    list_response(&screen, &result, rows, &log)
}

/// GET /topup/manual/:id
pub async fn manual_topup_details(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<u64>,
    Query(query): Query<RefreshQuery>,
) -> Response {
    let (session, log) = console_session(&headers);
    let result = state
        .queries
        .manual_topup_details(&session, id, query.mode())
        .await;
    query_response(&result.map(TopupRow::new), &log)
}

/// POST /topup/manual
pub async fn create_manual_topup(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<ManualTopupInput>, JsonRejection>,
) -> Response {
    let (session, log) = console_session(&headers);
    let input = match json_body(payload, &session, &log) {
        Ok(input) => input,
        Err(response) => return response,
    };
    tracing::info!(
        "POST /topup/manual - connector: {}, invoice: {}",
        input.connector_id,
        input.invoice_number
    );
    let result = state.mutations.create_manual_topup(&session, &input).await;
    mutation_response(result, &log, None)
}

/// GET /topup/connectors
pub async fn connectors(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<RefreshQuery>,
) -> Response {
    let (session, log) = console_session(&headers);
    let result = state.queries.connectors(&session, query.mode()).await;
    query_response(&result, &log)
}

/// GET /topup/mno/providers
pub async fn mno_providers(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<RefreshQuery>,
) -> Response {
    let (session, log) = console_session(&headers);
    let result = state.queries.mno_providers(&session, query.mode()).await;
    query_response(&result, &log)
}

/// GET /topup/mno/history
pub async fn mno_history(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Response {
    let (session, log) = console_session(&headers);
    let mut screen = query.screen::<MnoTopupRecord>(&session, 10);

    let params = MnoHistoryParams {
        page: screen.page(),
        per_page: screen.per_page(),
    };
    let result = state.queries.mno_history(&session, &params, query.mode()).await;
    screen.settle(&result);

    let rows = screen.data().map(|list| list.items.clone());
    list_response(&screen, &result, rows, &log)
}

/// POST /topup/mno
pub async fn mno_self_topup(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<MnoSelfTopupInput>, JsonRejection>,
) -> Response {
    let (session, log) = console_session(&headers);
    let input = match json_body(payload, &session, &log) {
        Ok(input) => input,
        Err(response) => return response,
    };
    let result = state.mutations.mno_self_topup(&session, &input).await;
    mutation_response(result, &log, None)
}

/// POST /topup/mpesa
pub async fn mpesa_payment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<MpesaPaymentInput>, JsonRejection>,
) -> Response {
    let (session, log) = console_session(&headers);
    let input = match json_body(payload, &session, &log) {
        Ok(input) => input,
        Err(response) => return response,
    };
    let result = state.mutations.mpesa_payment(&session, &input).await;
    mutation_response(result, &log, None)
}

// ============ Dashboard ============

/// GET /dashboard/summary
pub async fn dashboard_summary(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<RefreshQuery>,
) -> Response {
    let (session, log) = console_session(&headers);
    let result = state.queries.dashboard_summary(&session, query.mode()).await;
    query_response(&result, &log)
}

/// GET /dashboard/billing-stats
pub async fn billing_stats(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<RefreshQuery>,
) -> Response {
    let (session, log) = console_session(&headers);
    let result = state.queries.billing_stats(&session, query.mode()).await;
    query_response(&result, &log)
}
