/// Integration tests with a mocked billing backend
/// Exercises services, the query cache, mutations and balance events end to end
use billing_admin_console::alerts::{AlertLevel, AlertLog};
use billing_admin_console::billing_client::BillingApiClient;
use billing_admin_console::config::Config;
use billing_admin_console::errors::AppError;
use billing_admin_console::handlers::{self, AppState, RefreshQuery};
use billing_admin_console::models::*;
use billing_admin_console::queries::FetchMode;
use billing_admin_console::query_cache::QueryState;
use billing_admin_console::screens::{enforce, KybDecisionGate};
use billing_admin_console::services::BillingServices;
use billing_admin_console::session::{ApiKey, Session, API_KEY_HEADER};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::Response;
use axum::Json;
use bigdecimal::BigDecimal;
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TEST_KEY: &str = "test-key";

fn services(server: &MockServer) -> BillingServices {
    let config = Config::for_base_url(server.uri());
    BillingServices::new(BillingApiClient::new(&config).unwrap())
}

fn console(server: &MockServer) -> AppState {
    AppState::new(Config::for_base_url(server.uri())).unwrap()
}

fn session() -> (Session, Arc<AlertLog>) {
    let log = Arc::new(AlertLog::new());
    (Session::from_raw_key(Some(TEST_KEY), log.clone()), log)
}

fn key() -> ApiKey {
    ApiKey::parse(TEST_KEY).unwrap()
}

fn operator_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(API_KEY_HEADER, HeaderValue::from_static(TEST_KEY));
    headers
}

async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn alert_messages(body: &Value) -> Vec<String> {
    body["alerts"]
        .as_array()
        .unwrap()
        .iter()
        .map(|alert| alert["message"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_kyb_503_is_reported_as_unavailable() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/admin/kyb/clients"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({"message": "maintenance"})))
        .mount(&mock_server)
        .await;

    let err = services(&mock_server)
        .kyb
        .list_requests(&KybListParams::default(), &key())
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::ServiceUnavailable(_)));
    assert_eq!(
        err.user_message(),
        "KYB service is temporarily unavailable. Please try again later."
    );
}

#[tokio::test]
async fn test_http_error_surfaces_body_message() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/admin/pricing/tiers/delete"))
        .respond_with(
            ResponseTemplate::new(409).set_body_json(json!({"message": "Tier is in use"})),
        )
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/admin/pricing/tiers/toggle"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&mock_server)
        .await;

    let pricing = services(&mock_server).pricing;

    let err = pricing.delete_tier(7, &key()).await.unwrap_err();
    assert_eq!(err.user_message(), "Tier is in use");
    assert_eq!(err.status_code().as_u16(), 409);

    // No body: the function's own fallback message
    let err = pricing.toggle_tier(7, false, &key()).await.unwrap_err();
    assert!(matches!(err, AppError::Server { status: 400, .. }));
    assert!(!err.user_message().is_empty());
}

#[tokio::test]
async fn test_unreachable_backend_gives_connectivity_message() {
    // Nothing listens on port 1
    let config = Config::for_base_url("http://127.0.0.1:1");
    let services = BillingServices::new(BillingApiClient::new(&config).unwrap());

    let err = services.dashboard.summary(&key()).await.unwrap_err();

    assert!(matches!(err, AppError::NoServerResponse(_)));
    assert_eq!(
        err.user_message(),
        "No server response. Please check your internet connection."
    );
}

#[tokio::test]
async fn test_empty_body_is_an_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/admin/pricing/config/active"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let err = services(&mock_server)
        .pricing
        .get_active_config(&key())
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::EmptyResponse(_)));
    assert_eq!(err.user_message(), "No response received from pricing server");
}

#[tokio::test]
async fn test_mno_providers_500_falls_back() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/topup/mno/providers"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"message": "boom"})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let providers = services(&mock_server)
        .topup
        .get_mno_providers(&key())
        .await
        .unwrap();

    assert_eq!(providers.len(), 4);
    assert_eq!(providers, fallback_mno_providers());
}

#[tokio::test]
async fn test_no_api_key_means_no_request() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .expect(0)
        .mount(&mock_server)
        .await;

    let state = console(&mock_server);
    let queries = &state.queries;
    let anonymous = Session::anonymous();
    let mode = FetchMode::Cached;

    assert!(queries
        .kyb_requests(&anonymous, &KybListParams::default(), mode)
        .await
        .is_disabled());
    assert!(queries.kyb_details(&anonymous, "1", mode).await.is_disabled());
    assert!(queries
        .kyb_history(&anonymous, &KybHistoryParams::default(), mode)
        .await
        .is_disabled());
    assert!(queries.pricing_config(&anonymous, mode).await.is_disabled());
    assert!(queries
        .pricing_tiers(&anonymous, &TierListParams::default(), mode)
        .await
        .is_disabled());
    assert!(queries
        .manual_topups(&anonymous, &ManualTopupListParams::default(), mode)
        .await
        .is_disabled());
    assert!(queries
        .manual_topup_details(&anonymous, 3, mode)
        .await
        .is_disabled());
    assert!(queries
        .mno_history(&anonymous, &MnoHistoryParams::default(), mode)
        .await
        .is_disabled());
    assert!(queries.mno_providers(&anonymous, mode).await.is_disabled());
    assert!(queries.connectors(&anonymous, mode).await.is_disabled());
    assert!(queries.dashboard_summary(&anonymous, mode).await.is_disabled());
    assert!(queries.billing_stats(&anonymous, mode).await.is_disabled());

    // Writes are refused too
    let err = state
        .mutations
        .delete_tier(&anonymous, 1)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::MissingCredential(_)));
}

#[tokio::test]
async fn test_details_query_waits_for_an_id() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let state = console(&mock_server);
    let (session, _) = session();

    let details = state.queries.kyb_details(&session, "  ", FetchMode::Cached).await;
    assert!(details.is_disabled());
}

#[tokio::test]
async fn test_validation_runs_before_dispatch() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(0)
        .mount(&mock_server)
        .await;

    let state = console(&mock_server);
    let (session, log) = session();

    let err = state
        .mutations
        .reject_kyb(
            &session,
            &RejectKybInput {
                kyb_id: "1".to_string(),
                reason: "   ".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let err = state
        .mutations
        .approve_kyb(
            &session,
            &ApproveKybInput {
                kyb_id: String::new(),
                notes: "ok".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.user_message(), "Client ID is required");

    let err = state
        .mutations
        .mpesa_payment(
            &session,
            &MpesaPaymentInput {
                amount: BigDecimal::from(0),
                msisdn: "0712345678".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert!(err.is_client_side());

    let alerts = log.snapshot();
    assert_eq!(alerts.len(), 3);
    assert!(alerts.iter().all(|a| a.level == AlertLevel::Error));
}

#[tokio::test]
async fn test_manual_topup_refreshes_dashboard() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/topup/manual/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": 1, "amount": "500.00", "currency": "KES", "status": "pending"}],
            "pagination": {"current_page": 1, "total_pages": 1}
        })))
        .expect(2)
        .mount(&mock_server)
        .await;
    // Initial load plus the refresh triggered by the top-up
    Mock::given(method("POST"))
        .and(path("/dashboard/summary"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"data": {"balance": 1500, "currency": "KES"}})),
        )
        .expect(2)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/dashboard/billing-stats"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"total_topups": 3}})))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/topup/manual/create"))
        .and(header("X-API-Key", TEST_KEY))
        .and(body_partial_json(json!({
            "amount": "1000",
            "currency": "KES",
            "connector_id": 2,
            "invoice_number": "INV-2024-001"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"data": {"id": 9}})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let state = console(&mock_server);
    let (session, log) = session();
    let params = ManualTopupListParams::default();

    let first = state.queries.manual_topups(&session, &params, FetchMode::Cached).await;
    assert_eq!(first.data().map(|list| list.items.len()), Some(1));
    let summary = state.queries.dashboard_summary(&session, FetchMode::Cached).await;
    assert!(summary.is_success());

    let created = state
        .mutations
        .create_manual_topup(
            &session,
            &ManualTopupInput {
                amount: BigDecimal::from_str("1000").unwrap(),
                currency: "kes".to_string(),
                connector_id: 2,
                invoice_number: "INV-2024-001".to_string(),
                invoice_path: None,
                description: Some("March invoice".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(created["id"], 9);

    // The list was invalidated and reloads from the backend
    let reloaded = state.queries.manual_topups(&session, &params, FetchMode::Cached).await;
    assert!(matches!(reloaded, QueryState::Success { from_cache: false, .. }));

    // The dashboard was already refetched by the balance event
    let summary = state.queries.dashboard_summary(&session, FetchMode::Cached).await;
    assert!(matches!(summary, QueryState::Success { from_cache: true, .. }));

    assert!(log
        .messages()
        .contains(&"Top-up request submitted successfully".to_string()));
}

#[tokio::test]
async fn test_approve_scenario() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/admin/kyb/details"))
        .and(body_partial_json(json!({"client_id": 1})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "client_id": 1,
                "client_name": "Test Client",
                "email": "test@client.co.ke",
                "kyb_status": "pending",
                "documents_count": 3
            }
        })))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/admin/kyb/approve"))
        .and(body_partial_json(json!({"client_id": 1, "message": "Documents verified"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"success": true, "message": "KYB approved"})),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let state = console(&mock_server);
    let (session, log) = session();

    let details = state.queries.kyb_details(&session, "1", FetchMode::Cached).await;
    let record = details.data().unwrap();
    assert_eq!(record.display_name(), "Test Client");
    assert_eq!(record.status, Some(KybStatus::Pending));

    let gate = KybDecisionGate::for_details(&session, "1", &details);
    enforce(gate.check_approve(), &session).unwrap();

    let input = ApproveKybInput {
        kyb_id: "1".to_string(),
        notes: "Documents verified".to_string(),
    };
    state.mutations.approve_kyb(&session, &input).await.unwrap();

    assert_eq!(
        log.messages(),
        vec!["KYB request approved successfully".to_string()]
    );

    // Every admin-kyb query was invalidated, so details reload
    let reloaded = state.queries.kyb_details(&session, "1", FetchMode::Cached).await;
    assert!(matches!(reloaded, QueryState::Success { from_cache: false, .. }));
}

#[tokio::test]
async fn test_list_envelopes_normalize_through_services() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/admin/pricing/tiers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": {
                "records": [
                    {"id": 1, "tier_name": "Starter", "volume_min": 0, "volume_max": {"Int64": 9999, "Valid": true}, "sale_price": "0.80", "tier_order": 1},
                    {"id": 2, "tier_name": "Bulk", "volume_min": 10000, "volume_max": {"Int64": 0, "Valid": false}, "sale_price": 0.65, "tier_order": 2}
                ],
                "last_page": 1
            }
        })))
        .mount(&mock_server)
        .await;

    let tiers = services(&mock_server)
        .pricing
        .list_tiers(&TierListParams::default(), &key())
        .await
        .unwrap();

    assert_eq!(tiers.items.len(), 2);
    assert_eq!(tiers.items[0].volume_max, Some(9999));
    assert_eq!(tiers.items[1].volume_max, None);
    assert_eq!(tiers.items[1].volume_range_label(), "10,000+");
    assert!(!tiers.pagination.unwrap().has_next());
}

#[tokio::test]
async fn test_console_approve_navigates_to_history() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/admin/kyb/details"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"client_id": 5, "client_name": "Acme Ltd", "status": "pending"}
        })))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/admin/kyb/approve"))
        .and(body_partial_json(json!({"client_id": 5})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let state = Arc::new(console(&mock_server));
    let response = handlers::approve_kyb(
        State(state),
        operator_headers(),
        Ok(Json(ApproveKybInput {
            kyb_id: "5".to_string(),
            notes: "Looks good".to_string(),
        })),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["state"], "submitted");
    assert_eq!(body["navigation"], "/admin/kyb/history");
    assert_eq!(
        alert_messages(&body),
        vec!["KYB request approved successfully".to_string()]
    );
}

#[tokio::test]
async fn test_console_decisions_need_reason_and_loaded_details() {
    let mock_server = MockServer::start().await;

    // Only the approve attempt loads details; the blank rejection stops before that
    Mock::given(method("POST"))
        .and(path("/admin/kyb/details"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"message": "details down"})))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/admin/kyb/approve"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(0)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/admin/kyb/reject"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(0)
        .mount(&mock_server)
        .await;

    let state = Arc::new(console(&mock_server));

    let rejected = handlers::reject_kyb(
        State(state.clone()),
        operator_headers(),
        Ok(Json(RejectKybInput {
            kyb_id: "5".to_string(),
            reason: "  ".to_string(),
        })),
    )
    .await;
    assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);
    let body = body_json(rejected).await;
    assert_eq!(body["state"], "failed");
    assert!(body["navigation"].is_null());
    assert_eq!(
        alert_messages(&body),
        vec!["Please provide a reason for rejection".to_string()]
    );

    let approved = handlers::approve_kyb(
        State(state),
        operator_headers(),
        Ok(Json(ApproveKybInput {
            kyb_id: "5".to_string(),
            notes: String::new(),
        })),
    )
    .await;
    let body = body_json(approved).await;
    assert_eq!(body["state"], "failed");
    assert!(body["navigation"].is_null());
    assert_eq!(
        alert_messages(&body),
        vec![
            "details down".to_string(),
            "KYB details must be loaded before a decision".to_string()
        ]
    );
}

#[tokio::test]
async fn test_failed_read_raises_error_alert() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/admin/pricing/tiers"))
        .respond_with(
            ResponseTemplate::new(422).set_body_json(json!({"message": "bad tier query"})),
        )
        .mount(&mock_server)
        .await;

    let state = console(&mock_server);
    let (session, log) = session();

    let tiers = state
        .queries
        .pricing_tiers(&session, &TierListParams::default(), FetchMode::Cached)
        .await;

    assert_eq!(tiers.error().map(|e| e.status_code().as_u16()), Some(422));
    let alerts = log.snapshot();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].level, AlertLevel::Error);
    assert_eq!(alerts[0].message, "bad tier query");
}

#[tokio::test]
async fn test_console_refresh_confirms_with_alert() {
    let mock_server = MockServer::start().await;

    // Cached load plus the forced reload
    Mock::given(method("POST"))
        .and(path("/topup/connectors/available"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": 1, "name": "Equity Bank", "currency": "KES"}]
        })))
        .expect(2)
        .mount(&mock_server)
        .await;

    let state = Arc::new(console(&mock_server));

    let cached = handlers::connectors(
        State(state.clone()),
        operator_headers(),
        Query(RefreshQuery::default()),
    )
    .await;
    let body = body_json(cached).await;
    assert_eq!(body["state"], "ready");
    assert!(alert_messages(&body).is_empty());

    let refreshed = handlers::connectors(
        State(state),
        operator_headers(),
        Query(RefreshQuery { refresh: true }),
    )
    .await;
    let body = body_json(refreshed).await;
    assert_eq!(body["data"][0]["name"], "Equity Bank");
    assert_eq!(alert_messages(&body), vec!["Connectors refreshed".to_string()]);
    assert_eq!(body["alerts"][0]["level"], "success");
}

#[tokio::test]
async fn test_console_malformed_body_answers_with_alert() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(0)
        .mount(&mock_server)
        .await;

    let state = Arc::new(console(&mock_server));
    // volume_min and sale_price are missing
    let payload = Json::<TierInput>::from_bytes(br#"{"tier_name": "Gold"}"#);
    let response = handlers::create_tier(State(state), operator_headers(), payload).await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert_eq!(body["state"], "failed");
    let alerts = alert_messages(&body);
    assert_eq!(alerts.len(), 1);
    assert!(alerts[0].starts_with("Invalid request body"));
}
