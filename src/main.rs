use axum::{
    routing::{get, post, put},
    Router,
};
use billing_admin_console::config::Config;
use billing_admin_console::handlers::{self, AppState};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the admin console.
///
/// Initializes tracing, loads configuration, wires the billing client, query cache and balance
/// listeners, then serves the console routes.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "billing_admin_console=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    let app_state = Arc::new(AppState::new(config.clone())?);
    tracing::info!(
        "✓ Billing API client initialized: {}",
        config.billing_api_base_url
    );
    tracing::info!(
        "Query cache initialized ({}s TTL, {} capacity)",
        config.query_cache_ttl_secs,
        config.query_cache_capacity
    );

    // Configure rate limiter: 10 requests/second per IP, burst of 20
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Invalid rate limiter configuration"))?,
    );

    let protected_routes = Router::new()
        // KYB review
        .route("/admin/kyb/requests", get(handlers::kyb_requests))
        .route("/admin/kyb/requests/:id", get(handlers::kyb_details))
        .route("/admin/kyb/history", get(handlers::kyb_history))
        .route("/admin/kyb/approve", post(handlers::approve_kyb))
        .route("/admin/kyb/reject", post(handlers::reject_kyb))
        // SMS pricing
        .route(
            "/admin/pricing/config",
            get(handlers::pricing_config).put(handlers::update_pricing_config),
        )
        .route(
            "/admin/pricing/tiers",
            get(handlers::pricing_tiers).post(handlers::create_tier),
        )
        .route(
            "/admin/pricing/tiers/:id",
            put(handlers::update_tier).delete(handlers::delete_tier),
        )
        .route("/admin/pricing/tiers/:id/toggle", post(handlers::toggle_tier))
        // Top-ups
        .route(
            "/topup/manual",
            get(handlers::manual_topups).post(handlers::create_manual_topup),
        )
        .route("/topup/manual/:id", get(handlers::manual_topup_details))
        .route("/topup/connectors", get(handlers::connectors))
        .route("/topup/mno/providers", get(handlers::mno_providers))
        .route("/topup/mno/history", get(handlers::mno_history))
        .route("/topup/mno", post(handlers::mno_self_topup))
        .route("/topup/mpesa", post(handlers::mpesa_payment))
        // Dashboard
        .route("/dashboard/summary", get(handlers::dashboard_summary))
        .route("/dashboard/billing-stats", get(handlers::billing_stats))
        .layer(
            ServiceBuilder::new()
                // Request size limit: 1MB max payload
                .layer(RequestBodyLimitLayer::new(1024 * 1024))
                .layer(GovernorLayer {
                    config: governor_conf,
                }),
        );

    // Health check bypasses rate limiting
    let app = Router::new()
        .route("/health", get(handlers::health))
        .merge(protected_routes)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}
