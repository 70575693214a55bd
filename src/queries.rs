//! Read layer.
//!
//! Each read is keyed by `[resource tag, params..., key fingerprint]` and is only dispatched when
//! the session carries an API key (plus any read-specific condition). Errors raise an alert as a
//! side effect; the returned [`QueryState`] is exactly what the cache produced.

use crate::envelope::NormalizedList;
use crate::errors::AppError;
use crate::events::BalanceListener;
use crate::models::*;
use crate::query_cache::{QueryCache, QueryKey, QueryState};
use crate::services::BillingServices;
use crate::session::{ApiKey, Session};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

const GENERIC_LOAD_ERROR: &str = "Something went wrong while loading data";

/// Cache tags, shared with the write layer for invalidation.
pub mod tags {
    pub const ADMIN_KYB: &str = "admin-kyb";
    pub const PRICING_CONFIG: &str = "pricing-config";
    pub const PRICING_TIERS: &str = "pricing-tiers";
    pub const MANUAL_TOPUPS: &str = "manual-topup-requests";
    pub const MANUAL_TOPUP_DETAILS: &str = "manual-topup-details";
    pub const MNO_HISTORY: &str = "mno-history";
    pub const MNO_PROVIDERS: &str = "mno-providers";
    pub const CONNECTORS: &str = "available-connectors";
    pub const DASHBOARD: &str = "dashboard";
    pub const DASHBOARD_SUMMARY: &str = "summary";
    pub const BILLING_STATS: &str = "billing-stats";
}

/// Whether a read may be served from cache or must go to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchMode {
    #[default]
    Cached,
    /// Operator-triggered refresh: drop the entry, reload, and confirm with an alert.
    Refetch,
}

/// Alert text for a failed read; blank messages fall back to a generic one.
fn load_error_message(err: &AppError) -> String {
    let message = err.user_message();
    if message.trim().is_empty() {
        GENERIC_LOAD_ERROR.to_string()
    } else {
        message
    }
}

fn opt_segment<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

pub struct AdminQueries {
    services: BillingServices,
    cache: QueryCache,
}

impl AdminQueries {
    pub fn new(services: BillingServices, cache: QueryCache) -> Self {
        Self { services, cache }
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    async fn run<T, F, Fut>(
        &self,
        session: &Session,
        key: QueryKey,
        condition: bool,
        mode: FetchMode,
        label: &str,
        loader: F,
    ) -> QueryState<T>
    where
        T: Send + Sync + 'static,
        F: FnOnce(ApiKey) -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let enabled = session.is_enabled() && condition;
        let key = key.with(opt_segment(session.api_key().map(ApiKey::fingerprint)));
        let load = move || async move {
            let api_key = session.require()?.clone();
            loader(api_key).await
        };

        let state = match mode {
            FetchMode::Cached => self.cache.fetch(key, enabled, load).await,
            FetchMode::Refetch => self.cache.refetch(key, enabled, load).await,
        };

        match &state {
            QueryState::Error(err) => {
                tracing::error!("Loading {} failed: {}", label, err);
                session.alerts().error(&load_error_message(err));
            }
            QueryState::Success { .. } if mode == FetchMode::Refetch => {
                session.alerts().success(&format!("{} refreshed", label));
            }
            _ => {}
        }

        state
    }

    // ---- KYB ----

    pub async fn kyb_requests(
        &self,
        session: &Session,
        params: &KybListParams,
        mode: FetchMode,
    ) -> QueryState<NormalizedList<KybRecord>> {
        let key = QueryKey::new([tags::ADMIN_KYB, "requests"])
            .with(params.page.to_string())
            .with(params.per_page.to_string())
            .with(opt_segment(params.status.as_ref()))
            .with(opt_segment(clean_search(params.search.as_deref())));
        let kyb = &self.services.kyb;

        self.run(session, key, true, mode, "KYB requests", move |api_key| async move {
            kyb.list_requests(params, &api_key).await
        })
        .await
    }

    /// Loads one KYB request. Disabled until an id has been entered.
    pub async fn kyb_details(
        &self,
        session: &Session,
        client_id: &str,
        mode: FetchMode,
    ) -> QueryState<KybRecord> {
        let client_id = client_id.trim();
        let key = QueryKey::new([tags::ADMIN_KYB, "details", client_id]);
        let kyb = &self.services.kyb;

        self.run(
            session,
            key,
            !client_id.is_empty(),
            mode,
            "KYB request",
            move |api_key| async move { kyb.get_details(client_id, &api_key).await },
        )
        .await
    }

    pub async fn kyb_history(
        &self,
        session: &Session,
        params: &KybHistoryParams,
        mode: FetchMode,
    ) -> QueryState<NormalizedList<KybRecord>> {
        let key = QueryKey::new([tags::ADMIN_KYB, "history"])
            .with(params.page.to_string())
            .with(params.per_page.to_string())
            .with(opt_segment(params.status.as_ref()))
            .with(opt_segment(clean_search(params.search.as_deref())));
        let kyb = &self.services.kyb;

        self.run(session, key, true, mode, "KYB history", move |api_key| async move {
            kyb.list_history(params, &api_key).await
        })
        .await
    }

    // ---- Pricing ----

    pub async fn pricing_config(&self, session: &Session, mode: FetchMode) -> QueryState<PricingConfig> {
        let pricing = &self.services.pricing;
        self.run(
            session,
            QueryKey::new([tags::PRICING_CONFIG]),
            true,
            mode,
            "Pricing configuration",
            move |api_key| async move { pricing.get_active_config(&api_key).await },
        )
        .await
    }

    pub async fn pricing_tiers(
        &self,
        session: &Session,
        params: &TierListParams,
        mode: FetchMode,
    ) -> QueryState<NormalizedList<PricingTier>> {
        let key = QueryKey::new([tags::PRICING_TIERS])
            .with(params.page.to_string())
            .with(params.per_page.to_string());
        let pricing = &self.services.pricing;

        self.run(session, key, true, mode, "Pricing tiers", move |api_key| async move {
            pricing.list_tiers(params, &api_key).await
        })
        .await
    }

    // ---- Top-up ----

    pub async fn manual_topups(
        &self,
        session: &Session,
        params: &ManualTopupListParams,
        mode: FetchMode,
    ) -> QueryState<NormalizedList<ManualTopupRequest>> {
        let key = QueryKey::new([tags::MANUAL_TOPUPS])
            .with(params.page.to_string())
            .with(params.per_page.to_string())
            .with(opt_segment(params.status.as_deref()))
            .with(opt_segment(clean_search(params.search.as_deref())));
        let topup = &self.services.topup;

        self.run(session, key, true, mode, "Top-up requests", move |api_key| async move {
            topup.list_manual_topups(params, &api_key).await
        })
        .await
    }

    pub async fn manual_topup_details(
        &self,
        session: &Session,
        id: u64,
        mode: FetchMode,
    ) -> QueryState<ManualTopupRequest> {
        let key = QueryKey::new([tags::MANUAL_TOPUP_DETAILS]).with(id.to_string());
        let topup = &self.services.topup;

        self.run(session, key, id > 0, mode, "Top-up request", move |api_key| async move {
            topup.get_manual_topup(id, &api_key).await
        })
        .await
    }

    pub async fn mno_history(
        &self,
        session: &Session,
        params: &MnoHistoryParams,
        mode: FetchMode,
    ) -> QueryState<NormalizedList<MnoTopupRecord>> {
        let key = QueryKey::new([tags::MNO_HISTORY])
            .with(params.page.to_string())
            .with(params.per_page.to_string());
        let topup = &self.services.topup;

        self.run(session, key, true, mode, "MNO top-up history", move |api_key| async move {
            topup.list_mno_history(params, &api_key).await
        })
        .await
    }

    pub async fn mno_providers(&self, session: &Session, mode: FetchMode) -> QueryState<Vec<MnoProvider>> {
        let topup = &self.services.topup;
        self.run(
            session,
            QueryKey::new([tags::MNO_PROVIDERS]),
            true,
            mode,
            "MNO providers",
            move |api_key| async move { topup.get_mno_providers(&api_key).await },
        )
        .await
    }

    pub async fn connectors(&self, session: &Session, mode: FetchMode) -> QueryState<Vec<Connector>> {
        let topup = &self.services.topup;
        self.run(
            session,
            QueryKey::new([tags::CONNECTORS]),
            true,
            mode,
            "Connectors",
            move |api_key| async move { topup.available_connectors(&api_key).await },
        )
        .await
    }

    // ---- Dashboard ----

    pub async fn dashboard_summary(
        &self,
        session: &Session,
        mode: FetchMode,
    ) -> QueryState<DashboardSummary> {
        let dashboard = &self.services.dashboard;
        self.run(
            session,
            QueryKey::new([tags::DASHBOARD, tags::DASHBOARD_SUMMARY]),
            true,
            mode,
            "Dashboard",
            move |api_key| async move { dashboard.summary(&api_key).await },
        )
        .await
    }

    pub async fn billing_stats(&self, session: &Session, mode: FetchMode) -> QueryState<BillingStats> {
        let dashboard = &self.services.dashboard;
        self.run(
            session,
            QueryKey::new([tags::DASHBOARD, tags::BILLING_STATS]),
            true,
            mode,
            "Billing statistics",
            move |api_key| async move { dashboard.billing_stats(&api_key).await },
        )
        .await
    }
}

/// Keeps the dashboard's balance figures current after top-ups.
///
/// Reloads go straight through the cache without raising alerts; the operator is looking at the
/// top-up screen, not the dashboard.
pub struct DashboardRefresher {
    queries: Arc<AdminQueries>,
}

impl DashboardRefresher {
    pub fn new(queries: Arc<AdminQueries>) -> Self {
        Self { queries }
    }
}

#[async_trait]
impl BalanceListener for DashboardRefresher {
    fn name(&self) -> &str {
        "dashboard"
    }

    fn regions(&self) -> Vec<QueryKey> {
        vec![
            QueryKey::new([tags::DASHBOARD, tags::DASHBOARD_SUMMARY]),
            QueryKey::new([tags::DASHBOARD, tags::BILLING_STATS]),
        ]
    }

    async fn refresh(&self, session: &Session) -> Result<(), AppError> {
        let api_key = session.require()?;
        let fingerprint = api_key.fingerprint();
        let cache = self.queries.cache();
        let dashboard = &self.queries.services.dashboard;

        let summary = cache
            .refetch(
                QueryKey::new([tags::DASHBOARD, tags::DASHBOARD_SUMMARY]).with(fingerprint.clone()),
                true,
                move || async move { dashboard.summary(api_key).await },
            )
            .await;
        if let QueryState::Error(err) = summary {
            return Err(err);
        }

        let stats = cache
            .refetch(
                QueryKey::new([tags::DASHBOARD, tags::BILLING_STATS]).with(fingerprint),
                true,
                move || async move { dashboard.billing_stats(api_key).await },
            )
            .await;
        match stats {
            QueryState::Error(err) => Err(err),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_error_message_falls_back_when_blank() {
        assert_eq!(
            load_error_message(&AppError::InternalError("  ".to_string())),
            GENERIC_LOAD_ERROR
        );
        let err = AppError::Server {
            status: 422,
            message: "bad tier query".to_string(),
        };
        assert_eq!(load_error_message(&err), "bad tier query");
    }

    #[test]
    fn test_opt_segment() {
        assert_eq!(opt_segment(Some(3)), "3");
        assert_eq!(opt_segment(None::<u32>), "");
    }
}
