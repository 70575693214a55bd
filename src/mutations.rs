//! Write layer.
//!
//! Every mutation checks the credential, calls its service, and on success invalidates the
//! cache prefixes it affects before raising a success alert. Top-ups additionally publish a
//! [`BalanceChanged`] event so balance readers reload before the call returns.

use crate::errors::AppError;
use crate::events::{BalanceChanged, BalanceEvents};
use crate::models::*;
use crate::queries::tags;
use crate::query_cache::{QueryCache, QueryKey};
use crate::services::BillingServices;
use crate::session::{ApiKey, Session};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

pub struct AdminMutations {
    services: BillingServices,
    cache: QueryCache,
    events: Arc<BalanceEvents>,
}

impl AdminMutations {
    pub fn new(services: BillingServices, cache: QueryCache, events: Arc<BalanceEvents>) -> Self {
        Self {
            services,
            cache,
            events,
        }
    }

    pub fn events(&self) -> &BalanceEvents {
        &self.events
    }

    async fn execute<T, F, Fut>(
        &self,
        session: &Session,
        action: &str,
        success: &str,
        invalidate: &[QueryKey],
        balance: Option<BalanceChanged>,
        op: F,
    ) -> Result<T, AppError>
    where
        F: FnOnce(ApiKey) -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let api_key = match session.require() {
            Ok(key) => key.clone(),
            Err(e) => {
                session.alerts().error(&e.user_message());
                return Err(e);
            }
        };

        match op(api_key).await {
            Ok(value) => {
                for prefix in invalidate {
                    if let Err(e) = self.cache.invalidate_prefix(prefix) {
                        tracing::error!("{}: failed to invalidate {}: {}", action, prefix, e);
                    }
                }
                if let Some(event) = balance {
                    self.events.publish(event, &self.cache, session).await;
                }
                tracing::info!("✓ {} succeeded", action);
                session.alerts().success(success);
                Ok(value)
            }
            Err(e) => {
                tracing::error!("{} failed: {}", action, e);
                session.alerts().error(&e.user_message());
                Err(e)
            }
        }
    }

    // ---- KYB ----

    pub async fn approve_kyb(&self, session: &Session, input: &ApproveKybInput) -> Result<Value, AppError> {
        let kyb = &self.services.kyb;
        self.execute(
            session,
            "approve KYB",
            "KYB request approved successfully",
            &[QueryKey::new([tags::ADMIN_KYB])],
            None,
            move |api_key| async move { kyb.approve(&input.kyb_id, &input.notes, &api_key).await },
        )
        .await
    }

    pub async fn reject_kyb(&self, session: &Session, input: &RejectKybInput) -> Result<Value, AppError> {
        let kyb = &self.services.kyb;
        self.execute(
            session,
            "reject KYB",
            "KYB request rejected",
            &[QueryKey::new([tags::ADMIN_KYB])],
            None,
            move |api_key| async move { kyb.reject(&input.kyb_id, &input.reason, &api_key).await },
        )
        .await
    }

    // ---- Pricing ----

    pub async fn update_pricing_config(
        &self,
        session: &Session,
        update: &PricingConfigUpdate,
    ) -> Result<Value, AppError> {
        let pricing = &self.services.pricing;
        self.execute(
            session,
            "update pricing config",
            "Pricing configuration updated successfully",
            &[QueryKey::new([tags::PRICING_CONFIG])],
            None,
            move |api_key| async move { pricing.update_config(update, &api_key).await },
        )
        .await
    }

    pub async fn create_tier(&self, session: &Session, tier: &TierInput) -> Result<Value, AppError> {
        let pricing = &self.services.pricing;
        self.execute(
            session,
            "create pricing tier",
            "Pricing tier created successfully",
            &[QueryKey::new([tags::PRICING_TIERS])],
            None,
            move |api_key| async move { pricing.create_tier(tier, &api_key).await },
        )
        .await
    }

    pub async fn update_tier(
        &self,
        session: &Session,
        id: u64,
        tier: &TierInput,
    ) -> Result<Value, AppError> {
        let pricing = &self.services.pricing;
        self.execute(
            session,
            "update pricing tier",
            "Pricing tier updated successfully",
            &[QueryKey::new([tags::PRICING_TIERS])],
            None,
            move |api_key| async move { pricing.update_tier(id, tier, &api_key).await },
        )
        .await
    }

    pub async fn delete_tier(&self, session: &Session, id: u64) -> Result<Value, AppError> {
        let pricing = &self.services.pricing;
        self.execute(
            session,
            "delete pricing tier",
            "Pricing tier deleted successfully",
            &[QueryKey::new([tags::PRICING_TIERS])],
            None,
            move |api_key| async move { pricing.delete_tier(id, &api_key).await },
        )
        .await
    }

    pub async fn toggle_tier(
        &self,
        session: &Session,
        id: u64,
        is_active: bool,
    ) -> Result<Value, AppError> {
        let pricing = &self.services.pricing;
        let success = if is_active {
            "Pricing tier activated"
        } else {
            "Pricing tier deactivated"
        };
        self.execute(
            session,
            "toggle pricing tier",
            success,
            &[QueryKey::new([tags::PRICING_TIERS])],
            None,
            move |api_key| async move { pricing.toggle_tier(id, is_active, &api_key).await },
        )
        .await
    }

    // ---- Top-up ----

    pub async fn create_manual_topup(
        &self,
        session: &Session,
        input: &ManualTopupInput,
    ) -> Result<Value, AppError> {
        let topup = &self.services.topup;
        self.execute(
            session,
            "create manual top-up",
            "Top-up request submitted successfully",
            &[
                QueryKey::new([tags::MANUAL_TOPUPS]),
                QueryKey::new([tags::MANUAL_TOPUP_DETAILS]),
            ],
            Some(BalanceChanged::ManualTopupCreated),
            move |api_key| async move { topup.create_manual_topup(input, &api_key).await },
        )
        .await
    }

    pub async fn mpesa_payment(
        &self,
        session: &Session,
        input: &MpesaPaymentInput,
    ) -> Result<Value, AppError> {
        let topup = &self.services.topup;
        self.execute(
            session,
            "MPESA payment",
            "MPESA payment initiated. Check your phone to complete the payment.",
            &[],
            Some(BalanceChanged::MpesaPayment),
            move |api_key| async move { topup.mpesa_payment(input, &api_key).await },
        )
        .await
    }

    pub async fn mno_self_topup(
        &self,
        session: &Session,
        input: &MnoSelfTopupInput,
    ) -> Result<Value, AppError> {
        let topup = &self.services.topup;
        self.execute(
            session,
            "MNO self top-up",
            "MNO top-up submitted successfully",
            &[QueryKey::new([tags::MNO_HISTORY])],
            Some(BalanceChanged::MnoSelfTopup),
            move |api_key| async move { topup.mno_self_topup(input, &api_key).await },
        )
        .await
    }
}
