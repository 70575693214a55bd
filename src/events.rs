//! Balance-affecting mutation events.
//!
//! Top-ups change an account balance that other screens display. Instead of each mutation
//! knowing every reader, readers register a [`BalanceListener`]. Publishing invalidates every
//! listener's cache regions and then awaits each listener's refresh, so the readers reflect the
//! write before the mutation returns.

use crate::errors::AppError;
use crate::query_cache::{QueryCache, QueryKey};
use crate::session::Session;
use async_trait::async_trait;
use std::sync::{Arc, RwLock};

/// Which mutation moved the balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceChanged {
    ManualTopupCreated,
    MpesaPayment,
    MnoSelfTopup,
}

impl BalanceChanged {
    pub fn as_str(&self) -> &'static str {
        match self {
            BalanceChanged::ManualTopupCreated => "manual-topup-created",
            BalanceChanged::MpesaPayment => "mpesa-payment",
            BalanceChanged::MnoSelfTopup => "mno-self-topup",
        }
    }
}

/// A reader whose cached data depends on the account balance.
#[async_trait]
pub trait BalanceListener: Send + Sync {
    fn name(&self) -> &str;

    /// Cache prefixes to drop when the balance changes.
    fn regions(&self) -> Vec<QueryKey>;

    /// Reloads the reader's data for `session`.
    async fn refresh(&self, session: &Session) -> Result<(), AppError>;
}

#[derive(Default)]
pub struct BalanceEvents {
    listeners: RwLock<Vec<Arc<dyn BalanceListener>>>,
}

impl BalanceEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: Arc<dyn BalanceListener>) {
        tracing::info!("Balance listener registered: {}", listener.name());
        match self.listeners.write() {
            Ok(mut guard) => guard.push(listener),
            Err(poisoned) => poisoned.into_inner().push(listener),
        }
    }

    pub fn listener_count(&self) -> usize {
        match self.listeners.read() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Invalidates every listener region, then awaits each refresh in registration order.
    ///
    /// Refresh failures are logged and do not propagate: the mutation itself already succeeded.
    /// Returns the regions that were invalidated.
    pub async fn publish(
        &self,
        event: BalanceChanged,
        cache: &QueryCache,
        session: &Session,
    ) -> Vec<QueryKey> {
        let listeners: Vec<Arc<dyn BalanceListener>> = match self.listeners.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };

        let mut invalidated = Vec::new();
        for listener in &listeners {
            for region in listener.regions() {
                if let Err(e) = cache.invalidate_prefix(&region) {
                    tracing::error!("Failed to invalidate {} after {}: {}", region, event.as_str(), e);
                    continue;
                }
                invalidated.push(region);
            }
        }

        for listener in &listeners {
            match listener.refresh(session).await {
                Ok(()) => tracing::debug!(
                    "{} refreshed after {}",
                    listener.name(),
                    event.as_str()
                ),
                Err(e) => tracing::warn!(
                    "{} failed to refresh after {}: {}",
                    listener.name(),
                    event.as_str(),
                    e
                ),
            }
        }

        invalidated
    }
}
