//! Process-wide query cache.
//!
//! Reads are cached under a [`QueryKey`] of `[resource tag, params in stable order, key
//! fingerprint]`. Concurrent loads of the same key share one backend request. Writes invalidate
//! whole prefixes (e.g. every `admin-kyb` query) rather than individual records.

use crate::config::Config;
use crate::errors::AppError;
use moka::future::Cache;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

type Entry = Arc<dyn Any + Send + Sync>;

/// Ordered cache key segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Appends one segment, e.g. a parameter or the credential fingerprint.
    pub fn with(mut self, segment: impl Into<String>) -> Self {
        self.0.push(segment.into());
        self
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(","))
    }
}

/// Result of a read, mirroring the flags a screen renders from.
#[derive(Debug, Clone)]
pub enum QueryState<T> {
    /// The read was not attempted (no credential, or its extra condition was false).
    Disabled,
    Success { data: Arc<T>, from_cache: bool },
    Error(AppError),
}

impl<T> QueryState<T> {
    pub fn is_disabled(&self) -> bool {
        matches!(self, QueryState::Disabled)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, QueryState::Success { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, QueryState::Error(_))
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            QueryState::Success { data, .. } => Some(data.as_ref()),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&AppError> {
        match self {
            QueryState::Error(err) => Some(err),
            _ => None,
        }
    }

    pub fn map<U, F>(self, f: F) -> QueryState<U>
    where
        F: FnOnce(&T) -> U,
    {
        match self {
            QueryState::Disabled => QueryState::Disabled,
            QueryState::Success { data, from_cache } => QueryState::Success {
                data: Arc::new(f(data.as_ref())),
                from_cache,
            },
            QueryState::Error(err) => QueryState::Error(err),
        }
    }
}

#[derive(Clone)]
pub struct QueryCache {
    entries: Cache<QueryKey, Entry>,
}

impl QueryCache {
    /// Creates a cache with the configured time-to-live and capacity.
    pub fn new(config: &Config) -> Self {
        Self::with_limits(
            Duration::from_secs(config.query_cache_ttl_secs),
            config.query_cache_capacity,
        )
    }

    pub fn with_limits(ttl: Duration, capacity: u64) -> Self {
        let entries = Cache::builder()
            .time_to_live(ttl)
            .max_capacity(capacity)
            .support_invalidation_closures()
            .build();
        Self { entries }
    }

    /// Loads `key` through the cache.
    ///
    /// When `enabled` is false the loader is never called. Concurrent calls for the same key
    /// share one load; failed loads are not cached.
    pub async fn fetch<T, F, Fut>(&self, key: QueryKey, enabled: bool, loader: F) -> QueryState<T>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        if !enabled {
            tracing::debug!("Query {} disabled", key);
            return QueryState::Disabled;
        }

        if let Some(entry) = self.entries.get(&key).await {
            if let Ok(data) = entry.downcast::<T>() {
                tracing::debug!("Query cache HIT for {}", key);
                return QueryState::Success {
                    data,
                    from_cache: true,
                };
            }
            tracing::warn!("Query cache entry for {} has an unexpected type, reloading", key);
            self.entries.invalidate(&key).await;
        }

        tracing::debug!("Query cache MISS for {}", key);
        let result = self
            .entries
            .try_get_with(key.clone(), async move {
                loader().await.map(|value| Arc::new(value) as Entry)
            })
            .await;

        match result {
            Ok(entry) => match entry.downcast::<T>() {
                Ok(data) => QueryState::Success {
                    data,
                    from_cache: false,
                },
                Err(_) => QueryState::Error(AppError::InternalError(format!(
                    "Query {} resolved to an unexpected type",
                    key
                ))),
            },
            Err(err) => QueryState::Error(err.as_ref().clone()),
        }
    }

    /// Drops `key` and loads it again.
    pub async fn refetch<T, F, Fut>(&self, key: QueryKey, enabled: bool, loader: F) -> QueryState<T>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        if enabled {
            self.invalidate_key(&key).await;
        }
        self.fetch(key, enabled, loader).await
    }

    pub async fn invalidate_key(&self, key: &QueryKey) {
        self.entries.invalidate(key).await;
    }

    /// Invalidates every entry whose key starts with `prefix`.
    pub fn invalidate_prefix(&self, prefix: &QueryKey) -> Result<(), AppError> {
        let prefix = prefix.clone();
        tracing::debug!("Invalidating queries under {}", prefix);
        self.entries
            .invalidate_entries_if(move |key, _| key.starts_with(&prefix))
            .map(|_| ())
            .map_err(|e| AppError::InternalError(format!("Failed to invalidate queries: {}", e)))
    }

    /// Whether a live entry exists for `key`.
    pub async fn contains(&self, key: &QueryKey) -> bool {
        self.entries.get(key).await.is_some()
    }
}
