use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    pub billing_api_base_url: String,
    pub billing_api_timeout_secs: u64,
    pub query_cache_ttl_secs: u64,
    pub query_cache_capacity: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            billing_api_base_url: std::env::var("BILLING_API_BASE_URL")
                .map_err(|_| anyhow::anyhow!("BILLING_API_BASE_URL environment variable required"))
                .and_then(|raw| {
                    let trimmed = raw.trim().trim_end_matches('/').to_string();
                    if trimmed.is_empty() {
                        anyhow::bail!("BILLING_API_BASE_URL cannot be empty");
                    }
                    let parsed = url::Url::parse(&trimmed).map_err(|e| {
                        anyhow::anyhow!("BILLING_API_BASE_URL is not a valid URL: {}", e)
                    })?;
                    if parsed.scheme() != "http" && parsed.scheme() != "https" {
                        anyhow::bail!("BILLING_API_BASE_URL must start with http:// or https://");
                    }
                    Ok(trimmed)
                })?,
            billing_api_timeout_secs: parse_positive("BILLING_API_TIMEOUT_SECS", 30)?,
            query_cache_ttl_secs: parse_positive("QUERY_CACHE_TTL_SECS", 300)?,
            query_cache_capacity: parse_positive("QUERY_CACHE_CAPACITY", 10_000)?,
        };

        tracing::info!("Configuration loaded successfully");
        tracing::debug!("Billing API Base URL: {}", config.billing_api_base_url);
        tracing::debug!(
            "Query cache: ttl={}s capacity={}",
            config.query_cache_ttl_secs,
            config.query_cache_capacity
        );
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }

    /// Configuration pointing at `base_url` with every other value at its default.
    ///
    /// Used by tests and tools that talk to a mock backend.
    pub fn for_base_url(base_url: impl Into<String>) -> Self {
        Self {
            port: 3000,
            billing_api_base_url: base_url.into().trim_end_matches('/').to_string(),
            billing_api_timeout_secs: 30,
            query_cache_ttl_secs: 300,
            query_cache_capacity: 10_000,
        }
    }
}

fn parse_positive(name: &str, default: u64) -> anyhow::Result<u64> {
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => {
            let value: u64 = raw
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("{} must be a positive integer", name))?;
            if value == 0 {
                anyhow::bail!("{} must be greater than zero", name);
            }
            Ok(value)
        }
        _ => Ok(default),
    }
}
