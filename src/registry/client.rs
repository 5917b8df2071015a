// Registry client - queries the remote plugin catalog over HTTPS
//
// Every query goes cache-first, then through the retry driver. The base
// URL is validated against the SSRF policy exactly once, in the
// constructor; a client that exists is a client whose target passed.

use super::cache::TtlCache;
use super::policy::validate_registry_url;
use super::types::{PluginMetadata, QueryFilters, RegistryMetadata};
use crate::error::RegistryError;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Registry client configuration
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Base URL for the registry API
    pub base_url: String,

    /// Per-request transport timeout in seconds
    pub timeout_secs: u64,

    /// Total attempts per query (first try included)
    pub max_attempts: u32,

    /// Initial backoff delay, doubled after each failed attempt
    pub backoff_base: Duration,

    /// Maximum entries per cache before eviction kicks in
    pub max_cache_entries: usize,

    /// Cap on idle pooled connections per host
    pub max_idle_connections: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_url: "https://registry.devstrap.dev".to_string(),
            timeout_secs: 30,
            max_attempts: 3,
            backoff_base: Duration::from_millis(500),
            max_cache_entries: 256,
            max_idle_connections: 4,
        }
    }
}

const PLUGIN_LIST_TTL: Duration = Duration::from_secs(60 * 60);
const PLUGIN_ENTRY_TTL: Duration = Duration::from_secs(60 * 60);
const CATALOG_TTL: Duration = Duration::from_secs(6 * 60 * 60);

/// Client for the devstrap plugin registry
///
/// Provides platform-filtered plugin listings, single-plugin metadata,
/// filtered catalog queries, and catalog-wide metadata, each behind a
/// bounded in-process cache.
pub struct RegistryClient {
    http: reqwest::Client,
    config: RegistryConfig,
    list_cache: TtlCache<Vec<PluginMetadata>>,
    plugin_cache: TtlCache<PluginMetadata>,
    catalog_cache: TtlCache<RegistryMetadata>,
}

impl RegistryClient {
    /// Create a client for the default registry.
    pub fn new() -> Result<Self, RegistryError> {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a client for a specific registry configuration.
    ///
    /// Fails fast if the base URL does not pass the allowlist policy.
    pub fn with_config(config: RegistryConfig) -> Result<Self, RegistryError> {
        let validated = validate_registry_url(&config.base_url)?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .min_tls_version(reqwest::tls::Version::TLS_1_2)
            .pool_max_idle_per_host(config.max_idle_connections)
            .build()
            .map_err(|e| RegistryError::Transport {
                url: validated.to_string(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            list_cache: TtlCache::new(PLUGIN_LIST_TTL, config.max_cache_entries),
            plugin_cache: TtlCache::new(PLUGIN_ENTRY_TTL, config.max_cache_entries),
            catalog_cache: TtlCache::new(CATALOG_TTL, config.max_cache_entries),
            config,
        })
    }

    /// Plugins available for a platform, from cache or the registry.
    pub async fn available_plugins(
        &self,
        os: &str,
        distribution: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<PluginMetadata>, RegistryError> {
        let key = format!("list:{os}:{distribution}");
        if let Some(cached) = self.list_cache.get(&key) {
            debug!(os, distribution, "plugin list served from cache");
            return Ok(cached);
        }

        let url = format!(
            "{}/plugins?os={}&distribution={}",
            self.base_url(),
            urlencoding::encode(os),
            urlencoding::encode(distribution)
        );
        let plugins: Vec<PluginMetadata> = self
            .with_retries("list plugins", cancel, || self.get_json(url.clone()))
            .await?;

        self.list_cache.insert(key, plugins.clone());
        Ok(plugins)
    }

    /// Metadata for a single plugin by name.
    pub async fn plugin_metadata(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<PluginMetadata, RegistryError> {
        if let Some(cached) = self.plugin_cache.get(name) {
            debug!(plugin = name, "plugin metadata served from cache");
            return Ok(cached);
        }

        let url = format!("{}/plugins/{}", self.base_url(), urlencoding::encode(name));
        let plugin: PluginMetadata = self
            .with_retries("fetch plugin metadata", cancel, || {
                let url = url.clone();
                let name = name.to_string();
                async move {
                    match self.get_json::<PluginMetadata>(url).await {
                        Err(RegistryError::NotFound(_)) => {
                            Err(RegistryError::NotFound(format!("plugin '{name}'")))
                        }
                        other => other,
                    }
                }
            })
            .await?;

        self.plugin_cache.insert(name, plugin.clone());
        Ok(plugin)
    }

    /// Filtered catalog query.
    pub async fn query(
        &self,
        filters: &QueryFilters,
        cancel: &CancellationToken,
    ) -> Result<Vec<PluginMetadata>, RegistryError> {
        let key = filters.cache_key();
        if let Some(cached) = self.list_cache.get(&key) {
            debug!("filtered query served from cache");
            return Ok(cached);
        }

        let url = format!(
            "{}/plugins/query?{}",
            self.base_url(),
            filters.to_query_string()
        );
        let plugins: Vec<PluginMetadata> = self
            .with_retries("query plugins", cancel, || self.get_json(url.clone()))
            .await?;

        self.list_cache.insert(key, plugins.clone());
        Ok(plugins)
    }

    /// Catalog-wide registry metadata.
    pub async fn catalog_metadata(
        &self,
        cancel: &CancellationToken,
    ) -> Result<RegistryMetadata, RegistryError> {
        const KEY: &str = "catalog";
        if let Some(cached) = self.catalog_cache.get(KEY) {
            debug!("catalog metadata served from cache");
            return Ok(cached);
        }

        let url = format!("{}/metadata", self.base_url());
        let metadata: RegistryMetadata = self
            .with_retries("fetch catalog metadata", cancel, || self.get_json(url.clone()))
            .await?;

        self.catalog_cache.insert(KEY, metadata.clone());
        Ok(metadata)
    }

    /// Drop every cached entry.
    pub fn clear_cache(&self) {
        self.list_cache.clear();
        self.plugin_cache.clear();
        self.catalog_cache.clear();
    }

    /// The registry configuration.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    /// Retry driver: fixed attempt cap, exponential backoff, immediate
    /// abort for non-retryable errors, cancellation honored during the
    /// backoff wait (never after a sleep completes first).
    async fn with_retries<T, F, Fut>(
        &self,
        what: &str,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, RegistryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RegistryError>>,
    {
        let mut delay = self.config.backoff_base;
        let attempts = self.config.max_attempts.max(1);

        for attempt in 1..=attempts {
            if cancel.is_cancelled() {
                return Err(RegistryError::Cancelled);
            }

            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !err.is_retryable() || attempt == attempts {
                return Err(err);
            }

            warn!(
                operation = what,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "registry request failed, retrying"
            );
            tokio::select! {
                _ = cancel.cancelled() => return Err(RegistryError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
            delay *= 2;
        }

        // max_attempts >= 1, so the loop always returns before this.
        Err(RegistryError::Cancelled)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: String) -> Result<T, RegistryError> {
        let response =
            self.http
                .get(&url)
                .send()
                .await
                .map_err(|e| classify_reqwest_error(&url, e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(RegistryError::NotFound(url));
        }
        if !status.is_success() {
            return Err(RegistryError::Status {
                status: status.as_u16(),
                url,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| RegistryError::InvalidResponse {
                url,
                reason: e.to_string(),
            })
    }
}

/// Map a reqwest failure onto the taxonomy: timeouts and connect/DNS
/// failures are transient, body/decode failures are not.
fn classify_reqwest_error(url: &str, err: reqwest::Error) -> RegistryError {
    if err.is_timeout() || err.is_connect() {
        RegistryError::Transport {
            url: url.to_string(),
            reason: err.to_string(),
        }
    } else {
        RegistryError::InvalidResponse {
            url: url.to_string(),
            reason: err.to_string(),
        }
    }
}
