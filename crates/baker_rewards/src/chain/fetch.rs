//! HTTP client shared by the node and mirror backends: rate limiting, retries,
//! optional SQLite cache for level-pinned responses.

use crate::chain::cache::Cache;
use crate::chain::port::TransportError;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{debug, warn};
use url::Url;

const RATE_LIMIT_MS: u64 = 100;
const MAX_RETRIES: u32 = 3;
const RETRY_BACKOFF_MS: u64 = 500;
const TIMEOUT_SECS: u64 = 30;

#[derive(Clone, Debug)]
pub struct FetchConfig {
    pub rate_limit_ms: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub timeout_secs: u64,
    pub offline: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            rate_limit_ms: RATE_LIMIT_MS,
            max_retries: MAX_RETRIES,
            retry_backoff_ms: RETRY_BACKOFF_MS,
            timeout_secs: TIMEOUT_SECS,
            offline: false,
        }
    }
}

/// Whether a response may be served from / stored in the cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Caching {
    /// Response is pinned to a historical level and never changes.
    Pinned,
    /// Response moves with the chain (head). Always fetched when online; the
    /// last copy is served when offline.
    Live,
}

/// Accept `host:port`, `http://host:port` or `https://host/prefix/`; return the
/// URL without trailing slash.
pub fn normalize_base_url(raw: &str) -> Result<String, TransportError> {
    let trimmed = raw.trim();
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    };
    let url = Url::parse(&with_scheme)
        .map_err(|e| TransportError::Decode(format!("invalid base url {}: {}", raw, e)))?;
    if url.host_str().is_none() {
        return Err(TransportError::Decode(format!("base url {} has no host", raw)));
    }
    Ok(url.as_str().trim_end_matches('/').to_string())
}

/// Fetcher with rate limiting and optional SQLite cache.
pub struct Fetcher {
    config: FetchConfig,
    client: Option<reqwest::Client>,
    cache: Option<Arc<Cache>>,
    last_request: Mutex<Option<OffsetDateTime>>,
    request_count: AtomicU64,
}

impl Fetcher {
    pub fn new(config: FetchConfig, cache: Option<Arc<Cache>>) -> Result<Self, TransportError> {
        let client = if config.offline {
            None
        } else {
            Some(
                reqwest::Client::builder()
                    .use_rustls_tls()
                    .timeout(Duration::from_secs(config.timeout_secs))
                    .build()?,
            )
        };
        Ok(Self {
            config,
            client,
            cache,
            last_request: Mutex::new(None),
            request_count: AtomicU64::new(0),
        })
    }

    async fn rate_limit(&self) {
        let sleep_ms = {
            let prev = *self
                .last_request
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            match prev {
                Some(prev) => {
                    let elapsed = (OffsetDateTime::now_utc() - prev).whole_milliseconds();
                    let need = self.config.rate_limit_ms as i128;
                    (need - elapsed).max(0) as u64
                }
                None => 0,
            }
        };
        if sleep_ms > 0 {
            tokio::time::sleep(Duration::from_millis(sleep_ms)).await;
        }
        *self
            .last_request
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(OffsetDateTime::now_utc());
    }

    /// GET `base_url + path` and parse the body as JSON.
    pub async fn get_json(
        &self,
        base_url: &str,
        path: &str,
        caching: Caching,
    ) -> Result<Value, TransportError> {
        let body = self.get_text(base_url, path, caching).await?;
        serde_json::from_str(&body)
            .map_err(|e| TransportError::Decode(format!("{}: {}", path, e)))
    }

    async fn get_text(
        &self,
        base_url: &str,
        path: &str,
        caching: Caching,
    ) -> Result<String, TransportError> {
        let (cache_key, serve_cached) = match caching {
            Caching::Pinned => (Cache::key_for(base_url, path), true),
            Caching::Live => (Cache::latest_key_for(base_url, path), self.config.offline),
        };
        let cache = self.cache.as_deref();
        if let Some(cache) = cache.filter(|_| serve_cached) {
            if let Some(cached) = cache.get(&cache_key)? {
                debug!(%path, ?caching, "cache hit");
                return Ok(cached);
            }
        }
        if self.config.offline {
            return Err(TransportError::OfflineMiss);
        }

        let client = self.client.as_ref().ok_or(TransportError::OfflineMiss)?;
        self.rate_limit().await;

        let url = format!("{}{}", base_url.trim_end_matches('/'), path);
        debug!(%url, "request");
        let mut last_err = None;
        for attempt in 0..=self.config.max_retries {
            match client.get(&url).send().await {
                Ok(r) => {
                    let status = r.status();
                    let body = r.text().await?;
                    if status.is_client_error() {
                        // 4xx will not improve on retry (e.g. pruned context on a rolling node).
                        return Err(TransportError::Api(status.as_u16(), body));
                    }
                    if !status.is_success() {
                        last_err = Some(TransportError::Api(status.as_u16(), body));
                        self.backoff(attempt).await;
                        continue;
                    }
                    self.request_count.fetch_add(1, Ordering::Relaxed);
                    if let Some(cache) = cache {
                        if let Err(e) = cache.set(&cache_key, base_url, &body) {
                            warn!(error = %e, "cache write failed");
                        }
                    }
                    return Ok(body);
                }
                Err(e) => {
                    last_err = Some(TransportError::Request(e));
                    self.backoff(attempt).await;
                }
            }
        }
        Err(last_err.unwrap_or(TransportError::Api(0, "unknown".to_string())))
    }

    async fn backoff(&self, attempt: u32) {
        if attempt < self.config.max_retries {
            let ms = self.config.retry_backoff_ms * (1 << attempt);
            warn!(attempt, ms, "retry after error");
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn base_url_gets_scheme_and_loses_slash() {
        assert_eq!(
            normalize_base_url("127.0.0.1:8732").unwrap(),
            "http://127.0.0.1:8732"
        );
        assert_eq!(
            normalize_base_url("https://mainnet.tezrpc.me/").unwrap(),
            "https://mainnet.tezrpc.me"
        );
        assert!(normalize_base_url("http://").is_err());
    }

    #[tokio::test]
    async fn offline_serves_last_stored_head() {
        let tmp = NamedTempFile::new().unwrap();
        let cache = Arc::new(Cache::open(tmp.path()).unwrap());
        let base = "http://node";
        let path = "/chains/main/blocks/head";
        cache
            .set(
                &Cache::latest_key_for(base, path),
                base,
                r#"{"metadata":{"level":{"level":450000,"cycle":109}}}"#,
            )
            .unwrap();
        let config = FetchConfig {
            offline: true,
            ..Default::default()
        };
        let fetcher = Fetcher::new(config, Some(cache)).unwrap();

        let head = fetcher.get_json(base, path, Caching::Live).await.unwrap();
        assert_eq!(head["metadata"]["level"]["level"], 450000);
        let pinned = fetcher.get_json(base, path, Caching::Pinned).await;
        assert!(matches!(pinned, Err(TransportError::OfflineMiss)));
    }

    #[tokio::test]
    async fn offline_serves_pinned_from_cache_only() {
        let tmp = NamedTempFile::new().unwrap();
        let cache = Arc::new(Cache::open(tmp.path()).unwrap());
        let base = "http://node";
        let path = "/chains/main/blocks/10/context/contracts/tz1a";
        cache
            .set(&Cache::key_for(base, path), base, r#"{"balance":"7"}"#)
            .unwrap();
        let config = FetchConfig {
            offline: true,
            ..Default::default()
        };
        let fetcher = Fetcher::new(config, Some(cache)).unwrap();

        let hit = fetcher.get_json(base, path, Caching::Pinned).await.unwrap();
        assert_eq!(hit["balance"], "7");

        let live = fetcher.get_json(base, path, Caching::Live).await;
        assert!(matches!(live, Err(TransportError::OfflineMiss)));
        assert_eq!(fetcher.request_count(), 0);
    }
}
