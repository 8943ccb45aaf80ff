// ─── Manifest Source ───
// Where manifest text comes from, and an optional per-run cache for it.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::core::downloader::RetryPolicy;
use crate::core::error::{InstallerError, InstallerResult};
use crate::core::http::is_retryable_status;

#[async_trait]
pub trait ManifestSource: Send + Sync {
    /// Identifier used for logs and cache keys.
    fn location(&self) -> &str;

    /// Fetch the raw manifest text.
    async fn fetch(&self) -> InstallerResult<String>;
}

/// Cache collaborator handed to the resolver for the duration of one run.
///
/// Nothing here is global: a fresh run gets a fresh cache (or none).
pub trait ManifestCache: Send + Sync {
    fn get(&self, location: &str) -> Option<String>;
    fn put(&self, location: &str, body: &str);
}

/// Always misses.
#[derive(Debug, Default)]
pub struct NoManifestCache;

impl ManifestCache for NoManifestCache {
    fn get(&self, _location: &str) -> Option<String> {
        None
    }

    fn put(&self, _location: &str, _body: &str) {}
}

/// In-memory cache, for callers that resolve more than once per run.
#[derive(Debug, Default)]
pub struct MemoryManifestCache {
    bodies: Mutex<HashMap<String, String>>,
}

impl ManifestCache for MemoryManifestCache {
    fn get(&self, location: &str) -> Option<String> {
        self.bodies.lock().ok()?.get(location).cloned()
    }

    fn put(&self, location: &str, body: &str) {
        if let Ok(mut bodies) = self.bodies.lock() {
            bodies.insert(location.to_string(), body.to_string());
        }
    }
}

/// HTTP(S) manifest endpoint with retry + backoff on transient failures.
pub struct HttpManifestSource {
    client: Client,
    url: String,
    retry: RetryPolicy,
}

impl HttpManifestSource {
    pub fn new(client: Client, url: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            client,
            url: url.into(),
            retry,
        }
    }

    async fn fetch_once(&self) -> Result<String, (bool, String)> {
        let send = self.client.get(&self.url).send();
        let response = tokio::time::timeout(self.retry.attempt_timeout, send)
            .await
            .map_err(|_| (true, "timed out".to_string()))?
            .map_err(|e| (true, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err((
                is_retryable_status(status.as_u16()),
                format!("HTTP {}", status.as_u16()),
            ));
        }

        tokio::time::timeout(self.retry.attempt_timeout, response.text())
            .await
            .map_err(|_| (true, "timed out reading body".to_string()))?
            .map_err(|e| (true, e.to_string()))
    }
}

#[async_trait]
impl ManifestSource for HttpManifestSource {
    fn location(&self) -> &str {
        &self.url
    }

    async fn fetch(&self) -> InstallerResult<String> {
        info!("Fetching loader manifest from {}", self.url);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.fetch_once().await {
                Ok(body) => {
                    debug!("Manifest fetched ({} bytes) on attempt {}", body.len(), attempt);
                    return Ok(body);
                }
                Err((retryable, reason)) => {
                    if !retryable || attempt >= self.retry.max_attempts {
                        return Err(InstallerError::ManifestUnavailable {
                            url: self.url.clone(),
                            reason: format!("{reason} after {attempt} attempt(s)"),
                        });
                    }
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(
                        "Manifest fetch attempt {} failed ({}); retrying in {:?}",
                        attempt, reason, delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// Fixed manifest text, for offline use and tests.
pub struct StaticManifestSource {
    location: String,
    body: String,
}

impl StaticManifestSource {
    pub fn new(location: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            body: body.into(),
        }
    }
}

#[async_trait]
impl ManifestSource for StaticManifestSource {
    fn location(&self) -> &str {
        &self.location
    }

    async fn fetch(&self) -> InstallerResult<String> {
        Ok(self.body.clone())
    }
}
