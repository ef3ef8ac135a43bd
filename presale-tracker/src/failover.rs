// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Failover across backend API endpoints
//!
//! The status query service may be reachable under several base URLs. Requests
//! go to the current endpoint and rotate to the next one after repeated
//! failures; a failed endpoint is skipped until its cooldown expires.

use crate::error::{ChannelError, ChannelResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::warn;
use url::Url;

/// Configuration for failover behavior
#[derive(Debug, Clone)]
pub struct FailoverConfig {
    /// Attempts against one endpoint before rotating
    pub max_retries_per_endpoint: u32,
    /// Delay between attempts on the same endpoint
    pub retry_delay: Duration,
    /// How long a failed endpoint is skipped
    pub cooldown_period: Duration,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            max_retries_per_endpoint: 2,
            retry_delay: Duration::from_millis(500),
            cooldown_period: Duration::from_secs(60),
        }
    }
}

/// Ordered set of base URLs with a rotating cursor
#[derive(Debug)]
pub struct FailoverEndpoints {
    endpoints: Vec<String>,
    current_index: AtomicUsize,
    failed: RwLock<HashMap<usize, Instant>>,
    config: FailoverConfig,
}

impl FailoverEndpoints {
    pub fn new(endpoints: Vec<String>) -> ChannelResult<Self> {
        Self::with_config(endpoints, FailoverConfig::default())
    }

    /// Validate and normalise endpoints (trailing slashes dropped)
    pub fn with_config(endpoints: Vec<String>, config: FailoverConfig) -> ChannelResult<Self> {
        let mut normalized = Vec::with_capacity(endpoints.len());
        for raw in endpoints {
            let trimmed = raw.trim().trim_end_matches('/').to_string();
            if trimmed.is_empty() {
                continue;
            }
            let parsed = Url::parse(&trimmed).map_err(|e| ChannelError::InvalidEndpoint {
                url: trimmed.clone(),
                reason: e.to_string(),
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ChannelError::InvalidEndpoint {
                    url: trimmed,
                    reason: format!("unsupported scheme {}", parsed.scheme()),
                });
            }
            normalized.push(trimmed);
        }
        if normalized.is_empty() {
            return Err(ChannelError::NoEndpoints);
        }
        Ok(Self {
            endpoints: normalized,
            current_index: AtomicUsize::new(0),
            failed: RwLock::new(HashMap::new()),
            config,
        })
    }

    pub fn current_endpoint(&self) -> &str {
        let idx = self.current_index.load(Ordering::SeqCst);
        &self.endpoints[idx % self.endpoints.len()]
    }

    pub fn all_endpoints(&self) -> &[String] {
        &self.endpoints
    }

    /// Mark the current endpoint failed and move to the next usable one
    pub async fn report_failure(&self) {
        let current = self.current_index.load(Ordering::SeqCst);
        let len = self.endpoints.len();
        let now = Instant::now();

        let mut failed = self.failed.write().await;
        failed.insert(current, now);

        for offset in 1..=len {
            let candidate = (current + offset) % len;
            let cooling = failed
                .get(&candidate)
                .is_some_and(|at| now.duration_since(*at) < self.config.cooldown_period);
            if cooling {
                continue;
            }
            if self
                .current_index
                .compare_exchange(current, candidate, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
                && candidate != current
            {
                warn!(
                    "[Failover] Switched from {} to {}",
                    self.endpoints[current], self.endpoints[candidate]
                );
            }
            return;
        }

        let next = (current + 1) % len;
        self.current_index.store(next, Ordering::SeqCst);
        if next != current {
            warn!(
                "[Failover] All endpoints cooling down, rotating to {}",
                self.endpoints[next]
            );
        }
    }

    pub async fn report_success(&self) {
        let current = self.current_index.load(Ordering::SeqCst);
        self.failed.write().await.remove(&current);
    }

    /// Run a request against the current endpoint, retrying and rotating on
    /// failure. Decode errors are not retried: another endpoint would return
    /// the same body.
    pub async fn with_failover<F, Fut, T>(&self, mut request: F) -> ChannelResult<T>
    where
        F: FnMut(&str) -> Fut,
        Fut: std::future::Future<Output = ChannelResult<T>>,
    {
        let retries = self.config.max_retries_per_endpoint.max(1) as usize;
        let total_attempts = self.endpoints.len() * retries;
        let mut last_error = None;

        for attempt in 0..total_attempts {
            let endpoint = self.current_endpoint().to_string();
            match request(&endpoint).await {
                Ok(result) => {
                    self.report_success().await;
                    return Ok(result);
                }
                Err(e @ ChannelError::Decode(_)) => return Err(e),
                Err(e) => {
                    warn!(
                        "[Failover] Request to {} failed (attempt {}/{}): {}",
                        endpoint,
                        attempt + 1,
                        total_attempts,
                        e
                    );
                    last_error = Some(e);
                    if (attempt + 1) % retries == 0 {
                        self.report_failure().await;
                    } else {
                        tokio::time::sleep(self.config.retry_delay).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or(ChannelError::NoEndpoints))
    }
}
