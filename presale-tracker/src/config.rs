// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Tracker configuration

use crate::failover::FailoverConfig;
use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

static ENV_VAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("static env var pattern")
});

/// Complete tracker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Pull fallback period, seconds
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Query the status service once as soon as tracking starts
    #[serde(default = "default_initial_fetch")]
    pub initial_fetch: bool,
    /// Caller-level give-up timeout, seconds
    #[serde(default = "default_give_up_after_secs")]
    pub give_up_after_secs: u64,
    #[serde(default)]
    pub push: PushConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub wallets: WalletConfig,
}

fn default_poll_interval_secs() -> u64 {
    15
}

fn default_initial_fetch() -> bool {
    true
}

fn default_give_up_after_secs() -> u64 {
    20 * 60
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            initial_fetch: default_initial_fetch(),
            give_up_after_secs: default_give_up_after_secs(),
            push: PushConfig::default(),
            api: ApiConfig::default(),
            wallets: WalletConfig::default(),
        }
    }
}

impl TrackerConfig {
    /// Load configuration from YAML file with environment variable substitution
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read tracker config file: {:?}", path))?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let contents = substitute_env_vars(contents);
        let config: TrackerConfig =
            serde_yaml::from_str(&contents).context("Failed to parse tracker config YAML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_secs == 0 {
            return Err(anyhow!("poll_interval_secs must be greater than zero"));
        }
        if self.push.reconnect_initial_ms == 0 {
            return Err(anyhow!("push.reconnect_initial_ms must be greater than zero"));
        }
        if self.push.reconnect_max_ms < self.push.reconnect_initial_ms {
            return Err(anyhow!(
                "push.reconnect_max_ms ({}) is below push.reconnect_initial_ms ({})",
                self.push.reconnect_max_ms,
                self.push.reconnect_initial_ms
            ));
        }
        if self.api.request_timeout_secs == 0 {
            return Err(anyhow!("api.request_timeout_secs must be greater than zero"));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn give_up_after(&self) -> Duration {
        Duration::from_secs(self.give_up_after_secs)
    }
}

/// Substitute environment variables in the format ${VAR_NAME}.
/// Unset variables keep their placeholder.
fn substitute_env_vars(content: &str) -> String {
    ENV_VAR
        .replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            match std::env::var(var_name) {
                Ok(value) => value,
                Err(_) => {
                    tracing::warn!(
                        "Environment variable {} not found, keeping placeholder",
                        var_name
                    );
                    caps[0].to_string()
                }
            }
        })
        .into_owned()
}

/// Push channel reconnect policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushConfig {
    #[serde(default = "default_reconnect_initial_ms")]
    pub reconnect_initial_ms: u64,
    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,
}

fn default_reconnect_initial_ms() -> u64 {
    1_000
}

fn default_reconnect_max_ms() -> u64 {
    30_000
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            reconnect_initial_ms: default_reconnect_initial_ms(),
            reconnect_max_ms: default_reconnect_max_ms(),
        }
    }
}

impl PushConfig {
    pub fn reconnect_initial(&self) -> Duration {
        Duration::from_millis(self.reconnect_initial_ms)
    }

    pub fn reconnect_max(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_ms)
    }
}

/// Status service endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default)]
    pub base_urls: Vec<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_retries_per_endpoint")]
    pub max_retries_per_endpoint: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_max_retries_per_endpoint() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    500
}

fn default_cooldown_secs() -> u64 {
    60
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_urls: Vec::new(),
            request_timeout_secs: default_request_timeout_secs(),
            max_retries_per_endpoint: default_max_retries_per_endpoint(),
            retry_delay_ms: default_retry_delay_ms(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn failover_config(&self) -> FailoverConfig {
        FailoverConfig {
            max_retries_per_endpoint: self.max_retries_per_endpoint,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            cooldown_period: Duration::from_secs(self.cooldown_secs),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Enables the WalletConnect option when set
    #[serde(default)]
    pub walletconnect_project_id: Option<String>,
}
