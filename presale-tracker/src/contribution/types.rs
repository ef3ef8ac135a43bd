// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Type definitions for contribution tracking

use super::status::ContributionStatus;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Chain the contribution was paid on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceChain {
    Ethereum,
    Bsc,
    Solana,
    Xdc,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for SourceChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceChain::Ethereum => write!(f, "ETH"),
            SourceChain::Bsc => write!(f, "BSC"),
            SourceChain::Solana => write!(f, "SOL"),
            SourceChain::Xdc => write!(f, "XDC"),
            SourceChain::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Which pull tier produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PullSource {
    ByHash,
    BySender,
    ByWallet,
}

impl PullSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PullSource::ByHash => "hash",
            PullSource::BySender => "sender",
            PullSource::ByWallet => "wallet",
        }
    }
}

/// Provenance of the currently held state. Diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateSource {
    PushByWallet,
    PushByTx,
    PushByBridge,
    PullByHash,
    PullBySender,
    PullByWallet,
}

impl UpdateSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateSource::PushByWallet => "push-by-wallet",
            UpdateSource::PushByTx => "push-by-tx",
            UpdateSource::PushByBridge => "push-by-bridge",
            UpdateSource::PullByHash => "pull-by-hash",
            UpdateSource::PullBySender => "pull-by-sender",
            UpdateSource::PullByWallet => "pull-by-wallet",
        }
    }
}

impl From<PullSource> for UpdateSource {
    fn from(source: PullSource) -> Self {
        match source {
            PullSource::ByHash => UpdateSource::PullByHash,
            PullSource::BySender => UpdateSource::PullBySender,
            PullSource::ByWallet => UpdateSource::PullByWallet,
        }
    }
}

impl fmt::Display for UpdateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Contribution fields as carried by push events and status queries.
///
/// Every field is optional: absent fields never blank out held state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionFields {
    #[serde(default, alias = "_id", deserialize_with = "de_opt_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub source_tx_hash: Option<String>,
    #[serde(default)]
    pub source_chain: Option<SourceChain>,
    #[serde(default)]
    pub source_token: Option<String>,
    #[serde(default, deserialize_with = "de_opt_decimal")]
    pub amount: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_decimal")]
    pub usd_value: Option<f64>,
    #[serde(default)]
    pub status: Option<ContributionStatus>,
    #[serde(default)]
    pub bridge_task_id: Option<String>,
    #[serde(default)]
    pub contract_registered: Option<bool>,
    #[serde(default)]
    pub contract_tx_hash: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub wallet_address: Option<String>,
}

impl ContributionFields {
    pub fn tx_hash(&self) -> Option<&str> {
        non_empty(&self.source_tx_hash)
    }

    pub fn contribution_id(&self) -> Option<&str> {
        non_empty(&self.id)
    }
}

/// Estimated bridge duration as reported by the bridge service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EstimatedSeconds {
    #[serde(default, deserialize_with = "de_opt_decimal")]
    pub avg: Option<f64>,
}

/// Progress event from a bridge task subscription
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeProgress {
    #[serde(default)]
    pub status: Option<ContributionStatus>,
    #[serde(default)]
    pub estimated_time_seconds: Option<EstimatedSeconds>,
    /// Total estimate in minutes
    #[serde(default, deserialize_with = "de_opt_decimal")]
    pub estimated_total: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_decimal")]
    pub elapsed_minutes: Option<f64>,
    #[serde(default)]
    pub tx_hash: Option<String>,
    /// Task the event was delivered for, taken from the subscription topic
    #[serde(skip)]
    pub task_id: Option<String>,
}

impl BridgeProgress {
    /// Estimate in whole minutes. `estimatedTotal` wins over the seconds average.
    pub fn estimate_minutes(&self) -> Option<u64> {
        if let Some(total) = self.estimated_total.filter(|m| m.is_finite() && *m >= 0.0) {
            return Some(total.round() as u64);
        }
        self.estimated_time_seconds
            .as_ref()
            .and_then(|e| e.avg)
            .filter(|s| s.is_finite() && *s >= 0.0)
            .map(|secs| (secs / 60.0).ceil() as u64)
    }

    pub fn elapsed(&self) -> Option<u64> {
        self.elapsed_minutes
            .filter(|m| m.is_finite() && *m >= 0.0)
            .map(|m| m.round() as u64)
    }

    /// Carries at least one field the merge can use
    pub fn is_meaningful(&self) -> bool {
        self.status.is_some() || self.estimate_minutes().is_some()
    }
}

/// Tagged inbound update, one variant per channel
#[derive(Debug, Clone, PartialEq)]
pub enum StatusUpdate {
    /// Wallet-scoped push event (`contribution-update`)
    Wallet(ContributionFields),
    /// Transaction-scoped push event (`status-update`)
    Tx(ContributionFields),
    /// Bridge task progress
    Bridge(BridgeProgress),
    /// Result of a status query
    Pull {
        source: PullSource,
        fields: ContributionFields,
    },
}

impl StatusUpdate {
    pub fn source(&self) -> UpdateSource {
        match self {
            StatusUpdate::Wallet(_) => UpdateSource::PushByWallet,
            StatusUpdate::Tx(_) => UpdateSource::PushByTx,
            StatusUpdate::Bridge(_) => UpdateSource::PushByBridge,
            StatusUpdate::Pull { source, .. } => (*source).into(),
        }
    }

    /// Primary contribution fields, if this is not a bridge update
    pub fn fields(&self) -> Option<&ContributionFields> {
        match self {
            StatusUpdate::Wallet(f) | StatusUpdate::Tx(f) => Some(f),
            StatusUpdate::Pull { fields, .. } => Some(fields),
            StatusUpdate::Bridge(_) => None,
        }
    }

    pub fn bridge_task_id(&self) -> Option<&str> {
        self.fields().and_then(|f| non_empty(&f.bridge_task_id))
    }
}

/// The locally held view of one contribution
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Contribution {
    pub id: Option<String>,
    pub source_tx_hash: Option<String>,
    pub source_chain: Option<SourceChain>,
    pub source_token: Option<String>,
    pub amount: Option<f64>,
    pub usd_value: Option<f64>,
    pub status: Option<ContributionStatus>,
    pub bridge_task_id: Option<String>,
    pub contract_registered: bool,
    pub contract_tx_hash: Option<String>,
    pub created_at: Option<String>,
    pub estimated_time_minutes: Option<u64>,
    pub elapsed_minutes: Option<u64>,
    /// Unix millis of the last accepted update that changed content
    pub last_updated_ms: u64,
    #[serde(rename = "_updateSource")]
    pub update_source: UpdateSource,
}

impl Contribution {
    pub fn from_fields(fields: &ContributionFields, source: UpdateSource, now_ms: u64) -> Self {
        let mut contribution = Self {
            id: None,
            source_tx_hash: None,
            source_chain: None,
            source_token: None,
            amount: None,
            usd_value: None,
            status: None,
            bridge_task_id: None,
            contract_registered: false,
            contract_tx_hash: None,
            created_at: None,
            estimated_time_minutes: None,
            elapsed_minutes: None,
            last_updated_ms: now_ms,
            update_source: source,
        };
        contribution.overlay(fields, true);
        contribution
    }

    pub fn tx_hash(&self) -> Option<&str> {
        non_empty(&self.source_tx_hash)
    }

    pub fn contribution_id(&self) -> Option<&str> {
        non_empty(&self.id)
    }

    pub fn status_priority(&self) -> Option<u32> {
        self.status.as_ref().map(ContributionStatus::priority)
    }

    /// Copy present fields onto this contribution.
    ///
    /// With `replace_status == false` the status only moves to an equal or
    /// higher priority.
    pub(crate) fn overlay(&mut self, fields: &ContributionFields, replace_status: bool) {
        overlay_string(&mut self.id, &fields.id);
        overlay_string(&mut self.source_tx_hash, &fields.source_tx_hash);
        overlay_string(&mut self.source_token, &fields.source_token);
        overlay_string(&mut self.bridge_task_id, &fields.bridge_task_id);
        overlay_string(&mut self.contract_tx_hash, &fields.contract_tx_hash);
        overlay_string(&mut self.created_at, &fields.created_at);
        if let Some(chain) = fields.source_chain {
            self.source_chain = Some(chain);
        }
        if let Some(amount) = fields.amount {
            self.amount = Some(amount);
        }
        if let Some(usd) = fields.usd_value {
            self.usd_value = Some(usd);
        }
        // Registration never flips back once seen
        if fields.contract_registered == Some(true) {
            self.contract_registered = true;
        }
        if let Some(status) = &fields.status {
            let accept = replace_status
                || self
                    .status_priority()
                    .map_or(true, |current| status.priority() >= current);
            if accept {
                self.status = Some(status.clone());
            }
        }
    }

    /// Copy present fields only where nothing is held yet. Used for
    /// updates whose status ranks below the held one.
    pub(crate) fn fill_missing(&mut self, fields: &ContributionFields) {
        fill_string(&mut self.id, &fields.id);
        fill_string(&mut self.source_tx_hash, &fields.source_tx_hash);
        fill_string(&mut self.source_token, &fields.source_token);
        fill_string(&mut self.bridge_task_id, &fields.bridge_task_id);
        fill_string(&mut self.contract_tx_hash, &fields.contract_tx_hash);
        fill_string(&mut self.created_at, &fields.created_at);
        self.source_chain = self.source_chain.or(fields.source_chain);
        self.amount = self.amount.or(fields.amount);
        self.usd_value = self.usd_value.or(fields.usd_value);
        if fields.contract_registered == Some(true) {
            self.contract_registered = true;
        }
    }

    /// Equality ignoring provenance and timestamp
    pub fn same_content(&self, other: &Contribution) -> bool {
        self.id == other.id
            && self.source_tx_hash == other.source_tx_hash
            && self.source_chain == other.source_chain
            && self.source_token == other.source_token
            && self.amount == other.amount
            && self.usd_value == other.usd_value
            && self.status == other.status
            && self.bridge_task_id == other.bridge_task_id
            && self.contract_registered == other.contract_registered
            && self.contract_tx_hash == other.contract_tx_hash
            && self.created_at == other.created_at
            && self.estimated_time_minutes == other.estimated_time_minutes
            && self.elapsed_minutes == other.elapsed_minutes
    }
}

impl fmt::Display for Contribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = self
            .status
            .as_ref()
            .map(|s| s.as_str())
            .unwrap_or("(no status)");
        write!(
            f,
            "tx={} status={}",
            self.tx_hash().unwrap_or("-"),
            status
        )?;
        if let (Some(amount), Some(token)) = (self.amount, self.source_token.as_deref()) {
            write!(f, " amount={} {}", amount, token)?;
        }
        if let Some(chain) = self.source_chain {
            write!(f, " chain={}", chain)?;
        }
        if let Some(eta) = self.estimated_time_minutes {
            write!(f, " eta={}m", eta)?;
        }
        if self.contract_registered {
            write!(f, " registered")?;
        }
        Ok(())
    }
}

fn overlay_string(target: &mut Option<String>, source: &Option<String>) {
    if let Some(value) = non_empty(source) {
        *target = Some(value.to_string());
    }
}

fn fill_string(target: &mut Option<String>, source: &Option<String>) {
    if non_empty(target).is_none() {
        overlay_string(target, source);
    }
}

/// Treat blank strings as absent
pub fn non_empty(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Compare transaction hashes. EVM hex hashes compare case-insensitively,
/// anything else (e.g. base58 Solana signatures) must match exactly.
pub fn tx_hashes_match(a: &str, b: &str) -> bool {
    let a = a.trim();
    let b = b.trim();
    if a.starts_with("0x") && b.starts_with("0x") {
        a.eq_ignore_ascii_case(b)
    } else {
        a == b
    }
}

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(f64),
    String(String),
}

/// Accept numbers or numeric strings; anything unparseable becomes `None`.
fn de_opt_decimal<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(
        match Option::<NumberOrString>::deserialize(deserializer).unwrap_or(None) {
            Some(NumberOrString::Number(n)) => Some(n),
            Some(NumberOrString::String(s)) => s.trim().parse().ok(),
            None => None,
        },
    )
}

/// Backend ids may be strings or numbers
fn de_opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
