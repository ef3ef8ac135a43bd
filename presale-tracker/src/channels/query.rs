// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Status query contract and the tiered lookup built on it

use crate::contribution::{non_empty, tx_hashes_match, ContributionFields, PullSource};
use crate::error::ChannelResult;
use crate::metrics::TrackerMetrics;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::Debug;
use tracing::debug;

/// Response of the by-hash lookup
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HashLookup {
    #[serde(default)]
    pub found: bool,
    #[serde(flatten)]
    pub contribution: ContributionFields,
}

impl HashLookup {
    pub fn not_found() -> Self {
        Self::default()
    }

    pub fn found(contribution: ContributionFields) -> Self {
        Self {
            found: true,
            contribution,
        }
    }
}

/// Response of the by-wallet listing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContributionList {
    #[serde(default)]
    pub contributions: Vec<ContributionFields>,
}

/// Request/response status service
#[async_trait]
pub trait StatusQuery: Send + Sync + Debug {
    /// Latest known status for a funding transaction
    async fn status_by_hash(&self, tx_hash: &str) -> ChannelResult<HashLookup>;

    /// Every contribution recorded for an address
    async fn contributions_by_wallet(&self, address: &str)
        -> ChannelResult<Vec<ContributionFields>>;
}

/// Identity used for one pull
#[derive(Debug, Clone, Copy, Default)]
pub struct LookupKeys<'a> {
    pub tx_hash: Option<&'a str>,
    pub sender_address: Option<&'a str>,
    pub wallet_address: Option<&'a str>,
}

/// Tiered lookup: by hash, then by sender address, then by wallet address
/// when it differs from the sender.
///
/// Returns `Ok(None)` when no tier found anything.
pub async fn lookup_contribution(
    query: &dyn StatusQuery,
    keys: LookupKeys<'_>,
    metrics: &TrackerMetrics,
) -> ChannelResult<Option<(PullSource, ContributionFields)>> {
    if let Some(hash) = keys.tx_hash {
        let lookup = timed(metrics, PullSource::ByHash, query.status_by_hash(hash)).await?;
        if lookup.found {
            return Ok(Some((PullSource::ByHash, lookup.contribution)));
        }
        debug!("[Lookup] No contribution for hash {}", hash);
    }

    if let Some(sender) = keys.sender_address {
        let entries = timed(
            metrics,
            PullSource::BySender,
            query.contributions_by_wallet(sender),
        )
        .await?;
        if let Some(entry) = select_entry(entries, keys.tx_hash) {
            return Ok(Some((PullSource::BySender, entry)));
        }
    }

    if let Some(wallet) = keys.wallet_address {
        let distinct = keys
            .sender_address
            .map_or(true, |sender| !sender.eq_ignore_ascii_case(wallet));
        if distinct {
            let entries = timed(
                metrics,
                PullSource::ByWallet,
                query.contributions_by_wallet(wallet),
            )
            .await?;
            if let Some(entry) = select_entry(entries, keys.tx_hash) {
                return Ok(Some((PullSource::ByWallet, entry)));
            }
        }
    }

    Ok(None)
}

async fn timed<T>(
    metrics: &TrackerMetrics,
    tier: PullSource,
    request: impl std::future::Future<Output = ChannelResult<T>>,
) -> ChannelResult<T> {
    metrics.pull_queries.with_label_values(&[tier.as_str()]).inc();
    let timer = metrics
        .pull_latency
        .with_label_values(&[tier.as_str()])
        .start_timer();
    let result = request.await;
    timer.observe_duration();
    if result.is_err() {
        metrics.pull_errors.with_label_values(&[tier.as_str()]).inc();
    }
    result
}

/// Pick the entry for the tracked hash, else the most recently created one
pub fn select_entry(
    entries: Vec<ContributionFields>,
    tx_hash: Option<&str>,
) -> Option<ContributionFields> {
    if let Some(hash) = tx_hash {
        if let Some(matching) = entries
            .iter()
            .find(|e| e.tx_hash().is_some_and(|h| tx_hashes_match(h, hash)))
        {
            return Some(matching.clone());
        }
    }

    let mut newest: Option<ContributionFields> = None;
    for entry in entries {
        let newer = match &newest {
            None => true,
            Some(best) => {
                compare_created_at(non_empty(&entry.created_at), non_empty(&best.created_at))
                    == Ordering::Greater
            }
        };
        if newer {
            newest = Some(entry);
        }
    }
    newest
}

/// Numeric timestamps compare numerically, anything else (ISO 8601) as text.
/// A missing timestamp is oldest.
fn compare_created_at(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => match (a.parse::<i64>(), b.parse::<i64>()) {
            (Ok(a), Ok(b)) => a.cmp(&b),
            _ => a.cmp(b),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contribution::ContributionStatus;
    use crate::test_utils::MockStatusQuery;

    fn entry(hash: &str, created_at: Option<&str>) -> ContributionFields {
        ContributionFields {
            source_tx_hash: Some(hash.to_string()),
            created_at: created_at.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_select_entry_prefers_matching_hash() {
        let entries = vec![
            entry("0x1", Some("2025-03-01T00:00:00Z")),
            entry("0xABC", Some("2025-01-01T00:00:00Z")),
        ];
        let picked = select_entry(entries, Some("0xabc")).unwrap();
        assert_eq!(picked.tx_hash(), Some("0xABC"));
    }

    #[test]
    fn test_select_entry_falls_back_to_newest() {
        let entries = vec![
            entry("0x1", Some("2025-01-01T00:00:00Z")),
            entry("0x2", Some("2025-03-01T00:00:00Z")),
            entry("0x3", None),
        ];
        let picked = select_entry(entries, Some("0xmissing")).unwrap();
        assert_eq!(picked.tx_hash(), Some("0x2"));

        let numeric = vec![entry("0xa", Some("900")), entry("0xb", Some("1000"))];
        assert_eq!(select_entry(numeric, None).unwrap().tx_hash(), Some("0xb"));

        let undated = vec![entry("0xa", None), entry("0xb", None)];
        assert_eq!(select_entry(undated, None).unwrap().tx_hash(), Some("0xa"));

        assert!(select_entry(vec![], None).is_none());
    }

    #[test]
    fn test_hash_lookup_decodes_flattened_fields() {
        let lookup: HashLookup = serde_json::from_str(
            r#"{"found":true,"sourceTxHash":"0xabc","status":"Claimable","amount":"1.5"}"#,
        )
        .unwrap();
        assert!(lookup.found);
        assert_eq!(lookup.contribution.tx_hash(), Some("0xabc"));
        assert_eq!(
            lookup.contribution.status,
            Some(ContributionStatus::Claimable)
        );
        assert_eq!(lookup.contribution.amount, Some(1.5));
    }

    #[tokio::test]
    async fn test_lookup_tiers_in_order() {
        let metrics = TrackerMetrics::new_for_testing();
        let query = MockStatusQuery::new();
        query.set_wallet("0xwallet", vec![entry("0xabc", Some("1"))]);

        let keys = LookupKeys {
            tx_hash: Some("0xabc"),
            sender_address: Some("0xsender"),
            wallet_address: Some("0xwallet"),
        };
        let (source, fields) = lookup_contribution(&query, keys, &metrics)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(source, PullSource::ByWallet);
        assert_eq!(fields.tx_hash(), Some("0xabc"));
        assert_eq!(query.hash_calls(), 1);
        assert_eq!(query.wallet_calls(), 2);
    }

    #[tokio::test]
    async fn test_lookup_stops_at_first_hit() {
        let metrics = TrackerMetrics::new_for_testing();
        let query = MockStatusQuery::new();
        query.set_hash(
            "0xabc",
            ContributionFields {
                source_tx_hash: Some("0xabc".into()),
                status: Some(ContributionStatus::Detected),
                ..Default::default()
            },
        );

        let keys = LookupKeys {
            tx_hash: Some("0xabc"),
            sender_address: Some("0xsender"),
            wallet_address: None,
        };
        let (source, _) = lookup_contribution(&query, keys, &metrics)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(source, PullSource::ByHash);
        assert_eq!(query.wallet_calls(), 0);
    }

    #[tokio::test]
    async fn test_lookup_skips_wallet_equal_to_sender() {
        let metrics = TrackerMetrics::new_for_testing();
        let query = MockStatusQuery::new();
        let keys = LookupKeys {
            tx_hash: None,
            sender_address: Some("0xAAA"),
            wallet_address: Some("0xaaa"),
        };
        assert!(lookup_contribution(&query, keys, &metrics)
            .await
            .unwrap()
            .is_none());
        assert_eq!(query.wallet_calls(), 1);
        assert_eq!(query.hash_calls(), 0);
    }

    #[tokio::test]
    async fn test_lookup_propagates_errors() {
        let metrics = TrackerMetrics::new_for_testing();
        let query = MockStatusQuery::new();
        query.fail_requests(true);
        let keys = LookupKeys {
            tx_hash: Some("0xabc"),
            ..Default::default()
        };
        assert!(lookup_contribution(&query, keys, &metrics).await.is_err());
        assert_eq!(
            metrics
                .pull_errors
                .with_label_values(&[PullSource::ByHash.as_str()])
                .get(),
            1
        );
    }
}
