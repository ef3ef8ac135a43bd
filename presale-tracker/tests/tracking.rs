// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use presale_tracker::channels::{HashLookup, LocalPushHub, StatusQuery, Topic};
use presale_tracker::contribution::{ContributionFields, MergeOutcome, UpdateSource};
use presale_tracker::error::ChannelResult;
use presale_tracker::{
    ContributionStatus, ContributionTracker, RefetchOutcome, TrackParams, TrackerConfig,
    TrackerMetrics,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Backend double answering from canned JSON bodies
#[derive(Debug, Default)]
struct FakeBackend {
    by_hash: Mutex<HashMap<String, serde_json::Value>>,
}

impl FakeBackend {
    fn respond_by_hash(&self, hash: &str, body: serde_json::Value) {
        self.by_hash.lock().unwrap().insert(hash.to_string(), body);
    }
}

#[async_trait]
impl StatusQuery for FakeBackend {
    async fn status_by_hash(&self, tx_hash: &str) -> ChannelResult<HashLookup> {
        let body = self.by_hash.lock().unwrap().get(tx_hash).cloned();
        match body {
            Some(body) => Ok(serde_json::from_value(body)?),
            None => Ok(HashLookup::not_found()),
        }
    }

    async fn contributions_by_wallet(
        &self,
        _address: &str,
    ) -> ChannelResult<Vec<ContributionFields>> {
        Ok(Vec::new())
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn test_push_pull_and_bridge_updates_reconcile() {
    let backend = Arc::new(FakeBackend::default());
    let hub = LocalPushHub::new("presale-events");
    let metrics = Arc::new(TrackerMetrics::new_for_testing());
    let tracker = ContributionTracker::new(TrackerConfig::default(), backend.clone(), metrics)
        .with_push_channel(Arc::new(hub.clone()));

    let handle = tracker.start(TrackParams::new().with_tx_hash("0xabc"));
    let mut watch = handle.subscribe();
    settle().await;
    assert!(handle.current().is_none());

    let tx_topic = Topic::Tx("0xabc".into());
    let detected = json!({
        "event": "status-update",
        "sourceTxHash": "0xabc",
        "status": "Detected"
    });
    hub.publish(tx_topic.clone(), detected.clone());
    settle().await;
    assert!(watch.changed().await);
    let current = watch.take_current().unwrap();
    assert_eq!(current.status, Some(ContributionStatus::Detected));
    assert_eq!(current.update_source, UpdateSource::PushByTx);

    backend.respond_by_hash(
        "0xabc",
        json!({ "found": true, "sourceTxHash": "0xabc", "status": "Pending Bridge" }),
    );
    let outcome = handle.refetch().await.unwrap();
    assert_eq!(outcome, RefetchOutcome::Merged(MergeOutcome::Applied));
    let current = handle.current().unwrap();
    assert_eq!(current.status, Some(ContributionStatus::PendingBridge));
    assert_eq!(current.update_source, UpdateSource::PullByHash);

    // A delayed retry of the first event changes nothing
    watch.take_current();
    hub.publish(tx_topic.clone(), detected);
    settle().await;
    assert_eq!(
        handle.current().and_then(|c| c.status),
        Some(ContributionStatus::PendingBridge)
    );
    assert!(!tokio::time::timeout(Duration::from_millis(1), watch.changed())
        .await
        .unwrap_or(false));

    // The bridge task id arrives with a later push; the tracker follows it
    hub.publish(
        tx_topic,
        json!({
            "event": "status-update",
            "sourceTxHash": "0xabc",
            "status": "Pending Bridge",
            "bridgeTaskId": "task-42"
        }),
    );
    settle().await;
    let bridge_topic = Topic::BridgeTask("task-42".into());
    assert_eq!(hub.subscription_count(&bridge_topic), 1);

    hub.publish(bridge_topic, json!({ "estimatedTotal": 12 }));
    settle().await;
    let current = handle.current().unwrap();
    assert_eq!(current.estimated_time_minutes, Some(12));
    assert_eq!(current.status, Some(ContributionStatus::PendingBridge));
    assert_eq!(current.bridge_task_id.as_deref(), Some("task-42"));

    handle.stop().await;
    assert!(!handle.is_running().await);
    assert!(handle.current().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_unrelated_transaction_is_isolated() {
    let backend = Arc::new(FakeBackend::default());
    let hub = LocalPushHub::new("presale-events");
    let tracker = ContributionTracker::new(
        TrackerConfig::default(),
        backend.clone(),
        Arc::new(TrackerMetrics::new_for_testing()),
    )
    .with_push_channel(Arc::new(hub.clone()));

    let handle = tracker.start(
        TrackParams::new()
            .with_tx_hash("0xabc")
            .with_wallet("0xwallet"),
    );
    settle().await;

    let wallet_topic = Topic::Wallet("0xwallet".into());
    hub.publish(
        wallet_topic.clone(),
        json!({
            "event": "contribution-update",
            "sourceTxHash": "0xabc",
            "status": "Bridging"
        }),
    );
    hub.publish(
        wallet_topic.clone(),
        json!({
            "event": "contribution-update",
            "sourceTxHash": "0xdef",
            "status": "Claimed"
        }),
    );
    // Wrong event tag for the topic: discarded
    hub.publish(
        wallet_topic,
        json!({ "event": "status-update", "sourceTxHash": "0xabc", "status": "Claimed" }),
    );
    settle().await;

    let current = handle.current().unwrap();
    assert_eq!(current.status, Some(ContributionStatus::Bridging));
    assert_eq!(current.tx_hash(), Some("0xabc"));
    handle.stop().await;
}
