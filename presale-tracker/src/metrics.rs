// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use prometheus::{
    register_histogram_vec_with_registry, register_int_counter_vec_with_registry,
    register_int_counter_with_registry, register_int_gauge_with_registry, HistogramVec,
    IntCounter, IntCounterVec, IntGauge, Registry,
};

const PULL_LATENCY_SEC_BUCKETS: &[f64] = &[
    0.01, 0.05, 0.1, 0.25, 0.5, 0.75, 1.0, 1.5, 2.0, 3.0, 5.0, 7.5, 10.0, 15.0, 30.0,
];

#[derive(Clone, Debug)]
pub struct TrackerMetrics {
    pub(crate) updates_received: IntCounterVec,
    pub(crate) updates_applied: IntCounterVec,
    pub(crate) updates_unchanged: IntCounterVec,
    pub(crate) updates_rejected: IntCounterVec,
    pub(crate) updates_stale: IntCounter,

    pub(crate) poll_ticks: IntCounter,
    pub(crate) poll_ticks_skipped: IntCounter,
    pub(crate) pull_queries: IntCounterVec,
    pub(crate) pull_errors: IntCounterVec,
    pub(crate) pull_latency: HistogramVec,

    pub(crate) push_connects: IntCounter,
    pub(crate) push_connect_errors: IntCounter,
    pub(crate) push_disconnects: IntCounter,
    pub(crate) push_subscriptions: IntCounterVec,
    pub(crate) push_decode_errors: IntCounter,

    pub(crate) active_sessions: IntGauge,
}

impl TrackerMetrics {
    pub fn new(registry: &Registry) -> Self {
        Self {
            updates_received: register_int_counter_vec_with_registry!(
                "presale_tracker_updates_received",
                "Total number of inbound updates, by source",
                &["source"],
                registry,
            )
            .unwrap(),
            updates_applied: register_int_counter_vec_with_registry!(
                "presale_tracker_updates_applied",
                "Total number of updates that changed the held contribution, by source",
                &["source"],
                registry,
            )
            .unwrap(),
            updates_unchanged: register_int_counter_vec_with_registry!(
                "presale_tracker_updates_unchanged",
                "Total number of accepted updates that changed nothing, by source",
                &["source"],
                registry,
            )
            .unwrap(),
            updates_rejected: register_int_counter_vec_with_registry!(
                "presale_tracker_updates_rejected",
                "Total number of updates rejected by the merge rule, by reason",
                &["reason"],
                registry,
            )
            .unwrap(),
            updates_stale: register_int_counter_with_registry!(
                "presale_tracker_updates_stale",
                "Total number of updates dropped because their session had ended",
                registry,
            )
            .unwrap(),
            poll_ticks: register_int_counter_with_registry!(
                "presale_tracker_poll_ticks",
                "Total number of scheduled poll ticks",
                registry,
            )
            .unwrap(),
            poll_ticks_skipped: register_int_counter_with_registry!(
                "presale_tracker_poll_ticks_skipped",
                "Total number of poll ticks skipped because an update was accepted recently",
                registry,
            )
            .unwrap(),
            pull_queries: register_int_counter_vec_with_registry!(
                "presale_tracker_pull_queries",
                "Total number of status queries issued, by lookup tier",
                &["tier"],
                registry,
            )
            .unwrap(),
            pull_errors: register_int_counter_vec_with_registry!(
                "presale_tracker_pull_errors",
                "Total number of failed status queries, by lookup tier",
                &["tier"],
                registry,
            )
            .unwrap(),
            pull_latency: register_histogram_vec_with_registry!(
                "presale_tracker_pull_latency",
                "Latency of status queries, by lookup tier",
                &["tier"],
                PULL_LATENCY_SEC_BUCKETS.to_vec(),
                registry,
            )
            .unwrap(),
            push_connects: register_int_counter_with_registry!(
                "presale_tracker_push_connects",
                "Total number of successful push channel connects",
                registry,
            )
            .unwrap(),
            push_connect_errors: register_int_counter_with_registry!(
                "presale_tracker_push_connect_errors",
                "Total number of failed push channel connects",
                registry,
            )
            .unwrap(),
            push_disconnects: register_int_counter_with_registry!(
                "presale_tracker_push_disconnects",
                "Total number of push connections lost",
                registry,
            )
            .unwrap(),
            push_subscriptions: register_int_counter_vec_with_registry!(
                "presale_tracker_push_subscriptions",
                "Total number of push subscriptions issued, by topic kind",
                &["kind"],
                registry,
            )
            .unwrap(),
            push_decode_errors: register_int_counter_with_registry!(
                "presale_tracker_push_decode_errors",
                "Total number of push events that could not be decoded",
                registry,
            )
            .unwrap(),
            active_sessions: register_int_gauge_with_registry!(
                "presale_tracker_active_sessions",
                "Number of tracking sessions currently running",
                registry,
            )
            .unwrap(),
        }
    }

    pub fn new_for_testing() -> Self {
        let registry = Registry::new();
        Self::new(&registry)
    }
}
