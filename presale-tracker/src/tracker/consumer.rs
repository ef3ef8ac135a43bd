// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Single writer of the tracked state

use super::activity::ActivityClock;
use crate::contribution::{Contribution, MergeOutcome, Reconciler, StatusUpdate};
use crate::metrics::TrackerMetrics;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Value held in the tracker's watch channel.
///
/// `epoch` moves forward on every stop; writes stamped with an older epoch
/// are dropped under the same lock that publishes the snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct TrackedState {
    pub(crate) epoch: u64,
    pub(crate) contribution: Option<Contribution>,
}

/// One update on its way to the merge consumer
#[derive(Debug)]
pub(crate) struct Envelope {
    pub(crate) epoch: u64,
    /// When the update was received, or when the query producing it was issued
    pub(crate) observed_at: Instant,
    pub(crate) update: StatusUpdate,
    pub(crate) ack: Option<oneshot::Sender<MergeOutcome>>,
}

impl Envelope {
    pub(crate) fn new(epoch: u64, update: StatusUpdate) -> Self {
        Self {
            epoch,
            observed_at: Instant::now(),
            update,
            ack: None,
        }
    }

    pub(crate) fn observed_at(mut self, at: Instant) -> Self {
        self.observed_at = at;
        self
    }

    pub(crate) fn with_ack(mut self, ack: oneshot::Sender<MergeOutcome>) -> Self {
        self.ack = Some(ack);
        self
    }
}

pub(crate) struct MergeConsumer {
    reconciler: Reconciler,
    state: Arc<watch::Sender<TrackedState>>,
    activity: ActivityClock,
    metrics: Arc<TrackerMetrics>,
}

impl MergeConsumer {
    pub(crate) fn new(
        tracked_tx: Option<String>,
        state: Arc<watch::Sender<TrackedState>>,
        activity: ActivityClock,
        metrics: Arc<TrackerMetrics>,
    ) -> Self {
        Self {
            reconciler: Reconciler::tracking(tracked_tx),
            state,
            activity,
            metrics,
        }
    }

    pub(crate) async fn run(
        mut self,
        mut updates: mpsc::UnboundedReceiver<Envelope>,
        cancel: CancellationToken,
    ) {
        loop {
            let envelope = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = updates.recv() => match next {
                    Some(envelope) => envelope,
                    None => break,
                },
            };
            self.handle(envelope).await;
        }
        debug!("[MergeConsumer] Stopped");
    }

    /// Merge one update and publish the result. `None` when the envelope
    /// belonged to a finished session.
    pub(crate) async fn handle(&mut self, envelope: Envelope) -> Option<MergeOutcome> {
        let Envelope {
            epoch,
            observed_at,
            update,
            ack,
        } = envelope;
        let source = update.source();
        self.metrics
            .updates_received
            .with_label_values(&[source.as_str()])
            .inc();

        let reconciler = &mut self.reconciler;
        let mut merged = None;
        self.state.send_if_modified(|tracked| {
            if tracked.epoch != epoch {
                return false;
            }
            let outcome = reconciler.apply(&update);
            let changed = outcome == MergeOutcome::Applied;
            if changed {
                tracked.contribution = reconciler.current().cloned();
            }
            merged = Some(outcome);
            changed
        });

        let Some(outcome) = merged else {
            self.metrics.updates_stale.inc();
            debug!(
                "[MergeConsumer] Dropped {} update from finished session {}",
                source, epoch
            );
            return None;
        };

        match &outcome {
            MergeOutcome::Applied => {
                self.metrics
                    .updates_applied
                    .with_label_values(&[source.as_str()])
                    .inc();
                self.activity.record(observed_at).await;
                if let Some(current) = self.reconciler.current() {
                    info!("[ContributionTracker] {} (via {})", current, source);
                }
            }
            MergeOutcome::Unchanged => {
                self.metrics
                    .updates_unchanged
                    .with_label_values(&[source.as_str()])
                    .inc();
                self.activity.record(observed_at).await;
            }
            MergeOutcome::Rejected(reason) => {
                self.metrics
                    .updates_rejected
                    .with_label_values(&[reason.label()])
                    .inc();
            }
        }

        if let Some(ack) = ack {
            let _ = ack.send(outcome.clone());
        }
        Some(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contribution::{ContributionFields, ContributionStatus};
    use std::time::Duration;

    fn tx_update(status: ContributionStatus) -> StatusUpdate {
        StatusUpdate::Tx(ContributionFields {
            source_tx_hash: Some("0xabc".into()),
            status: Some(status),
            ..Default::default()
        })
    }

    fn consumer() -> (MergeConsumer, watch::Receiver<TrackedState>, ActivityClock) {
        let (tx, rx) = watch::channel(TrackedState::default());
        let activity = ActivityClock::new();
        let consumer = MergeConsumer::new(
            Some("0xabc".into()),
            Arc::new(tx),
            activity.clone(),
            Arc::new(TrackerMetrics::new_for_testing()),
        );
        (consumer, rx, activity)
    }

    #[tokio::test]
    async fn test_notifies_only_on_change() {
        let (mut consumer, mut rx, activity) = consumer();
        rx.borrow_and_update();

        let outcome = consumer
            .handle(Envelope::new(0, tx_update(ContributionStatus::Bridging)))
            .await;
        assert_eq!(outcome, Some(MergeOutcome::Applied));
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();

        let outcome = consumer
            .handle(Envelope::new(0, tx_update(ContributionStatus::Bridging)))
            .await;
        assert_eq!(outcome, Some(MergeOutcome::Unchanged));
        assert!(!rx.has_changed().unwrap());

        let other = StatusUpdate::Tx(ContributionFields {
            source_tx_hash: Some("0xother".into()),
            status: Some(ContributionStatus::Claimed),
            ..Default::default()
        });
        let outcome = consumer.handle(Envelope::new(0, other)).await;
        assert!(matches!(outcome, Some(MergeOutcome::Rejected(_))));
        assert!(!rx.has_changed().unwrap());
        assert!(activity.accepted_within(Duration::from_secs(1)).await);
        assert_eq!(
            consumer
                .metrics
                .updates_rejected
                .with_label_values(&["different_transaction"])
                .get(),
            1
        );
    }

    #[tokio::test]
    async fn test_stale_epoch_is_dropped() {
        let (mut consumer, rx, _) = consumer();
        consumer.state.send_modify(|tracked| tracked.epoch = 3);

        let (ack_tx, ack_rx) = oneshot::channel();
        let envelope =
            Envelope::new(2, tx_update(ContributionStatus::Claimable)).with_ack(ack_tx);
        assert_eq!(consumer.handle(envelope).await, None);
        assert!(rx.borrow().contribution.is_none());
        assert!(ack_rx.await.is_err());
        assert_eq!(consumer.metrics.updates_stale.get(), 1);
    }

    #[tokio::test]
    async fn test_acknowledges_merge() {
        let (mut consumer, rx, _) = consumer();
        let (ack_tx, ack_rx) = oneshot::channel();
        let envelope = Envelope::new(0, tx_update(ContributionStatus::Claimable)).with_ack(ack_tx);
        consumer.handle(envelope).await;
        assert_eq!(ack_rx.await.unwrap(), MergeOutcome::Applied);
        assert_eq!(
            rx.borrow().contribution.as_ref().unwrap().status,
            Some(ContributionStatus::Claimable)
        );
    }
}
