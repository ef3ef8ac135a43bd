// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Pull fallback: periodic status queries gated on push activity

use super::activity::ActivityClock;
use super::consumer::Envelope;
use super::{RefetchOutcome, TrackParams};
use crate::channels::{lookup_contribution, StatusQuery};
use crate::contribution::StatusUpdate;
use crate::metrics::TrackerMetrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug)]
pub(crate) enum PollCommand {
    /// Query now, bypassing the activity gate
    Refetch(oneshot::Sender<RefetchOutcome>),
}

pub(crate) struct PollTask {
    pub(crate) epoch: u64,
    pub(crate) params: TrackParams,
    pub(crate) query: Arc<dyn StatusQuery>,
    pub(crate) updates: mpsc::UnboundedSender<Envelope>,
    pub(crate) activity: ActivityClock,
    pub(crate) metrics: Arc<TrackerMetrics>,
    pub(crate) interval: Duration,
    pub(crate) initial_fetch: bool,
}

impl PollTask {
    pub(crate) async fn run(
        self,
        mut commands: mpsc::Receiver<PollCommand>,
        cancel: CancellationToken,
    ) {
        if self.initial_fetch && self.poll_once(&cancel).await.is_none() {
            return;
        }

        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(command) = commands.recv() => match command {
                    PollCommand::Refetch(ack) => {
                        debug!("[PollTask] Refetch requested");
                        if let Some(outcome) = self.poll_once(&cancel).await {
                            let _ = ack.send(outcome);
                        }
                    }
                },
                _ = ticker.tick() => {
                    self.metrics.poll_ticks.inc();
                    if self.activity.accepted_within(self.interval).await {
                        self.metrics.poll_ticks_skipped.inc();
                        debug!("[PollTask] Recent update accepted, skipping tick");
                        continue;
                    }
                    self.poll_once(&cancel).await;
                }
            }
        }
        debug!("[PollTask] Stopped");
    }

    /// One tiered lookup merged through the consumer. `None` when cancelled
    /// before the result could be merged.
    async fn poll_once(&self, cancel: &CancellationToken) -> Option<RefetchOutcome> {
        let issued_at = Instant::now();
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("[PollTask] Dropping in-flight query");
                return None;
            }
            result = lookup_contribution(
                self.query.as_ref(),
                self.params.lookup_keys(),
                &self.metrics,
            ) => result,
        };

        let (source, fields) = match result {
            Ok(Some(found)) => found,
            Ok(None) => {
                debug!("[PollTask] No contribution found for {}", self.params);
                return Some(RefetchOutcome::NotFound);
            }
            Err(e) => {
                warn!("[PollTask] Status query failed: {}", e);
                return Some(RefetchOutcome::Failed);
            }
        };

        let (ack_tx, ack_rx) = oneshot::channel();
        let envelope = Envelope::new(self.epoch, StatusUpdate::Pull { source, fields })
            .observed_at(issued_at)
            .with_ack(ack_tx);
        if self.updates.send(envelope).is_err() {
            return None;
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            merged = ack_rx => merged.ok().map(RefetchOutcome::Merged),
        }
    }
}
