// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Push subscription: one connection per session, reconnected with backoff

use super::consumer::{Envelope, TrackedState};
use crate::channels::{PushChannel, PushConnection, Topic};
use crate::contribution::{tx_hashes_match, StatusUpdate};
use crate::metrics::TrackerMetrics;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub(crate) struct PushTask {
    pub(crate) epoch: u64,
    /// Tracked funding transaction, if known
    pub(crate) tx_hash: Option<String>,
    pub(crate) channel: Arc<dyn PushChannel>,
    pub(crate) updates: mpsc::UnboundedSender<Envelope>,
    /// Merged state, read to tell which transaction is held
    pub(crate) state: watch::Receiver<TrackedState>,
    pub(crate) metrics: Arc<TrackerMetrics>,
    /// Every topic subscribed so far, replayed after a reconnect
    pub(crate) topics: Vec<Topic>,
    pub(crate) reconnect_initial: Duration,
    pub(crate) reconnect_max: Duration,
}

/// Bridge task named by a primary push update
struct BridgeCandidate {
    task_id: String,
    tx_hash: Option<String>,
}

impl BridgeCandidate {
    fn from_update(update: &StatusUpdate) -> Option<Self> {
        let task_id = update.bridge_task_id()?.to_string();
        let tx_hash = update
            .fields()
            .and_then(|f| f.tx_hash())
            .map(str::to_string);
        Some(Self { task_id, tx_hash })
    }
}

enum PumpEnd {
    Cancelled,
    ConnectionLost,
}

impl PushTask {
    pub(crate) async fn run(mut self, cancel: CancellationToken) {
        // Delays: 1, 2, 4, 8, 16, 30, 30 ... secs with the default policy, plus jitter
        let mut backoff = ExponentialBackoff {
            current_interval: self.reconnect_initial,
            initial_interval: self.reconnect_initial,
            randomization_factor: 0.1,
            multiplier: 2.0,
            max_interval: self.reconnect_max,
            max_elapsed_time: None,
            ..Default::default()
        };

        loop {
            let Some(mut connection) = self.connect(&mut backoff, &cancel).await else {
                break;
            };
            backoff.reset();

            let end = self.pump(connection.as_mut(), &cancel).await;
            connection.close().await;
            match end {
                PumpEnd::Cancelled => break,
                PumpEnd::ConnectionLost => {
                    self.metrics.push_disconnects.inc();
                    warn!(
                        "[PushTask] Connection to {} lost, reconnecting",
                        self.channel.name()
                    );
                }
            }
        }
        debug!("[PushTask] Stopped");
    }

    /// Connect and subscribe every known topic, retrying until cancelled
    async fn connect(
        &self,
        backoff: &mut ExponentialBackoff,
        cancel: &CancellationToken,
    ) -> Option<Box<dyn PushConnection>> {
        loop {
            let attempt = tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                attempt = self.channel.connect() => attempt,
            };

            match attempt {
                Ok(mut connection) => match self.subscribe_all(connection.as_mut()).await {
                    Ok(()) => {
                        self.metrics.push_connects.inc();
                        info!(
                            "[PushTask] Connected to {} with {} topics",
                            self.channel.name(),
                            self.topics.len()
                        );
                        return Some(connection);
                    }
                    Err(e) => {
                        warn!("[PushTask] Subscribe on {} failed: {}", self.channel.name(), e);
                        connection.close().await;
                    }
                },
                Err(e) => {
                    warn!("[PushTask] Connect to {} failed: {}", self.channel.name(), e);
                }
            }

            self.metrics.push_connect_errors.inc();
            let delay = backoff.next_backoff().unwrap_or(self.reconnect_max);
            debug!("[PushTask] Retrying in {:?}", delay);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn subscribe_all(
        &self,
        connection: &mut dyn PushConnection,
    ) -> crate::error::ChannelResult<()> {
        for topic in &self.topics {
            connection.subscribe(topic).await?;
            self.metrics
                .push_subscriptions
                .with_label_values(&[topic.kind()])
                .inc();
        }
        Ok(())
    }

    async fn pump(
        &mut self,
        connection: &mut dyn PushConnection,
        cancel: &CancellationToken,
    ) -> PumpEnd {
        loop {
            let message = tokio::select! {
                biased;
                _ = cancel.cancelled() => return PumpEnd::Cancelled,
                message = connection.next_message() => message,
            };
            let Some(message) = message else {
                return PumpEnd::ConnectionLost;
            };

            let update = match message.decode() {
                Ok(update) => update,
                Err(e) => {
                    self.metrics.push_decode_errors.inc();
                    debug!("[PushTask] Discarding event on {}: {}", message.topic, e);
                    continue;
                }
            };

            let Some(candidate) = BridgeCandidate::from_update(&update) else {
                if self.updates.send(Envelope::new(self.epoch, update)).is_err() {
                    return PumpEnd::Cancelled;
                }
                continue;
            };

            // Wait for the merge so the held transaction reflects this update
            let (ack_tx, ack_rx) = oneshot::channel();
            let envelope = Envelope::new(self.epoch, update).with_ack(ack_tx);
            if self.updates.send(envelope).is_err() {
                return PumpEnd::Cancelled;
            }
            let merged = tokio::select! {
                biased;
                _ = cancel.cancelled() => return PumpEnd::Cancelled,
                outcome = ack_rx => outcome.is_ok(),
            };
            if merged && self.owns(&candidate) {
                self.follow_bridge_task(connection, candidate.task_id).await;
            }
        }
    }

    /// Whether the update names the tracked transaction, or the held one
    /// when no transaction is tracked
    fn owns(&self, candidate: &BridgeCandidate) -> bool {
        let Some(inbound) = candidate.tx_hash.as_deref() else {
            return false;
        };
        match self.tx_hash.as_deref() {
            Some(tracked) => tx_hashes_match(tracked, inbound),
            None => self
                .state
                .borrow()
                .contribution
                .as_ref()
                .and_then(|held| held.tx_hash())
                .is_some_and(|held| tx_hashes_match(held, inbound)),
        }
    }

    /// Subscribe once to a bridge task
    async fn follow_bridge_task(&mut self, connection: &mut dyn PushConnection, task_id: String) {
        let topic = Topic::BridgeTask(task_id);
        if self.topics.contains(&topic) {
            return;
        }
        self.topics.push(topic.clone());

        match connection.subscribe(&topic).await {
            Ok(()) => {
                self.metrics
                    .push_subscriptions
                    .with_label_values(&[topic.kind()])
                    .inc();
                info!("[PushTask] Following {}", topic);
            }
            // Kept in the topic list, so the next connection picks it up
            Err(e) => warn!("[PushTask] Subscribe to {} failed: {}", topic, e),
        }
    }
}
