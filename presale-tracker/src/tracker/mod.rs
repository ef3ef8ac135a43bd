// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Contribution status tracking
//!
//! Each [`ContributionTracker::start`] opens a session of three tasks:
//!
//! ```text
//!   PushTask ──┐
//!              ├── mpsc<Envelope> ──> MergeConsumer ──> watch<TrackedState>
//!   PollTask ──┘                                             │
//!                                                   TrackerHandle / ContributionWatch
//! ```
//!
//! The consumer is the only writer of the held contribution. Stopping a
//! session bumps the epoch inside the watch value, so anything a finished
//! session still has in flight is dropped.

mod activity;
mod consumer;
mod poll_task;
mod push_task;

use self::activity::ActivityClock;
use self::consumer::{MergeConsumer, TrackedState};
use self::poll_task::{PollCommand, PollTask};
use self::push_task::PushTask;
use crate::channels::{LookupKeys, PushChannel, StatusQuery, Topic};
use crate::config::TrackerConfig;
use crate::contribution::{Contribution, MergeOutcome};
use crate::error::TrackerError;
use crate::metrics::TrackerMetrics;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Identity of the contribution to follow. Blank strings count as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackParams {
    pub wallet_address: Option<String>,
    pub tx_hash: Option<String>,
    pub sender_address: Option<String>,
}

impl TrackParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_wallet(mut self, address: impl Into<String>) -> Self {
        self.wallet_address = Some(address.into());
        self
    }

    pub fn with_tx_hash(mut self, tx_hash: impl Into<String>) -> Self {
        self.tx_hash = Some(tx_hash.into());
        self
    }

    pub fn with_sender(mut self, address: impl Into<String>) -> Self {
        self.sender_address = Some(address.into());
        self
    }

    /// Trimmed copy with blank values dropped
    pub fn normalized(&self) -> Self {
        fn clean(value: &Option<String>) -> Option<String> {
            value
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        }
        Self {
            wallet_address: clean(&self.wallet_address),
            tx_hash: clean(&self.tx_hash),
            sender_address: clean(&self.sender_address),
        }
    }

    pub fn is_empty(&self) -> bool {
        let normalized = self.normalized();
        normalized.wallet_address.is_none()
            && normalized.tx_hash.is_none()
            && normalized.sender_address.is_none()
    }

    pub fn lookup_keys(&self) -> LookupKeys<'_> {
        LookupKeys {
            tx_hash: self.tx_hash.as_deref(),
            sender_address: self.sender_address.as_deref(),
            wallet_address: self.wallet_address.as_deref(),
        }
    }

    /// Push topics for this identity. The sender address is a wallet-kind
    /// topic, skipped when it equals the wallet address.
    pub fn push_topics(&self) -> Vec<Topic> {
        let mut topics = Vec::new();
        if let Some(wallet) = &self.wallet_address {
            topics.push(Topic::Wallet(wallet.clone()));
        }
        if let Some(sender) = &self.sender_address {
            let duplicate = self
                .wallet_address
                .as_deref()
                .is_some_and(|wallet| wallet.eq_ignore_ascii_case(sender));
            if !duplicate {
                topics.push(Topic::Wallet(sender.clone()));
            }
        }
        if let Some(hash) = &self.tx_hash {
            topics.push(Topic::Tx(hash.clone()));
        }
        topics
    }
}

impl fmt::Display for TrackParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tx={} wallet={} sender={}",
            self.tx_hash.as_deref().unwrap_or("-"),
            self.wallet_address.as_deref().unwrap_or("-"),
            self.sender_address.as_deref().unwrap_or("-"),
        )
    }
}

/// Result of a forced pull
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefetchOutcome {
    /// A contribution was found and went through the merge rule
    Merged(MergeOutcome),
    /// No lookup tier found anything
    NotFound,
    /// The status query failed; held state is untouched
    Failed,
}

/// Factory for tracking sessions
#[derive(Debug, Clone)]
pub struct ContributionTracker {
    config: TrackerConfig,
    query: Arc<dyn StatusQuery>,
    push: Option<Arc<dyn PushChannel>>,
    metrics: Arc<TrackerMetrics>,
}

impl ContributionTracker {
    pub fn new(
        config: TrackerConfig,
        query: Arc<dyn StatusQuery>,
        metrics: Arc<TrackerMetrics>,
    ) -> Self {
        Self {
            config,
            query,
            push: None,
            metrics,
        }
    }

    /// Without a push channel the tracker relies on polling alone
    pub fn with_push_channel(mut self, push: Arc<dyn PushChannel>) -> Self {
        self.push = Some(push);
        self
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Begin tracking. Must be called within a tokio runtime.
    ///
    /// With no identifying parameter the handle is inert: no task runs and
    /// `current()` stays `None`.
    pub fn start(&self, params: TrackParams) -> TrackerHandle {
        let (state, _) = watch::channel(TrackedState::default());
        let state = Arc::new(state);
        let session = self.spawn_session(params.normalized(), &state);
        TrackerHandle {
            inner: Arc::new(HandleInner {
                tracker: self.clone(),
                state,
                session: Mutex::new(session),
            }),
        }
    }

    fn spawn_session(
        &self,
        params: TrackParams,
        state: &Arc<watch::Sender<TrackedState>>,
    ) -> Option<Session> {
        if params.is_empty() {
            debug!("[ContributionTracker] Nothing to track, handle stays idle");
            return None;
        }

        let epoch = state.borrow().epoch;
        let cancel = CancellationToken::new();
        let activity = ActivityClock::new();
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands_rx) = mpsc::channel(8);
        let mut tasks = Vec::with_capacity(3);

        let consumer = MergeConsumer::new(
            params.tx_hash.clone(),
            state.clone(),
            activity.clone(),
            self.metrics.clone(),
        );
        tasks.push(tokio::spawn(consumer.run(updates_rx, cancel.clone())));

        let poll = PollTask {
            epoch,
            params: params.clone(),
            query: self.query.clone(),
            updates: updates_tx.clone(),
            activity,
            metrics: self.metrics.clone(),
            interval: self.config.poll_interval(),
            initial_fetch: self.config.initial_fetch,
        };
        tasks.push(tokio::spawn(poll.run(commands_rx, cancel.clone())));

        if let Some(channel) = &self.push {
            let push = PushTask {
                epoch,
                tx_hash: params.tx_hash.clone(),
                channel: channel.clone(),
                updates: updates_tx,
                state: state.subscribe(),
                metrics: self.metrics.clone(),
                topics: params.push_topics(),
                reconnect_initial: self.config.push.reconnect_initial(),
                reconnect_max: self.config.push.reconnect_max(),
            };
            tasks.push(tokio::spawn(push.run(cancel.clone())));
        }

        self.metrics.active_sessions.inc();
        info!("[ContributionTracker] Tracking {} (session {})", params, epoch);
        Some(Session {
            params,
            epoch,
            cancel,
            commands: commands_tx,
            tasks,
        })
    }
}

#[derive(Debug)]
struct Session {
    params: TrackParams,
    epoch: u64,
    cancel: CancellationToken,
    commands: mpsc::Sender<PollCommand>,
    tasks: Vec<JoinHandle<()>>,
}

#[derive(Debug)]
struct HandleInner {
    tracker: ContributionTracker,
    state: Arc<watch::Sender<TrackedState>>,
    session: Mutex<Option<Session>>,
}

impl Drop for HandleInner {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            session.cancel.cancel();
            self.tracker.metrics.active_sessions.dec();
        }
    }
}

/// Handle on one tracking session. Clones share the session; dropping the
/// last clone stops it.
#[derive(Debug, Clone)]
pub struct TrackerHandle {
    inner: Arc<HandleInner>,
}

impl TrackerHandle {
    /// Latest merged contribution
    pub fn current(&self) -> Option<Contribution> {
        self.inner.state.borrow().contribution.clone()
    }

    /// Change notifications, one per semantic change of `current()`
    pub fn subscribe(&self) -> ContributionWatch {
        ContributionWatch {
            receiver: self.inner.state.subscribe(),
        }
    }

    pub async fn is_running(&self) -> bool {
        self.inner.session.lock().await.is_some()
    }

    /// Identity of the running session
    pub async fn params(&self) -> Option<TrackParams> {
        self.inner
            .session
            .lock()
            .await
            .as_ref()
            .map(|session| session.params.clone())
    }

    /// Query the status service now, bypassing the activity gate. Resolves
    /// once the result has been merged.
    pub async fn refetch(&self) -> Result<RefetchOutcome, TrackerError> {
        let commands = match self.inner.session.lock().await.as_ref() {
            Some(session) => session.commands.clone(),
            None => return Err(TrackerError::NotRunning),
        };
        let (ack_tx, ack_rx) = oneshot::channel();
        commands
            .send(PollCommand::Refetch(ack_tx))
            .await
            .map_err(|_| TrackerError::Cancelled)?;
        ack_rx.await.map_err(|_| TrackerError::Cancelled)
    }

    /// Release the push subscription and cancel all timers. Held state is
    /// kept. Calling it again is a no-op.
    pub async fn stop(&self) {
        let mut session = self.inner.session.lock().await;
        if let Some(running) = session.take() {
            self.shutdown(running).await;
        }
    }

    /// Follow a different contribution. Stops the current session, clears
    /// held state (notifying observers) and starts over. Does nothing when
    /// the identity is unchanged.
    pub async fn retarget(&self, params: TrackParams) {
        let params = params.normalized();
        let mut session = self.inner.session.lock().await;
        if session.as_ref().is_some_and(|running| running.params == params) {
            debug!("[ContributionTracker] Retarget to same identity ignored");
            return;
        }

        if let Some(running) = session.take() {
            self.shutdown(running).await;
        }
        self.inner
            .state
            .send_if_modified(|tracked| tracked.contribution.take().is_some());
        *session = self
            .inner
            .tracker
            .spawn_session(params, &self.inner.state);
    }

    async fn shutdown(&self, session: Session) {
        // Close the epoch first so nothing still in flight can land
        self.inner.state.send_if_modified(|tracked| {
            tracked.epoch += 1;
            false
        });
        session.cancel.cancel();
        for task in session.tasks {
            if let Err(e) = task.await {
                if e.is_panic() {
                    warn!("[ContributionTracker] Session task panicked: {}", e);
                }
            }
        }
        self.inner.tracker.metrics.active_sessions.dec();
        info!("[ContributionTracker] Session {} stopped", session.epoch);
    }
}

/// Observer of one tracker's contribution
#[derive(Debug, Clone)]
pub struct ContributionWatch {
    receiver: watch::Receiver<TrackedState>,
}

impl ContributionWatch {
    pub fn current(&self) -> Option<Contribution> {
        self.receiver.borrow().contribution.clone()
    }

    /// Wait for the next change. Returns `false` once the tracker is gone.
    pub async fn changed(&mut self) -> bool {
        self.receiver.changed().await.is_ok()
    }

    /// Latest value, marking it seen
    pub fn take_current(&mut self) -> Option<Contribution> {
        self.receiver.borrow_and_update().contribution.clone()
    }
}
