// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Status reconciliation
//!
//! Every inbound update, whatever channel it came from, goes through
//! [`Reconciler::apply`]. Updates may arrive late, twice, or out of order;
//! the status priority decides whether they overwrite what is held.

use super::status::ContributionStatus;
use super::types::*;
use std::fmt;
use tracing::debug;

/// Result of applying one update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// State changed, observers must be notified
    Applied,
    /// Accepted but identical to what is held
    Unchanged,
    /// Discarded, state untouched
    Rejected(RejectReason),
}

impl MergeOutcome {
    /// Accepted by the merge rule, whether or not content changed
    pub fn is_accepted(&self) -> bool {
        !matches!(self, MergeOutcome::Rejected(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Inbound status ranks below the held one
    LowerPriority { current: String, inbound: String },
    /// Update names another transaction
    DifferentTransaction,
    /// Neither status nor id links the update to held state
    NoCommonIdentity,
    /// Bridge update without status or estimate
    EmptyBridgeUpdate,
    /// Bridge update before any primary state exists
    NoStateForBridge,
}

impl RejectReason {
    /// Metric label
    pub fn label(&self) -> &'static str {
        match self {
            RejectReason::LowerPriority { .. } => "lower_priority",
            RejectReason::DifferentTransaction => "different_transaction",
            RejectReason::NoCommonIdentity => "no_common_identity",
            RejectReason::EmptyBridgeUpdate => "empty_bridge_update",
            RejectReason::NoStateForBridge => "no_state_for_bridge",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::LowerPriority { current, inbound } => {
                write!(f, "status {} ranks below held {}", inbound, current)
            }
            RejectReason::DifferentTransaction => write!(f, "update names another transaction"),
            RejectReason::NoCommonIdentity => write!(f, "no shared status or id"),
            RejectReason::EmptyBridgeUpdate => write!(f, "bridge update carries no usable field"),
            RejectReason::NoStateForBridge => write!(f, "bridge update before any contribution"),
        }
    }
}

/// How an inbound update relates to the held transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxIdentity {
    Same,
    Different,
    Unknown,
}

fn tx_identity(held: Option<&str>, inbound: Option<&str>) -> TxIdentity {
    match (held, inbound) {
        (Some(a), Some(b)) if tx_hashes_match(a, b) => TxIdentity::Same,
        (Some(_), Some(_)) => TxIdentity::Different,
        _ => TxIdentity::Unknown,
    }
}

/// Holds at most one contribution and merges updates into it
#[derive(Debug, Default)]
pub struct Reconciler {
    current: Option<Contribution>,
    /// Transaction the session was started for
    tracked_tx: Option<String>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconciler for a session that knows its funding transaction. An
    /// update naming that transaction displaces held state for any other.
    pub fn tracking(tx_hash: Option<String>) -> Self {
        Self {
            current: None,
            tracked_tx: tx_hash.filter(|h| !h.trim().is_empty()),
        }
    }

    pub fn current(&self) -> Option<&Contribution> {
        self.current.as_ref()
    }

    /// Drop held state (identity change)
    pub fn reset(&mut self) {
        self.current = None;
    }

    /// Apply an update stamped with the current wall clock
    pub fn apply(&mut self, update: &StatusUpdate) -> MergeOutcome {
        self.apply_at(update, now_ms())
    }

    pub fn apply_at(&mut self, update: &StatusUpdate, now_ms: u64) -> MergeOutcome {
        let source = update.source();
        let outcome = match update {
            StatusUpdate::Bridge(progress) => self.apply_bridge(progress, now_ms),
            StatusUpdate::Wallet(fields) | StatusUpdate::Tx(fields) => {
                self.apply_primary(fields, source, now_ms)
            }
            StatusUpdate::Pull { fields, .. } => self.apply_primary(fields, source, now_ms),
        };
        if let MergeOutcome::Rejected(reason) = &outcome {
            debug!(
                "[Reconciler] Rejected {} update: {}",
                source.as_str(),
                reason
            );
        }
        outcome
    }

    fn apply_primary(
        &mut self,
        fields: &ContributionFields,
        source: UpdateSource,
        now_ms: u64,
    ) -> MergeOutcome {
        let tracked = self.tracked_tx.as_deref();
        let Some(current) = self.current.as_mut() else {
            self.current = Some(Contribution::from_fields(fields, source, now_ms));
            return MergeOutcome::Applied;
        };

        let same_id = matches!(
            (current.contribution_id(), fields.contribution_id()),
            (Some(a), Some(b)) if a == b
        );

        match tx_identity(current.tx_hash(), fields.tx_hash()) {
            TxIdentity::Same => {
                let fresh_identity = matches!(
                    (current.contribution_id(), fields.contribution_id()),
                    (Some(a), Some(b)) if a != b
                );
                if fresh_identity {
                    // Same transaction recorded again under a new id: trust it fully
                    let replacement = Contribution::from_fields(fields, source, now_ms);
                    return replace(current, replacement);
                }
                overlay(current, fields, source, now_ms)
            }
            TxIdentity::Different => {
                if same_id {
                    overlay(current, fields, source, now_ms)
                } else if is_tracked(tracked, fields.tx_hash())
                    && !is_tracked(tracked, current.tx_hash())
                {
                    // Held state came from an address lookup before the
                    // tracked transaction was indexed
                    let replacement = Contribution::from_fields(fields, source, now_ms);
                    replace(current, replacement)
                } else {
                    MergeOutcome::Rejected(RejectReason::DifferentTransaction)
                }
            }
            TxIdentity::Unknown => match (&current.status, &fields.status) {
                (None, Some(_)) => overlay(current, fields, source, now_ms),
                (Some(held), Some(inbound)) => {
                    if inbound.priority() >= held.priority() {
                        overlay(current, fields, source, now_ms)
                    } else {
                        MergeOutcome::Rejected(lower_priority(held, inbound))
                    }
                }
                _ if same_id => overlay(current, fields, source, now_ms),
                _ => MergeOutcome::Rejected(RejectReason::NoCommonIdentity),
            },
        }
    }

    fn apply_bridge(&mut self, progress: &BridgeProgress, now_ms: u64) -> MergeOutcome {
        let Some(current) = self.current.as_mut() else {
            return MergeOutcome::Rejected(RejectReason::NoStateForBridge);
        };
        if !progress.is_meaningful() {
            return MergeOutcome::Rejected(RejectReason::EmptyBridgeUpdate);
        }
        if tx_identity(current.tx_hash(), non_empty(&progress.tx_hash)) == TxIdentity::Different {
            return MergeOutcome::Rejected(RejectReason::DifferentTransaction);
        }
        if let (Some(held), Some(inbound)) = (
            non_empty(&current.bridge_task_id),
            non_empty(&progress.task_id),
        ) {
            if held != inbound {
                return MergeOutcome::Rejected(RejectReason::DifferentTransaction);
            }
        }

        let mut candidate = current.clone();
        if let Some(eta) = progress.estimate_minutes() {
            candidate.estimated_time_minutes = Some(eta);
        }
        if let Some(elapsed) = progress.elapsed() {
            candidate.elapsed_minutes = Some(elapsed);
        }
        if let Some(status) = &progress.status {
            let accept = candidate
                .status_priority()
                .map_or(true, |held| status.priority() >= held);
            if accept {
                candidate.status = Some(status.clone());
            }
        }

        commit(current, candidate, UpdateSource::PushByBridge, now_ms)
    }
}

fn is_tracked(tracked: Option<&str>, hash: Option<&str>) -> bool {
    matches!((tracked, hash), (Some(t), Some(h)) if tx_hashes_match(t, h))
}

fn lower_priority(held: &ContributionStatus, inbound: &ContributionStatus) -> RejectReason {
    RejectReason::LowerPriority {
        current: held.to_string(),
        inbound: inbound.to_string(),
    }
}

/// Overlay with the monotonic status guard. An update ranking below the
/// held status is older news and may only fill gaps.
fn overlay(
    current: &mut Contribution,
    fields: &ContributionFields,
    source: UpdateSource,
    now_ms: u64,
) -> MergeOutcome {
    let stale = matches!(
        (current.status_priority(), &fields.status),
        (Some(held), Some(inbound)) if inbound.priority() < held
    );
    let mut candidate = current.clone();
    if stale {
        candidate.fill_missing(fields);
    } else {
        candidate.overlay(fields, false);
    }
    commit(current, candidate, source, now_ms)
}

fn replace(current: &mut Contribution, replacement: Contribution) -> MergeOutcome {
    if replacement.same_content(current) {
        return MergeOutcome::Unchanged;
    }
    *current = replacement;
    MergeOutcome::Applied
}

fn commit(
    current: &mut Contribution,
    mut candidate: Contribution,
    source: UpdateSource,
    now_ms: u64,
) -> MergeOutcome {
    if candidate.same_content(current) {
        return MergeOutcome::Unchanged;
    }
    candidate.last_updated_ms = now_ms;
    candidate.update_source = source;
    *current = candidate;
    MergeOutcome::Applied
}

#[cfg(test)]
mod tests {
    use super::*;
    use ContributionStatus::*;

    fn tx_update(hash: &str, status: ContributionStatus) -> StatusUpdate {
        StatusUpdate::Tx(ContributionFields {
            source_tx_hash: Some(hash.to_string()),
            status: Some(status),
            ..Default::default()
        })
    }

    fn pull_update(hash: &str, status: ContributionStatus) -> StatusUpdate {
        StatusUpdate::Pull {
            source: PullSource::ByHash,
            fields: ContributionFields {
                source_tx_hash: Some(hash.to_string()),
                status: Some(status),
                ..Default::default()
            },
        }
    }

    fn bridge(progress: BridgeProgress) -> StatusUpdate {
        StatusUpdate::Bridge(progress)
    }

    fn status_of(r: &Reconciler) -> Option<ContributionStatus> {
        r.current().and_then(|c| c.status.clone())
    }

    #[test]
    fn test_first_update_always_accepted() {
        let mut r = Reconciler::new();
        let outcome = r.apply(&tx_update("0xabc", Other("Weird".into())));
        assert_eq!(outcome, MergeOutcome::Applied);
        assert_eq!(status_of(&r), Some(Other("Weird".into())));
        assert_eq!(r.current().unwrap().update_source, UpdateSource::PushByTx);
    }

    #[test]
    fn test_no_regression_on_race() {
        // B (priority 2) then A (priority 3)
        let mut r = Reconciler::new();
        r.apply(&tx_update("0xabc", PendingBridge));
        r.apply(&tx_update("0xabc", Bridging));
        assert_eq!(status_of(&r), Some(Bridging));

        // A then B
        let mut r = Reconciler::new();
        r.apply(&tx_update("0xabc", Bridging));
        let outcome = r.apply(&tx_update("0xabc", PendingBridge));
        assert_eq!(outcome, MergeOutcome::Unchanged);
        assert_eq!(status_of(&r), Some(Bridging));
    }

    #[test]
    fn test_monotonic_status_with_failures_winning() {
        let sequence = [Detected, Claimable, Bridging, BridgeFailed, Claimed, Detected];
        let mut r = Reconciler::new();
        let mut max_seen = 0;
        for status in sequence {
            max_seen = max_seen.max(status.priority());
            r.apply(&tx_update("0xabc", status));
            assert_eq!(r.current().unwrap().status_priority(), Some(max_seen));
        }
        assert_eq!(status_of(&r), Some(BridgeFailed));
    }

    #[test]
    fn test_failure_overrides_any_order() {
        let mut r = Reconciler::new();
        r.apply(&tx_update("0xabc", SwapFailed));
        r.apply(&tx_update("0xabc", Claimed));
        assert_eq!(status_of(&r), Some(SwapFailed));

        let mut r = Reconciler::new();
        r.apply(&tx_update("0xabc", Claimed));
        r.apply(&tx_update("0xabc", Failed));
        assert_eq!(status_of(&r), Some(Failed));
    }

    #[test]
    fn test_idempotent_application() {
        let update = StatusUpdate::Wallet(ContributionFields {
            id: Some("c1".into()),
            source_tx_hash: Some("0xabc".into()),
            status: Some(Bridged),
            amount: Some(10.0),
            ..Default::default()
        });
        let mut r = Reconciler::new();
        assert_eq!(r.apply_at(&update, 100), MergeOutcome::Applied);
        let once = r.current().cloned().unwrap();

        assert_eq!(r.apply_at(&update, 200), MergeOutcome::Unchanged);
        let twice = r.current().cloned().unwrap();
        assert_eq!(once, twice);
        assert_eq!(twice.last_updated_ms, 100);
    }

    #[test]
    fn test_unrelated_transaction_isolated() {
        let mut r = Reconciler::new();
        r.apply(&tx_update("0xabc", Detected));

        let outcome = r.apply(&tx_update("0xdef", Claimed));
        assert_eq!(
            outcome,
            MergeOutcome::Rejected(RejectReason::DifferentTransaction)
        );
        assert_eq!(status_of(&r), Some(Detected));
        assert_eq!(r.current().unwrap().tx_hash(), Some("0xabc"));
    }

    #[test]
    fn test_different_hash_with_shared_id_is_accepted() {
        let mut r = Reconciler::new();
        r.apply(&StatusUpdate::Wallet(ContributionFields {
            id: Some("c1".into()),
            source_tx_hash: Some("0xabc".into()),
            status: Some(Detected),
            ..Default::default()
        }));
        let outcome = r.apply(&StatusUpdate::Wallet(ContributionFields {
            id: Some("c1".into()),
            source_tx_hash: Some("0xdef".into()),
            status: Some(Bridging),
            ..Default::default()
        }));
        assert_eq!(outcome, MergeOutcome::Applied);
        assert_eq!(status_of(&r), Some(Bridging));
    }

    #[test]
    fn test_fresh_identity_for_same_transaction_replaces() {
        let mut r = Reconciler::new();
        r.apply(&StatusUpdate::Tx(ContributionFields {
            id: Some("old".into()),
            source_tx_hash: Some("0xabc".into()),
            status: Some(Bridging),
            ..Default::default()
        }));
        let outcome = r.apply(&StatusUpdate::Tx(ContributionFields {
            id: Some("new".into()),
            source_tx_hash: Some("0xabc".into()),
            status: Some(Detected),
            ..Default::default()
        }));
        assert_eq!(outcome, MergeOutcome::Applied);
        assert_eq!(status_of(&r), Some(Detected));
        assert_eq!(r.current().unwrap().id.as_deref(), Some("new"));
    }

    #[test]
    fn test_same_transaction_refreshes_other_fields() {
        let mut r = Reconciler::new();
        r.apply(&tx_update("0xabc", Claimable));
        let outcome = r.apply(&StatusUpdate::Tx(ContributionFields {
            source_tx_hash: Some("0xABC".into()),
            status: Some(Bridged),
            contract_registered: Some(true),
            contract_tx_hash: Some("0xreg".into()),
            ..Default::default()
        }));
        assert_eq!(outcome, MergeOutcome::Applied);
        let held = r.current().unwrap();
        assert_eq!(held.status, Some(Claimable));
        assert!(held.contract_registered);
        assert_eq!(held.contract_tx_hash.as_deref(), Some("0xreg"));
    }

    #[test]
    fn test_lower_priority_update_only_fills_gaps() {
        let mut r = Reconciler::new();
        r.apply(&StatusUpdate::Tx(ContributionFields {
            source_tx_hash: Some("0xabc".into()),
            status: Some(Claimable),
            amount: Some(10.0),
            bridge_task_id: Some("task-2".into()),
            contract_tx_hash: Some("0xreg".into()),
            created_at: Some("2024-05-02T00:00:00Z".into()),
            ..Default::default()
        }));

        let outcome = r.apply(&StatusUpdate::Pull {
            source: PullSource::ByHash,
            fields: ContributionFields {
                source_tx_hash: Some("0xabc".into()),
                status: Some(Bridging),
                amount: Some(7.5),
                usd_value: Some(30.0),
                bridge_task_id: Some("task-1".into()),
                contract_tx_hash: Some("0xold".into()),
                created_at: Some("2024-05-01T00:00:00Z".into()),
                ..Default::default()
            },
        });
        assert_eq!(outcome, MergeOutcome::Applied);
        let held = r.current().unwrap();
        assert_eq!(held.status, Some(Claimable));
        assert_eq!(held.amount, Some(10.0));
        assert_eq!(held.bridge_task_id.as_deref(), Some("task-2"));
        assert_eq!(held.contract_tx_hash.as_deref(), Some("0xreg"));
        assert_eq!(held.created_at.as_deref(), Some("2024-05-02T00:00:00Z"));
        assert_eq!(held.usd_value, Some(30.0));
    }

    #[test]
    fn test_tracked_transaction_displaces_fallback_entry() {
        let mut r = Reconciler::tracking(Some("0xnew".into()));
        r.apply(&StatusUpdate::Pull {
            source: PullSource::BySender,
            fields: ContributionFields {
                id: Some("c-old".into()),
                source_tx_hash: Some("0xold".into()),
                status: Some(Claimed),
                ..Default::default()
            },
        });
        assert_eq!(r.current().unwrap().tx_hash(), Some("0xold"));

        let outcome = r.apply(&tx_update("0xNEW", Detected));
        assert_eq!(outcome, MergeOutcome::Applied);
        let held = r.current().unwrap();
        assert_eq!(held.tx_hash(), Some("0xNEW"));
        assert_eq!(held.status, Some(Detected));
        assert_eq!(held.id, None);

        // Back on the tracked transaction, the fallback entry is foreign again
        assert_eq!(
            r.apply(&tx_update("0xold", Claimed)),
            MergeOutcome::Rejected(RejectReason::DifferentTransaction)
        );
        assert_eq!(status_of(&r), Some(Detected));
    }

    #[test]
    fn test_untracked_session_keeps_first_transaction() {
        let mut r = Reconciler::tracking(None);
        r.apply(&tx_update("0xabc", Detected));
        assert_eq!(
            r.apply(&tx_update("0xdef", Claimed)),
            MergeOutcome::Rejected(RejectReason::DifferentTransaction)
        );
    }

    #[test]
    fn test_status_priority_when_hash_unknown() {
        let mut r = Reconciler::new();
        r.apply(&StatusUpdate::Wallet(ContributionFields {
            id: Some("c1".into()),
            status: Some(Bridging),
            ..Default::default()
        }));

        let lower = StatusUpdate::Wallet(ContributionFields {
            id: Some("c2".into()),
            status: Some(Detected),
            ..Default::default()
        });
        assert!(matches!(
            r.apply(&lower),
            MergeOutcome::Rejected(RejectReason::LowerPriority { .. })
        ));

        let higher = pull_update("0xabc", Bridged);
        assert_eq!(r.apply(&higher), MergeOutcome::Applied);
        assert_eq!(r.current().unwrap().tx_hash(), Some("0xabc"));
        assert_eq!(r.current().unwrap().update_source, UpdateSource::PullByHash);
    }

    #[test]
    fn test_unknown_status_only_accepted_without_state() {
        let mut r = Reconciler::new();
        r.apply(&StatusUpdate::Wallet(ContributionFields {
            status: Some(Detected),
            ..Default::default()
        }));
        let outcome = r.apply(&StatusUpdate::Wallet(ContributionFields {
            status: Some(Other("Mystery".into())),
            ..Default::default()
        }));
        assert!(matches!(
            outcome,
            MergeOutcome::Rejected(RejectReason::LowerPriority { .. })
        ));
    }

    #[test]
    fn test_statusless_update_needs_shared_id() {
        let mut r = Reconciler::new();
        r.apply(&StatusUpdate::Wallet(ContributionFields {
            id: Some("c1".into()),
            status: Some(Detected),
            ..Default::default()
        }));

        let stranger = StatusUpdate::Wallet(ContributionFields {
            id: Some("c9".into()),
            amount: Some(5.0),
            ..Default::default()
        });
        assert_eq!(
            r.apply(&stranger),
            MergeOutcome::Rejected(RejectReason::NoCommonIdentity)
        );

        let sibling = StatusUpdate::Wallet(ContributionFields {
            id: Some("c1".into()),
            amount: Some(5.0),
            ..Default::default()
        });
        assert_eq!(r.apply(&sibling), MergeOutcome::Applied);
        assert_eq!(r.current().unwrap().amount, Some(5.0));
        assert_eq!(status_of(&r), Some(Detected));
    }

    #[test]
    fn test_bridge_estimate_leaves_status() {
        let mut r = Reconciler::new();
        r.apply(&tx_update("0xabc", PendingBridge));

        let outcome = r.apply(&bridge(BridgeProgress {
            estimated_time_seconds: Some(EstimatedSeconds { avg: Some(300.0) }),
            ..Default::default()
        }));
        assert_eq!(outcome, MergeOutcome::Applied);
        let held = r.current().unwrap();
        assert_eq!(held.estimated_time_minutes, Some(5));
        assert_eq!(held.status, Some(PendingBridge));
        assert_eq!(held.update_source, UpdateSource::PushByBridge);
    }

    #[test]
    fn test_bridge_status_follows_priority() {
        let mut r = Reconciler::new();
        r.apply(&tx_update("0xabc", Bridged));

        r.apply(&bridge(BridgeProgress {
            status: Some(Bridging),
            estimated_total: Some(4.0),
            ..Default::default()
        }));
        assert_eq!(status_of(&r), Some(Bridged));
        assert_eq!(r.current().unwrap().estimated_time_minutes, Some(4));

        r.apply(&bridge(BridgeProgress {
            status: Some(BridgeFailed),
            ..Default::default()
        }));
        assert_eq!(status_of(&r), Some(BridgeFailed));
    }

    #[test]
    fn test_bridge_update_rejections() {
        let mut r = Reconciler::new();
        assert_eq!(
            r.apply(&bridge(BridgeProgress {
                estimated_total: Some(3.0),
                ..Default::default()
            })),
            MergeOutcome::Rejected(RejectReason::NoStateForBridge)
        );

        r.apply(&tx_update("0xabc", PendingBridge));
        assert_eq!(
            r.apply(&bridge(BridgeProgress {
                elapsed_minutes: Some(2.0),
                ..Default::default()
            })),
            MergeOutcome::Rejected(RejectReason::EmptyBridgeUpdate)
        );
        assert_eq!(
            r.apply(&bridge(BridgeProgress {
                status: Some(Bridged),
                tx_hash: Some("0xother".into()),
                ..Default::default()
            })),
            MergeOutcome::Rejected(RejectReason::DifferentTransaction)
        );
        assert_eq!(status_of(&r), Some(PendingBridge));
        assert_eq!(r.current().unwrap().elapsed_minutes, None);
    }

    #[test]
    fn test_bridge_update_for_other_task_rejected() {
        let mut r = Reconciler::new();
        r.apply(&StatusUpdate::Wallet(ContributionFields {
            source_tx_hash: Some("0xabc".into()),
            status: Some(Bridging),
            bridge_task_id: Some("task-1".into()),
            ..Default::default()
        }));

        let foreign = bridge(BridgeProgress {
            status: Some(BridgeFailed),
            task_id: Some("task-2".into()),
            ..Default::default()
        });
        assert_eq!(
            r.apply(&foreign),
            MergeOutcome::Rejected(RejectReason::DifferentTransaction)
        );
        assert_eq!(status_of(&r), Some(Bridging));

        let own = bridge(BridgeProgress {
            estimated_total: Some(6.0),
            task_id: Some("task-1".into()),
            ..Default::default()
        });
        assert_eq!(r.apply(&own), MergeOutcome::Applied);
        assert_eq!(r.current().unwrap().estimated_time_minutes, Some(6));
    }

    #[test]
    fn test_reset_clears_state() {
        let mut r = Reconciler::new();
        r.apply(&tx_update("0xabc", Detected));
        r.reset();
        assert!(r.current().is_none());
    }
}
