// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Caller-level give-up timeout

use crate::contribution::Contribution;
use crate::error::TrackerError;
use crate::tracker::TrackerHandle;
use std::time::Duration;
use tracing::warn;

/// Wait until the tracker holds a contribution.
///
/// Stops the tracker and returns [`TrackerError::NotFound`] when nothing
/// turns up within `give_up_after`.
pub async fn await_contribution(
    handle: &TrackerHandle,
    give_up_after: Duration,
) -> Result<Contribution, TrackerError> {
    await_status(handle, give_up_after, |_| true).await
}

/// Wait until the held contribution satisfies `done`, e.g. reaches a
/// terminal status. Same give-up behavior as [`await_contribution`].
pub async fn await_status<F>(
    handle: &TrackerHandle,
    give_up_after: Duration,
    mut done: F,
) -> Result<Contribution, TrackerError>
where
    F: FnMut(&Contribution) -> bool,
{
    let mut watch = handle.subscribe();
    let wait = async {
        loop {
            if let Some(contribution) = watch.take_current() {
                if done(&contribution) {
                    return Ok(contribution);
                }
            }
            if !handle.is_running().await {
                return Err(TrackerError::NotRunning);
            }
            if !watch.changed().await {
                return Err(TrackerError::Cancelled);
            }
        }
    };

    match tokio::time::timeout(give_up_after, wait).await {
        Ok(result) => result,
        Err(_) => {
            warn!(
                "[ContributionTracker] Giving up after {:?}, stopping tracker",
                give_up_after
            );
            handle.stop().await;
            Err(TrackerError::NotFound(give_up_after))
        }
    }
}
