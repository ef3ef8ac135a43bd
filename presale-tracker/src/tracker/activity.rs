// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Last-accepted-update clock gating the poll task.
//!
//! Uses tokio's clock so paused-time tests drive it.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Shared between the merge consumer (writer) and the poll task (reader)
#[derive(Debug, Clone, Default)]
pub(crate) struct ActivityClock {
    last_accepted: Arc<RwLock<Option<Instant>>>,
}

impl ActivityClock {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Note an accepted update observed at `at`. Never moves the clock back.
    pub(crate) async fn record(&self, at: Instant) {
        let mut last = self.last_accepted.write().await;
        if last.map_or(true, |prev| at > prev) {
            *last = Some(at);
        }
    }

    /// Whether an update was accepted less than `window` ago
    pub(crate) async fn accepted_within(&self, window: Duration) -> bool {
        let last = self.last_accepted.read().await;
        match *last {
            Some(at) => at.elapsed() < window,
            None => false,
        }
    }
}
