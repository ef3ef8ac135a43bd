// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Mock collaborators for unit tests

use crate::channels::{HashLookup, StatusQuery};
use crate::contribution::ContributionFields;
use crate::error::{ChannelError, ChannelResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// In-memory status service with call counters
#[derive(Debug, Default)]
pub struct MockStatusQuery {
    by_hash: Mutex<HashMap<String, ContributionFields>>,
    by_wallet: Mutex<HashMap<String, Vec<ContributionFields>>>,
    hash_calls: AtomicUsize,
    wallet_calls: AtomicUsize,
    failing: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl MockStatusQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_hash(&self, tx_hash: &str, fields: ContributionFields) {
        self.by_hash
            .lock()
            .unwrap()
            .insert(tx_hash.to_string(), fields);
    }

    pub fn set_wallet(&self, address: &str, entries: Vec<ContributionFields>) {
        self.by_wallet
            .lock()
            .unwrap()
            .insert(address.to_string(), entries);
    }

    pub fn fail_requests(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Delay every response (tokio time, so paused clocks apply)
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn hash_calls(&self) -> usize {
        self.hash_calls.load(Ordering::SeqCst)
    }

    pub fn wallet_calls(&self) -> usize {
        self.wallet_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.hash_calls() + self.wallet_calls()
    }

    async fn respond(&self) -> ChannelResult<()> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(ChannelError::Request("mock failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl StatusQuery for MockStatusQuery {
    async fn status_by_hash(&self, tx_hash: &str) -> ChannelResult<HashLookup> {
        self.hash_calls.fetch_add(1, Ordering::SeqCst);
        self.respond().await?;
        let found = self.by_hash.lock().unwrap().get(tx_hash).cloned();
        Ok(found.map(HashLookup::found).unwrap_or_default())
    }

    async fn contributions_by_wallet(
        &self,
        address: &str,
    ) -> ChannelResult<Vec<ContributionFields>> {
        self.wallet_calls.fetch_add(1, Ordering::SeqCst);
        self.respond().await?;
        Ok(self
            .by_wallet
            .lock()
            .unwrap()
            .get(address)
            .cloned()
            .unwrap_or_default())
    }
}
