// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! In-process push channel
//!
//! A broadcast-backed pub/sub hub. Transport adapters (a socket client, a
//! webhook receiver, a test) publish raw events into the hub and every
//! connection subscribed to the matching topic receives them.

use super::push::{PushChannel, PushConnection, PushMessage, Topic};
use crate::error::ChannelResult;
#[cfg(test)]
use crate::error::ChannelError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug)]
struct HubInner {
    name: String,
    sender: broadcast::Sender<PushMessage>,
    /// Cancelled to drop every live connection at once
    generation: Mutex<CancellationToken>,
    connects: AtomicUsize,
    /// Every subscribe call, in order
    subscriptions: Mutex<Vec<Topic>>,
    #[cfg(test)]
    failing_connects: AtomicUsize,
}

/// Cloneable handle to an in-process push hub
#[derive(Debug, Clone)]
pub struct LocalPushHub {
    inner: Arc<HubInner>,
}

impl LocalPushHub {
    pub fn new(name: &str) -> Self {
        Self::with_capacity(name, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(name: &str, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(HubInner {
                name: name.to_string(),
                sender,
                generation: Mutex::new(CancellationToken::new()),
                connects: AtomicUsize::new(0),
                subscriptions: Mutex::new(Vec::new()),
                #[cfg(test)]
                failing_connects: AtomicUsize::new(0),
            }),
        }
    }

    /// Publish an event on a topic. Returns the number of live connections
    /// that saw it (subscribed or not).
    pub fn publish(&self, topic: Topic, payload: Value) -> usize {
        debug!("[{}] Publish on {}", self.inner.name, topic);
        self.inner
            .sender
            .send(PushMessage::new(topic, payload))
            .unwrap_or(0)
    }

    /// Drop every open connection, as a server restart would
    pub fn disconnect_all(&self) {
        let mut generation = self
            .inner
            .generation
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        generation.cancel();
        *generation = CancellationToken::new();
        warn!("[{}] All connections dropped", self.inner.name);
    }

    /// Total successful connects so far
    pub fn connect_count(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    /// Every subscribe call seen so far, in order
    pub fn subscription_log(&self) -> Vec<Topic> {
        self.inner
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// How many times a topic was subscribed
    pub fn subscription_count(&self, topic: &Topic) -> usize {
        self.subscription_log()
            .iter()
            .filter(|t| *t == topic)
            .count()
    }

    /// Make the next `n` connect attempts fail
    #[cfg(test)]
    pub fn fail_next_connects(&self, n: usize) {
        self.inner.failing_connects.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl PushChannel for LocalPushHub {
    async fn connect(&self) -> ChannelResult<Box<dyn PushConnection>> {
        #[cfg(test)]
        {
            let failing = self.inner.failing_connects.load(Ordering::SeqCst);
            if failing > 0 {
                self.inner
                    .failing_connects
                    .store(failing - 1, Ordering::SeqCst);
                return Err(ChannelError::Connect("injected failure".to_string()));
            }
        }

        let closed = self
            .inner
            .generation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        self.inner.connects.fetch_add(1, Ordering::SeqCst);
        debug!("[{}] New connection", self.inner.name);

        Ok(Box::new(LocalConnection {
            hub: self.inner.clone(),
            receiver: self.inner.sender.subscribe(),
            topics: HashSet::new(),
            closed,
        }))
    }

    fn name(&self) -> &str {
        &self.inner.name
    }
}

struct LocalConnection {
    hub: Arc<HubInner>,
    receiver: broadcast::Receiver<PushMessage>,
    topics: HashSet<Topic>,
    closed: CancellationToken,
}

#[async_trait]
impl PushConnection for LocalConnection {
    async fn subscribe(&mut self, topic: &Topic) -> ChannelResult<()> {
        self.hub
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(topic.clone());
        self.topics.insert(topic.clone());
        Ok(())
    }

    async fn next_message(&mut self) -> Option<PushMessage> {
        loop {
            let received = tokio::select! {
                _ = self.closed.cancelled() => return None,
                received = self.receiver.recv() => received,
            };
            match received {
                Ok(msg) if self.topics.contains(&msg.topic) => return Some(msg),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        "[{}] Connection lagged, {} events skipped",
                        self.hub.name, skipped
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    async fn close(&mut self) {
        self.topics.clear();
        self.closed.cancel();
    }
}
