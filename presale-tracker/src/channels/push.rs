// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Push channel contract and event decoding

use crate::contribution::{BridgeProgress, ContributionFields, StatusUpdate};
use crate::error::{ChannelError, ChannelResult};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt::{self, Debug};

/// Event tag on wallet-scoped pushes
pub const WALLET_EVENT: &str = "contribution-update";
/// Event tag on transaction-scoped pushes
pub const TX_EVENT: &str = "status-update";

/// Subscription key on the push channel
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    Wallet(String),
    Tx(String),
    BridgeTask(String),
}

impl Topic {
    pub fn kind(&self) -> &'static str {
        match self {
            Topic::Wallet(_) => "wallet",
            Topic::Tx(_) => "tx",
            Topic::BridgeTask(_) => "bridge-task",
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Topic::Wallet(k) | Topic::Tx(k) | Topic::BridgeTask(k) => k,
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.key())
    }
}

/// Raw event delivered on a subscribed topic
#[derive(Debug, Clone, PartialEq)]
pub struct PushMessage {
    pub topic: Topic,
    pub payload: Value,
}

impl PushMessage {
    pub fn new(topic: Topic, payload: Value) -> Self {
        Self { topic, payload }
    }

    /// Decode into the tagged update for this topic kind.
    ///
    /// Wallet and tx events may omit the `event` tag; when present it must
    /// match the topic kind.
    pub fn decode(&self) -> ChannelResult<StatusUpdate> {
        match &self.topic {
            Topic::Wallet(_) => {
                check_event_tag(&self.payload, WALLET_EVENT)?;
                let fields: ContributionFields = serde_json::from_value(self.payload.clone())?;
                Ok(StatusUpdate::Wallet(fields))
            }
            Topic::Tx(_) => {
                check_event_tag(&self.payload, TX_EVENT)?;
                let fields: ContributionFields = serde_json::from_value(self.payload.clone())?;
                Ok(StatusUpdate::Tx(fields))
            }
            Topic::BridgeTask(task_id) => {
                let mut progress: BridgeProgress = serde_json::from_value(self.payload.clone())?;
                progress.task_id = Some(task_id.clone());
                Ok(StatusUpdate::Bridge(progress))
            }
        }
    }
}

fn check_event_tag(payload: &Value, expected: &str) -> ChannelResult<()> {
    if !payload.is_object() {
        return Err(ChannelError::Decode("payload is not an object".to_string()));
    }
    match payload.get("event").and_then(Value::as_str) {
        None => Ok(()),
        Some(tag) if tag == expected => Ok(()),
        Some(tag) => Err(ChannelError::Decode(format!(
            "unexpected event '{}', wanted '{}'",
            tag, expected
        ))),
    }
}

/// A server-initiated update stream.
///
/// One connection multiplexes any number of topic subscriptions.
#[async_trait]
pub trait PushChannel: Send + Sync + Debug {
    /// Open a new connection
    async fn connect(&self) -> ChannelResult<Box<dyn PushConnection>>;

    /// Channel name for logging
    fn name(&self) -> &str;
}

/// One open push connection
#[async_trait]
pub trait PushConnection: Send {
    /// Register interest in a topic
    async fn subscribe(&mut self, topic: &Topic) -> ChannelResult<()>;

    /// Next event on any subscribed topic. `None` once the connection is gone.
    async fn next_message(&mut self) -> Option<PushMessage>;

    /// Release the connection
    async fn close(&mut self);
}
