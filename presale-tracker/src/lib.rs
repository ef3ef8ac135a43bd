// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

#![allow(clippy::new_without_default)]

pub mod channels;
pub mod config;
pub mod contribution;
pub mod error;
pub mod failover;
pub mod metrics;
pub mod timeout;
pub mod tracker;
pub mod wallet_probe;

#[cfg(test)]
pub mod test_utils;

pub use config::TrackerConfig;
pub use contribution::{Contribution, ContributionStatus};
pub use error::{ChannelError, TrackerError};
pub use metrics::TrackerMetrics;
pub use tracker::{
    ContributionTracker, ContributionWatch, RefetchOutcome, TrackParams, TrackerHandle,
};
