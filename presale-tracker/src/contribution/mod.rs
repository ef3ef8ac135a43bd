// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Contribution Module
//!
//! Holds the in-memory view of one presale contribution and the merge rule
//! that reconciles racing updates:
//! - Typed wire payloads for push events, bridge progress and status queries
//! - Status priority table (failures always win)
//! - A single [`Reconciler`] that every update passes through
//!
//! ## Update flow
//!
//! ```text
//!  push (wallet / tx / bridge)      pull (hash / sender / wallet)
//!            │                                 │
//!            └──────────► StatusUpdate ◄───────┘
//!                              │
//!                              ▼
//!                  ┌───────────────────────┐
//!                  │ Reconciler::apply     │
//!                  │  priority + identity  │
//!                  └───────────┬───────────┘
//!                              │ Applied
//!                              ▼
//!                       current snapshot
//! ```

mod merge;
mod status;
mod types;

pub use merge::{MergeOutcome, Reconciler, RejectReason};
pub use status::{ContributionStatus, FAILURE_PRIORITY};
pub use types::*;
