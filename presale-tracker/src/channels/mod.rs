// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Update channels feeding the tracker
//!
//! - Push: [`PushChannel`] / [`PushConnection`], with [`LocalPushHub`] as the
//!   in-process implementation transport adapters publish into
//! - Pull: [`StatusQuery`], with [`HttpStatusQuery`] talking to the backend
//!   and [`lookup_contribution`] running the tiered lookup

mod http_query;
mod local_hub;
mod push;
mod query;

pub use http_query::HttpStatusQuery;
pub use local_hub::LocalPushHub;
pub use push::{PushChannel, PushConnection, PushMessage, Topic, TX_EVENT, WALLET_EVENT};
pub use query::{
    lookup_contribution, select_entry, ContributionList, HashLookup, LookupKeys, StatusQuery,
};
