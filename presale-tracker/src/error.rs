// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;
use thiserror::Error;

/// Result type for collaborator channel operations
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Errors raised by the push channel or the status query service.
///
/// These never reach tracker callers; the tracker logs them and retries.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Unexpected HTTP status {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Push connect failed: {0}")]
    Connect(String),

    #[error("Invalid endpoint {url}: {reason}")]
    InvalidEndpoint { url: String, reason: String },

    #[error("No endpoints configured")]
    NoEndpoints,
}

impl From<serde_json::Error> for ChannelError {
    fn from(e: serde_json::Error) -> Self {
        ChannelError::Decode(e.to_string())
    }
}

/// Errors surfaced to tracker callers
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TrackerError {
    // No identifying parameter was given, or stop() already ran
    #[error("Tracker is not running")]
    NotRunning,

    // The request was dropped because the tracker stopped or changed identity
    #[error("Tracker stopped before the request completed")]
    Cancelled,

    // Caller-level give-up timeout expired without any contribution
    #[error("No contribution found within {0:?}")]
    NotFound(Duration),
}
