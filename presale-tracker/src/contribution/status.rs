// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Contribution lifecycle statuses and their merge priority

use serde::{Deserialize, Serialize};
use std::fmt;

/// Priority shared by every failure status. Failures always win a merge.
pub const FAILURE_PRIORITY: u32 = 100;

/// Lifecycle status of a presale contribution as reported by the backend.
///
/// The ordering is only used to break ties between racing updates; it does
/// not validate transitions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ContributionStatus {
    Detected,
    PendingBridge,
    Bridging,
    Bridged,
    RegistrationPending,
    Claimable,
    Claimed,
    Failed,
    BridgeFailed,
    SwapFailed,
    /// Any status string the backend sends that we do not know about
    Other(String),
}

impl ContributionStatus {
    /// Merge priority. Unknown statuses rank lowest.
    pub fn priority(&self) -> u32 {
        match self {
            ContributionStatus::Detected => 1,
            ContributionStatus::PendingBridge => 2,
            ContributionStatus::Bridging => 3,
            ContributionStatus::Bridged => 4,
            ContributionStatus::RegistrationPending => 5,
            ContributionStatus::Claimable => 6,
            ContributionStatus::Claimed => 7,
            ContributionStatus::Failed
            | ContributionStatus::BridgeFailed
            | ContributionStatus::SwapFailed => FAILURE_PRIORITY,
            ContributionStatus::Other(_) => 0,
        }
    }

    /// Wire label, e.g. `"Pending Bridge"`
    pub fn as_str(&self) -> &str {
        match self {
            ContributionStatus::Detected => "Detected",
            ContributionStatus::PendingBridge => "Pending Bridge",
            ContributionStatus::Bridging => "Bridging",
            ContributionStatus::Bridged => "Bridged",
            ContributionStatus::RegistrationPending => "Registration Pending",
            ContributionStatus::Claimable => "Claimable",
            ContributionStatus::Claimed => "Claimed",
            ContributionStatus::Failed => "Failed",
            ContributionStatus::BridgeFailed => "Bridge Failed",
            ContributionStatus::SwapFailed => "Swap Failed",
            ContributionStatus::Other(s) => s.as_str(),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.priority() == FAILURE_PRIORITY
    }

    /// No further progress is expected without operator action.
    pub fn is_terminal(&self) -> bool {
        self.is_failure() || *self == ContributionStatus::Claimed
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, ContributionStatus::Other(_))
    }

    /// Short user-facing explanation of the status
    pub fn describe(&self) -> &'static str {
        match self {
            ContributionStatus::Detected => "Payment detected on the source chain",
            ContributionStatus::PendingBridge => "Waiting to be bridged to XDC",
            ContributionStatus::Bridging => "Bridging funds to XDC",
            ContributionStatus::Bridged => "Funds arrived on XDC",
            ContributionStatus::RegistrationPending => "Registering your allocation on-chain",
            ContributionStatus::Claimable => "Tokens are ready to claim",
            ContributionStatus::Claimed => "Tokens claimed",
            ContributionStatus::Failed
            | ContributionStatus::BridgeFailed
            | ContributionStatus::SwapFailed => {
                "Processing failed, please contact support with your transaction hash"
            }
            ContributionStatus::Other(_) => "Status unknown",
        }
    }
}

impl From<&str> for ContributionStatus {
    fn from(value: &str) -> Self {
        let normalized: String = value
            .trim()
            .chars()
            .filter(|c| !matches!(c, ' ' | '_' | '-'))
            .flat_map(char::to_lowercase)
            .collect();
        match normalized.as_str() {
            "detected" => ContributionStatus::Detected,
            "pendingbridge" => ContributionStatus::PendingBridge,
            "bridging" => ContributionStatus::Bridging,
            "bridged" => ContributionStatus::Bridged,
            "registrationpending" => ContributionStatus::RegistrationPending,
            "claimable" => ContributionStatus::Claimable,
            "claimed" => ContributionStatus::Claimed,
            "failed" => ContributionStatus::Failed,
            "bridgefailed" => ContributionStatus::BridgeFailed,
            "swapfailed" => ContributionStatus::SwapFailed,
            _ => ContributionStatus::Other(value.trim().to_string()),
        }
    }
}

impl From<String> for ContributionStatus {
    fn from(value: String) -> Self {
        ContributionStatus::from(value.as_str())
    }
}

impl From<ContributionStatus> for String {
    fn from(status: ContributionStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for ContributionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
