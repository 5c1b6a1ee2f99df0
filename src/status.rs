//! Mapping of test finish states onto the service's status vocabulary.
//!
//! The test runner reports one of a small set of finish states; the
//! service stores integer status codes. The table is fixed:
//!
//! | Finish state | Service status | Code |
//! |--------------|----------------|------|
//! | `passed`     | Passed         | 1    |
//! | `failed`     | Failed         | 5    |
//! | `skipped`    | Blocked        | 2    |
//!
//! Skipped tests are reported as blocked. Anything else (including
//! [`FinishState::Error`]) is rejected with [`StatusError::UnmappedOutcome`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Errors raised while mapping a finish state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StatusError {
    /// The finish state has no entry in the status table.
    #[error("No service status for test outcome '{0}'")]
    UnmappedOutcome(String),
}

/// Result type for status mapping.
pub type StatusResult<T> = Result<T, StatusError>;

/// How a test invocation finished, as reported by the test runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinishState {
    /// All assertions succeeded.
    Passed,

    /// An assertion failed.
    Failed,

    /// The test was not run.
    Skipped,

    /// The test crashed outside of its assertions (fixtures, setup).
    Error,
}

impl FinishState {
    /// Returns the lowercase name used by the test runner.
    pub fn as_str(&self) -> &'static str {
        match self {
            FinishState::Passed => "passed",
            FinishState::Failed => "failed",
            FinishState::Skipped => "skipped",
            FinishState::Error => "error",
        }
    }
}

impl fmt::Display for FinishState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FinishState {
    type Err = StatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "passed" => Ok(FinishState::Passed),
            "failed" => Ok(FinishState::Failed),
            "skipped" => Ok(FinishState::Skipped),
            "error" => Ok(FinishState::Error),
            other => Err(StatusError::UnmappedOutcome(other.to_string())),
        }
    }
}

/// A result status as stored by the test management service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum ServiceStatus {
    Passed = 1,
    Blocked = 2,
    Untested = 3,
    Retest = 4,
    Failed = 5,
}

impl ServiceStatus {
    /// Returns the numeric `status_id` sent over the wire.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Looks up a status by its numeric code.
    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            1 => Some(ServiceStatus::Passed),
            2 => Some(ServiceStatus::Blocked),
            3 => Some(ServiceStatus::Untested),
            4 => Some(ServiceStatus::Retest),
            5 => Some(ServiceStatus::Failed),
            _ => None,
        }
    }
}

impl From<ServiceStatus> for u8 {
    fn from(status: ServiceStatus) -> Self {
        status.code()
    }
}

impl TryFrom<u8> for ServiceStatus {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        ServiceStatus::from_code(u64::from(code)).ok_or_else(|| format!("unknown status_id {code}"))
    }
}

/// Maps a finish state onto its service status.
pub fn status_for(state: FinishState) -> StatusResult<ServiceStatus> {
    match state {
        FinishState::Passed => Ok(ServiceStatus::Passed),
        FinishState::Failed => Ok(ServiceStatus::Failed),
        FinishState::Skipped => Ok(ServiceStatus::Blocked),
        FinishState::Error => Err(StatusError::UnmappedOutcome(state.to_string())),
    }
}

/// Maps a finish state given by name, e.g. `"passed"`.
pub fn status_for_name(name: &str) -> StatusResult<ServiceStatus> {
    status_for(name.parse()?)
}
