//! Case-id tagging of collected tests.
//!
//! Tests are linked to service cases through a marker carrying one or
//! more case references such as `"C1234"`. The session only needs two
//! things from the host's test items: the case ids of the closest marker
//! and a way to mark the item as skipped. Both are expressed by
//! [`TaggedTest`].

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::results::CaseId;

static CASE_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?P<id>[0-9]+)$").expect("valid case id pattern"));

/// Errors raised while reading case markers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarkerError {
    /// The reference does not end with a case number.
    #[error("Invalid case reference '{0}': expected a trailing case number")]
    InvalidCaseId(String),
}

/// Result type for marker parsing.
pub type MarkerResult<T> = Result<T, MarkerError>;

/// Parses a case reference such as `"C1234"` or `"1234"` into its number.
pub fn parse_case_id(reference: &str) -> MarkerResult<CaseId> {
    let reference = reference.trim();
    CASE_ID_RE
        .captures(reference)
        .and_then(|caps| caps.name("id"))
        .and_then(|m| m.as_str().parse().ok())
        .ok_or_else(|| MarkerError::InvalidCaseId(reference.to_string()))
}

/// Parses every reference of a marker, preserving order.
pub fn parse_case_ids<S: AsRef<str>>(references: &[S]) -> MarkerResult<Vec<CaseId>> {
    references
        .iter()
        .map(|r| parse_case_id(r.as_ref()))
        .collect()
}

/// A collected test item as seen by the session.
pub trait TaggedTest {
    /// Host identifier of the test, used in log lines.
    fn node_id(&self) -> &str;

    /// Case ids of the closest case marker, or `None` when untagged.
    fn closest_marker(&self) -> Option<&[CaseId]>;

    /// Asks the host to skip this test.
    fn mark_skipped(&mut self, reason: &str);
}

/// A plain collected test item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectedTest {
    /// Host identifier, e.g. `tests/test_login.py::test_ok`.
    pub id: String,

    /// Case ids from the marker, if the test is tagged.
    #[serde(default)]
    pub case_ids: Option<Vec<CaseId>>,

    /// Reason given when the test was marked skipped.
    #[serde(default)]
    pub skip_reason: Option<String>,
}

impl CollectedTest {
    /// Creates an untagged test item.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Tags the item with case ids.
    pub fn with_cases(mut self, case_ids: impl IntoIterator<Item = CaseId>) -> Self {
        self.case_ids = Some(case_ids.into_iter().collect());
        self
    }

    /// Tags the item from raw marker references such as `"C1234"`.
    pub fn with_marker<S: AsRef<str>>(self, references: &[S]) -> MarkerResult<Self> {
        Ok(self.with_cases(parse_case_ids(references)?))
    }

    /// Returns true if the item was marked skipped.
    pub fn is_skipped(&self) -> bool {
        self.skip_reason.is_some()
    }
}

impl TaggedTest for CollectedTest {
    fn node_id(&self) -> &str {
        &self.id
    }

    fn closest_marker(&self) -> Option<&[CaseId]> {
        self.case_ids.as_deref()
    }

    fn mark_skipped(&mut self, reason: &str) {
        self.skip_reason = Some(reason.to_string());
    }
}
