//! Collection of per-case outcomes and their projection into submissions.
//!
//! Outcomes are appended to a [`ResultBuffer`] while tests run and are
//! turned into [`PublishableResult`]s once, at publish time.
//!
//! ```text
//!   record(case_ids, status, comment, duration)
//!        │   one Outcome per case id
//!        ▼
//!   ResultBuffer ──── project(&ResultProjection) ───► Vec<PublishableResult>
//!                                                          │
//!                                            sort_for_submission()
//!                                                          ▼
//!                                                      Publisher
//! ```

use std::time::Duration;

use serde_json::{Value, json};

use crate::comment::{DEFAULT_COMMENT_LIMIT, format_comment};
use crate::status::ServiceStatus;

/// Identifier of a test case in the service.
pub type CaseId = u64;

/// One raw outcome of one case, as recorded during the run.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    /// Case the outcome belongs to.
    pub case_id: CaseId,

    /// Service status of the invocation.
    pub status: ServiceStatus,

    /// Failure representation; empty when the test passed.
    pub comment: String,

    /// Wall-clock time of the test call.
    pub duration: Duration,
}

/// Append-only log of outcomes for one test session.
///
/// Nothing is deduplicated: recording the same case twice keeps both
/// entries and both are submitted.
#[derive(Debug, Default)]
pub struct ResultBuffer {
    outcomes: Vec<Outcome>,
}

impl ResultBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one outcome per case id, all sharing status, comment and duration.
    pub fn record(
        &mut self,
        case_ids: &[CaseId],
        status: ServiceStatus,
        comment: &str,
        duration: Duration,
    ) {
        self.outcomes
            .extend(case_ids.iter().map(|&case_id| Outcome {
                case_id,
                status,
                comment: comment.to_string(),
                duration,
            }));
    }

    /// Returns the recorded outcomes in recording order.
    pub fn outcomes(&self) -> &[Outcome] {
        &self.outcomes
    }

    /// Returns the number of recorded outcomes.
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Projects every outcome into a submission.
    pub fn project(&self, projection: &ResultProjection) -> Vec<PublishableResult> {
        self.outcomes
            .iter()
            .map(|outcome| PublishableResult::from_outcome(outcome, projection))
            .collect()
    }
}

/// Session-wide settings applied when projecting outcomes.
#[derive(Debug, Clone)]
pub struct ResultProjection {
    /// Maximum trace characters kept in a comment.
    pub comment_limit: usize,

    /// Version attached to every result; ignored when empty.
    pub version: Option<String>,
}

impl Default for ResultProjection {
    fn default() -> Self {
        Self {
            comment_limit: DEFAULT_COMMENT_LIMIT,
            version: None,
        }
    }
}

/// A single `add_result_for_case` submission.
///
/// One submission; the case id goes in the request path, the rest in the body.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishableResult {
    pub case_id: CaseId,
    pub status: ServiceStatus,
    pub comment: Option<String>,
    pub elapsed: Option<String>,
    pub version: Option<String>,
}

impl PublishableResult {
    /// Builds the submission for one outcome.
    pub fn from_outcome(outcome: &Outcome, projection: &ResultProjection) -> Self {
        let comment = (!outcome.comment.is_empty())
            .then(|| format_comment(&outcome.comment, projection.comment_limit));
        let version = projection
            .version
            .as_ref()
            .filter(|v| !v.is_empty())
            .cloned();

        Self {
            case_id: outcome.case_id,
            status: outcome.status,
            comment,
            elapsed: elapsed_for(outcome.duration),
            version,
        }
    }

    /// Returns the JSON request body. Absent fields are left out.
    pub fn body(&self) -> Value {
        let mut body = json!({ "status_id": self.status.code() });
        let optional = [
            ("comment", &self.comment),
            ("elapsed", &self.elapsed),
            ("version", &self.version),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                body[key] = json!(value);
            }
        }
        body
    }
}

/// Formats a duration as the service's `elapsed` field.
///
/// The service has no sub-second resolution: zero has no elapsed value,
/// anything shorter than a second counts as one second, longer durations
/// are rounded.
pub fn elapsed_for(duration: Duration) -> Option<String> {
    if duration.is_zero() {
        return None;
    }
    let secs = duration.as_secs_f64();
    let whole = if secs < 1.0 { 1 } else { secs.round() as u64 };
    Some(format!("{whole}s"))
}

/// Orders submissions by case id, then by status code.
pub fn sort_for_submission(results: &mut [PublishableResult]) {
    results.sort_by_key(|r| (r.case_id, r.status));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_appends_one_outcome_per_case() {
        let mut buffer = ResultBuffer::new();
        buffer.record(
            &[1, 2],
            ServiceStatus::Passed,
            "ERROR!",
            Duration::from_secs(3600),
        );

        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.outcomes()[0].case_id, 1);
        assert_eq!(buffer.outcomes()[1].case_id, 2);
        for outcome in buffer.outcomes() {
            assert_eq!(outcome.status, ServiceStatus::Passed);
            assert_eq!(outcome.comment, "ERROR!");
            assert_eq!(outcome.duration, Duration::from_secs(3600));
        }
    }

    #[test]
    fn test_record_keeps_duplicates() {
        let mut buffer = ResultBuffer::new();
        buffer.record(&[7], ServiceStatus::Failed, "", Duration::ZERO);
        buffer.record(&[7], ServiceStatus::Passed, "", Duration::ZERO);
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_elapsed_policy() {
        assert_eq!(elapsed_for(Duration::ZERO), None);
        assert_eq!(elapsed_for(Duration::from_millis(100)).as_deref(), Some("1s"));
        assert_eq!(elapsed_for(Duration::from_millis(999)).as_deref(), Some("1s"));
        assert_eq!(elapsed_for(Duration::from_secs(1)).as_deref(), Some("1s"));
        assert_eq!(elapsed_for(Duration::from_millis(2600)).as_deref(), Some("3s"));
        assert_eq!(elapsed_for(Duration::from_millis(2400)).as_deref(), Some("2s"));
    }

    #[test]
    fn test_projection_body() {
        let outcome = Outcome {
            case_id: 5678,
            status: ServiceStatus::Blocked,
            comment: "An error".to_string(),
            duration: Duration::from_millis(100),
        };
        let projection = ResultProjection {
            version: Some("1.0.0.0".to_string()),
            ..Default::default()
        };

        let result = PublishableResult::from_outcome(&outcome, &projection);
        assert_eq!(
            result.body(),
            json!({
                "status_id": 2,
                "comment": "# Pytest result: #\n    An error",
                "elapsed": "1s",
                "version": "1.0.0.0",
            })
        );
    }

    #[test]
    fn test_projection_omits_empty_fields() {
        let outcome = Outcome {
            case_id: 1,
            status: ServiceStatus::Passed,
            comment: String::new(),
            duration: Duration::ZERO,
        };
        let projection = ResultProjection {
            version: Some(String::new()),
            ..Default::default()
        };

        let result = PublishableResult::from_outcome(&outcome, &projection);
        assert_eq!(result.body(), json!({ "status_id": 1 }));
    }

    #[test]
    fn test_body_carries_only_present_fields() {
        let result = PublishableResult {
            case_id: 42,
            status: ServiceStatus::Failed,
            comment: Some("boom".to_string()),
            elapsed: None,
            version: Some("2.1".to_string()),
        };

        let body = result.body();
        assert_eq!(
            body,
            json!({ "status_id": 5, "comment": "boom", "version": "2.1" })
        );
        assert!(body.get("case_id").is_none());
        assert!(body.get("elapsed").is_none());
    }

    #[test]
    fn test_sort_by_case_then_status() {
        let mut buffer = ResultBuffer::new();
        buffer.record(&[1234], ServiceStatus::Failed, "", Duration::ZERO);
        buffer.record(&[5678], ServiceStatus::Blocked, "", Duration::ZERO);
        buffer.record(&[1234], ServiceStatus::Passed, "", Duration::ZERO);
        buffer.record(&[12], ServiceStatus::Retest, "", Duration::ZERO);

        let mut results = buffer.project(&ResultProjection::default());
        sort_for_submission(&mut results);

        let keys: Vec<_> = results.iter().map(|r| (r.case_id, r.status.code())).collect();
        assert_eq!(keys, vec![(12, 4), (1234, 1), (1234, 5), (5678, 2)]);
        for pair in results.windows(2) {
            assert!((pair[0].case_id, pair[0].status) <= (pair[1].case_id, pair[1].status));
        }
    }
}
