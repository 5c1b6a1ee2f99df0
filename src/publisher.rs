//! Publishing of buffered results to a run.
//!
//! # Publishing Flow
//!
//! 1. **Projection**: every buffered outcome becomes a
//!    [`PublishableResult`] (comment formatted, elapsed computed, version
//!    attached)
//! 2. **Blocked filtering**: unless blocked cases are published, cases
//!    currently blocked in the run are dropped
//! 3. **Ordering**: results are sorted by case id, then status
//! 4. **Dispatch**: results go through the [`SubmissionPool`]; the call
//!    returns once every result has been acknowledged
//!
//! Individual submission failures never fail the call. Only a failure to
//! read the run's tests while filtering blocked cases does.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use railpost::client::http::HttpClient;
//! use railpost::config::load_config;
//! use railpost::publisher::{PublishOptions, Publisher};
//! use railpost::results::ResultBuffer;
//! use railpost::status::ServiceStatus;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config(std::path::Path::new("railpost.toml"))?;
//!     let client = Arc::new(HttpClient::new(&config.service)?);
//!
//!     let mut buffer = ResultBuffer::new();
//!     buffer.record(&[100], ServiceStatus::Passed, "", Duration::from_millis(300));
//!
//!     let publisher = Publisher::new(client, PublishOptions::from_config(&config));
//!     let summary = publisher.publish(50, &buffer).await?;
//!     println!("{} accepted", summary.accepted);
//!     publisher.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod pool;

use std::sync::Arc;

use tracing::info;

use crate::LOG_TARGET;
use crate::client::{RunId, ServiceClient};
use crate::config::Config;
use crate::resolver::{ResolveError, Resolver};
use crate::results::{ResultBuffer, ResultProjection, sort_for_submission};

pub use pool::{SubmissionPool, SubmissionReport, SubmissionStatus, is_benign_rejection};

/// Errors that abort a publish call before anything is dispatched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PublishError {
    /// Blocked cases could not be determined.
    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

/// Result type for publishing.
pub type PublishResult<T> = Result<T, PublishError>;

/// Settings of a [`Publisher`].
#[derive(Debug, Clone)]
pub struct PublishOptions {
    /// Number of submission workers.
    pub workers: usize,

    /// Comment size and version applied to every result.
    pub projection: ResultProjection,

    /// Publish results for cases that are blocked in the run.
    pub publish_blocked: bool,

    /// Whether runs were created with every case of the suite.
    pub include_all: bool,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            workers: 60,
            projection: ResultProjection::default(),
            publish_blocked: true,
            include_all: false,
        }
    }
}

impl PublishOptions {
    /// Builds options from the `[session]` and `[publisher]` sections.
    pub fn from_config(config: &Config) -> Self {
        Self {
            workers: config.publisher.workers,
            projection: ResultProjection {
                comment_limit: config.publisher.comment_limit,
                version: config.session.version.clone(),
            },
            publish_blocked: config.session.publish_blocked,
            include_all: config.session.include_all,
        }
    }
}

/// Counts of one publish call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishSummary {
    /// Run the results were published to.
    pub run_id: RunId,

    /// Results left out because their case is blocked in the run.
    pub excluded_blocked: usize,

    /// Results handed to the worker pool.
    pub dispatched: usize,

    pub accepted: usize,
    pub rejected: usize,
    pub suppressed: usize,
    pub failed: usize,
}

impl PublishSummary {
    fn from_reports(run_id: RunId, excluded_blocked: usize, reports: &[SubmissionReport]) -> Self {
        let mut summary = Self {
            run_id,
            excluded_blocked,
            dispatched: reports.len(),
            ..Default::default()
        };
        for report in reports {
            match report.status {
                SubmissionStatus::Accepted => summary.accepted += 1,
                SubmissionStatus::Rejected(_) => summary.rejected += 1,
                SubmissionStatus::Suppressed(_) => summary.suppressed += 1,
                SubmissionStatus::Failed(_) => summary.failed += 1,
            }
        }
        summary
    }

    /// Accumulates another call's counts.
    pub fn merge(&mut self, other: &PublishSummary) {
        self.excluded_blocked += other.excluded_blocked;
        self.dispatched += other.dispatched;
        self.accepted += other.accepted;
        self.rejected += other.rejected;
        self.suppressed += other.suppressed;
        self.failed += other.failed;
    }
}

/// Publishes a [`ResultBuffer`] to runs through a long-lived worker pool.
///
/// The pool is created once and reused by every [`publish`](Self::publish)
/// call, e.g. for each run of a plan.
pub struct Publisher {
    pool: SubmissionPool,
    resolver: Resolver,
    options: PublishOptions,
}

impl Publisher {
    /// Creates a publisher and spawns its workers.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(client: Arc<dyn ServiceClient>, options: PublishOptions) -> Self {
        Self {
            pool: SubmissionPool::new(client.clone(), options.workers),
            resolver: Resolver::new(client),
            options,
        }
    }

    /// Publishes every buffered outcome to `run_id`.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Resolve`] if blocked cases must be filtered
    /// and the run's tests cannot be read. Nothing is dispatched then.
    pub async fn publish(&self, run_id: RunId, buffer: &ResultBuffer) -> PublishResult<PublishSummary> {
        let mut results = buffer.project(&self.options.projection);

        let mut excluded_blocked = 0;
        if !self.options.publish_blocked {
            info!(target: LOG_TARGET, "Option \"Don't publish blocked testcases\" activated");
            let blocked = self.resolver.blocked_cases(run_id).await?;
            info!(
                target: LOG_TARGET,
                "Blocked testcases excluded: {}",
                join_ids(blocked.iter())
            );
            let before = results.len();
            results.retain(|r| !blocked.contains(&r.case_id));
            excluded_blocked = before - results.len();
        }
        if self.options.include_all {
            info!(
                target: LOG_TARGET,
                "Option \"Include all testcases from test suite for test run\" activated"
            );
        }

        sort_for_submission(&mut results);

        info!(
            target: LOG_TARGET,
            run_id,
            "Publishing {} results with {} workers",
            results.len(),
            self.pool.size()
        );
        let reports = self.pool.dispatch(run_id, results).await;
        Ok(PublishSummary::from_reports(run_id, excluded_blocked, &reports))
    }

    /// Stops the worker pool.
    pub async fn shutdown(self) {
        self.pool.shutdown().await;
    }
}

/// Joins ids with `", "` for log lines.
pub(crate) fn join_ids<'a, T: std::fmt::Display + 'a>(ids: impl Iterator<Item = &'a T>) -> String {
    ids.map(ToString::to_string).collect::<Vec<_>>().join(", ")
}
