//! Configuration schema definitions for railpost.
//!
//! # Schema Overview
//!
//! ```text
//! Config (root)
//! ├── ServiceConfig     - Where the service lives and how to authenticate
//! ├── SessionConfig     - Which run/plan to target and publishing options
//! └── PublisherConfig   - Worker pool and comment sizing
//! ```

use serde::{Deserialize, Serialize};

use crate::client::{PlanId, ProjectId, RunId, SuiteId};
use crate::comment::DEFAULT_COMMENT_LIMIT;

/// Root configuration structure for railpost.
///
/// # TOML Structure
///
/// ```toml
/// [service]
/// url = "https://example.testrail.io"
/// user = "ci@example.com"
///
/// [session]
/// project_id = 4
/// suite_id = 1
/// run_id = 50
/// close_on_complete = true
///
/// [publisher]
/// workers = 60
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Service endpoint and credentials.
    pub service: ServiceConfig,

    /// Target selection and publishing options (optional, has defaults).
    #[serde(default)]
    pub session: SessionConfig,

    /// Submission worker pool settings (optional, has defaults).
    #[serde(default)]
    pub publisher: PublisherConfig,
}

impl Config {
    /// Checks settings that deserialize fine but cannot work.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.service.url.trim().is_empty() {
            anyhow::bail!("service.url must not be empty");
        }
        if self.publisher.workers == 0 {
            anyhow::bail!("publisher.workers must be at least 1");
        }
        if self.session.run_id.is_none()
            && self.session.plan_id.is_none()
            && self.session.project_id.is_none()
        {
            anyhow::bail!(
                "session.project_id is required when neither session.run_id nor session.plan_id is set"
            );
        }
        Ok(())
    }
}

/// Connection settings for the service.
///
/// | Field | Default |
/// |-------|---------|
/// | `password` | `RAILPOST_PASSWORD` environment variable |
/// | `verify_tls` | true |
/// | `timeout_secs` | 60 |
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// Base URL of the service, e.g. `https://example.testrail.io`.
    pub url: String,

    /// Login used for basic authentication.
    pub user: String,

    /// Password or API key.
    #[serde(default)]
    pub password: Option<String>,

    /// Verify the server's TLS certificate.
    #[serde(default = "default_verify_tls")]
    pub verify_tls: bool,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_verify_tls() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    60
}

/// Per-session target selection and publishing behavior.
///
/// A configured plan takes precedence over a configured run; when neither
/// is open a new run is created in `project_id`/`suite_id`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Project new runs are created in.
    #[serde(default)]
    pub project_id: Option<ProjectId>,

    /// Suite new runs are created from.
    #[serde(default)]
    pub suite_id: Option<SuiteId>,

    /// Existing run to publish to.
    #[serde(default)]
    pub run_id: Option<RunId>,

    /// Existing plan whose open runs are published to.
    #[serde(default)]
    pub plan_id: Option<PlanId>,

    /// User new runs are assigned to.
    #[serde(default)]
    pub assign_user_id: Option<u64>,

    /// Name of a new run. Defaults to `Automated Run <timestamp>`.
    #[serde(default)]
    pub run_name: Option<String>,

    /// Version attached to every result.
    #[serde(default)]
    pub version: Option<String>,

    /// Include every case of the suite in a new run, not only tagged ones.
    #[serde(default)]
    pub include_all: bool,

    /// Skip tagged tests whose cases are absent from the selected run.
    #[serde(default)]
    pub skip_missing: bool,

    /// Publish results for cases currently blocked in the run.
    ///
    /// Default: true
    #[serde(default = "default_publish_blocked")]
    pub publish_blocked: bool,

    /// Close the targeted run or plan after publishing.
    #[serde(default)]
    pub close_on_complete: bool,
}

fn default_publish_blocked() -> bool {
    true
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            suite_id: None,
            run_id: None,
            plan_id: None,
            assign_user_id: None,
            run_name: None,
            version: None,
            include_all: false,
            skip_missing: false,
            publish_blocked: default_publish_blocked(),
            close_on_complete: false,
        }
    }
}

/// Settings for the submission worker pool.
///
/// | Field | Default |
/// |-------|---------|
/// | `workers` | 60 |
/// | `comment_limit` | 4000 |
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PublisherConfig {
    /// Number of concurrent submission workers.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Maximum trace characters kept in a result comment.
    #[serde(default = "default_comment_limit")]
    pub comment_limit: usize,
}

fn default_workers() -> usize {
    60
}

fn default_comment_limit() -> usize {
    DEFAULT_COMMENT_LIMIT
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            comment_limit: default_comment_limit(),
        }
    }
}
