//! Lifecycle of one test session against the service.
//!
//! The host test runner drives a [`Session`] through the [`SessionHooks`]
//! callbacks; the session never calls them itself.
//!
//! ```text
//!   on_collection_finalized(items)   resolve the target once:
//!          │                           plan open?  ──► PlanSelected
//!          │                           run open?   ──► RunSelected (+ skip missing)
//!          │                           otherwise   ──► RunCreated (add_run)
//!          ▼
//!   on_test_finished(report) × N     buffer one outcome per case id
//!          │
//!          ▼
//!   on_session_finished()            publish to the run, or to every open
//!                                    run of the plan; optionally close
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{error, info, warn};

use crate::LOG_TARGET;
use crate::client::{self, PlanId, RunId, ServiceClient, paths};
use crate::config::{Config, SessionConfig};
use crate::markers::TaggedTest;
use crate::publisher::{PublishError, PublishOptions, PublishSummary, Publisher, join_ids};
use crate::resolver::{ResolveResult, Resolver};
use crate::results::{CaseId, ResultBuffer};
use crate::status::{FinishState, status_for};

/// Format of the default name given to created runs.
pub const RUN_NAME_FORMAT: &str = "%d-%m-%Y %H:%M:%S";

/// Reason attached to tests skipped because their cases are not in the run.
pub const MISSING_CASE_REASON: &str = "Test is not present in testrun.";

/// What the session publishes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Nothing resolved yet, or nothing usable was found.
    Unresolved,

    /// An open plan; results go to each of its open runs.
    PlanSelected(PlanId),

    /// A configured, open run.
    RunSelected(RunId),

    /// A run created by this session.
    RunCreated(RunId),
}

impl Target {
    /// Returns the single run targeted, if any.
    pub fn run_id(&self) -> Option<RunId> {
        match self {
            Target::RunSelected(id) | Target::RunCreated(id) => Some(*id),
            _ => None,
        }
    }
}

/// Phase of a test invocation a report belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Setup,
    #[default]
    Call,
    Teardown,
}

/// A finished test, as reported by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestReport {
    /// Case ids of the test's closest marker.
    pub case_ids: Vec<CaseId>,

    pub outcome: FinishState,

    #[serde(default)]
    pub phase: Phase,

    /// Failure representation; empty for passing tests.
    #[serde(default)]
    pub trace: String,

    #[serde(default)]
    pub duration: Duration,
}

/// What happened at the end of a session.
#[derive(Debug, Default)]
pub struct SessionReport {
    /// Target the session resolved to; `None` if never resolved.
    pub target: Option<Target>,

    /// One summary per run published to.
    pub published: Vec<PublishSummary>,

    /// Runs whose publishing could not start.
    pub errors: Vec<(RunId, PublishError)>,

    /// Whether the run or plan was closed; `None` if closing was not asked.
    pub closed: Option<bool>,
}

impl SessionReport {
    /// Returns the counts of every run combined.
    pub fn total(&self) -> PublishSummary {
        let mut total = PublishSummary::default();
        for summary in &self.published {
            total.merge(summary);
        }
        total
    }
}

/// Callbacks invoked by the host test runner, in this order.
#[async_trait]
pub trait SessionHooks: Send {
    /// Called once the host has collected every test.
    async fn on_collection_finalized<T: TaggedTest + Send>(&mut self, items: &mut [T]);

    /// Called for every phase of every finished test.
    fn on_test_finished(&mut self, report: &TestReport);

    /// Called once when the whole session is over.
    async fn on_session_finished(&mut self) -> SessionReport;
}

/// Publishing state of one test session.
///
/// Must be created inside a Tokio runtime (it starts the submission pool).
pub struct Session {
    settings: SessionConfig,
    client: Arc<dyn ServiceClient>,
    resolver: Resolver,
    publisher: Publisher,
    buffer: ResultBuffer,
    target: Target,
}

impl Session {
    /// Creates a session from the loaded configuration.
    pub fn new(client: Arc<dyn ServiceClient>, config: &Config) -> Self {
        Self::with_options(
            client,
            config.session.clone(),
            PublishOptions::from_config(config),
        )
    }

    /// Creates a session from explicit settings.
    pub fn with_options(
        client: Arc<dyn ServiceClient>,
        settings: SessionConfig,
        options: PublishOptions,
    ) -> Self {
        Self {
            resolver: Resolver::new(client.clone()),
            publisher: Publisher::new(client.clone(), options),
            client,
            settings,
            buffer: ResultBuffer::new(),
            target: Target::Unresolved,
        }
    }

    /// One-line description of what the session will target.
    pub fn report_header(&self) -> String {
        let message = if let Some(plan_id) = self.settings.plan_id {
            format!("existing testplan #{plan_id} selected")
        } else if let Some(run_id) = self.settings.run_id {
            format!("existing testrun #{run_id} selected")
        } else {
            "a new testrun will be created".to_string()
        };
        format!("railpost: {message}")
    }

    /// Returns the resolved target.
    pub fn target(&self) -> Target {
        self.target
    }

    /// Returns the outcomes recorded so far.
    pub fn buffer(&self) -> &ResultBuffer {
        &self.buffer
    }

    /// Stops the submission workers.
    pub async fn shutdown(self) {
        self.publisher.shutdown().await;
    }

    async fn resolve_target<T: TaggedTest>(&mut self, items: &mut [T]) -> Target {
        if let Some(plan_id) = self.settings.plan_id
            && self.resolver.is_plan_open(plan_id).await
        {
            self.settings.run_id = None;
            return Target::PlanSelected(plan_id);
        }

        if let Some(run_id) = self.settings.run_id
            && self.resolver.is_run_open(run_id).await
        {
            self.settings.plan_id = None;
            if self.settings.skip_missing
                && let Err(e) = self.skip_missing_cases(run_id, items).await
            {
                warn!(target: LOG_TARGET, run_id, "Skip-missing check aborted: {}", e);
            }
            return Target::RunSelected(run_id);
        }

        let case_ids: Vec<CaseId> = items
            .iter()
            .filter_map(|item| item.closest_marker())
            .flatten()
            .copied()
            .collect();
        match self.create_run(case_ids).await {
            Some(run_id) => Target::RunCreated(run_id),
            None => Target::Unresolved,
        }
    }

    /// Marks tagged items whose cases are all absent from the run as skipped.
    async fn skip_missing_cases<T: TaggedTest>(
        &self,
        run_id: RunId,
        items: &mut [T],
    ) -> ResolveResult<usize> {
        let in_run: std::collections::HashSet<CaseId> = self
            .resolver
            .tests_in_run(run_id)
            .await?
            .into_iter()
            .map(|test| test.case_id)
            .collect();

        let mut skipped = 0;
        for item in items.iter_mut() {
            let missing = item
                .closest_marker()
                .is_some_and(|ids| !ids.iter().any(|id| in_run.contains(id)));
            if missing {
                info!(target: LOG_TARGET, test = item.node_id(), "{}", MISSING_CASE_REASON);
                item.mark_skipped(MISSING_CASE_REASON);
                skipped += 1;
            }
        }
        Ok(skipped)
    }

    async fn create_run(&self, case_ids: Vec<CaseId>) -> Option<RunId> {
        let Some(project_id) = self.settings.project_id else {
            error!(target: LOG_TARGET, "Failed to create testrun: no project_id configured");
            return None;
        };
        let name = self.settings.run_name.clone().unwrap_or_else(|| {
            format!(
                "Automated Run {}",
                chrono::Utc::now().format(RUN_NAME_FORMAT)
            )
        });

        let mut body = Map::new();
        if let Some(suite_id) = self.settings.suite_id {
            body.insert("suite_id".to_string(), json!(suite_id));
        }
        body.insert("name".to_string(), json!(name));
        body.insert("assignedto_id".to_string(), json!(self.settings.assign_user_id));
        body.insert("include_all".to_string(), json!(self.settings.include_all));
        body.insert("case_ids".to_string(), json!(case_ids));

        match client::post(
            self.client.as_ref(),
            &paths::add_run(project_id),
            &Value::Object(body),
        )
        .await
        {
            Ok(response) => match response.get("id").and_then(Value::as_u64) {
                Some(run_id) => {
                    info!(
                        target: LOG_TARGET,
                        "New testrun created with name \"{}\" and ID={}",
                        name,
                        run_id
                    );
                    Some(run_id)
                }
                None => {
                    error!(target: LOG_TARGET, "Failed to create testrun: response has no id");
                    None
                }
            },
            Err(e) => {
                error!(target: LOG_TARGET, "Failed to create testrun: \"{}\"", e);
                None
            }
        }
    }

    async fn publish_to(&self, run_id: RunId, report: &mut SessionReport) {
        match self.publisher.publish(run_id, &self.buffer).await {
            Ok(summary) => report.published.push(summary),
            Err(e) => {
                error!(target: LOG_TARGET, run_id, "Testrun not published: {}", e);
                report.errors.push((run_id, e));
            }
        }
    }

    async fn close(&self) -> Option<bool> {
        let (path, what, id) = match self.target {
            Target::RunSelected(run_id) | Target::RunCreated(run_id) => {
                (paths::close_run(run_id), "test run", run_id)
            }
            Target::PlanSelected(plan_id) => (paths::close_plan(plan_id), "test plan", plan_id),
            Target::Unresolved => return None,
        };

        match client::post(self.client.as_ref(), &path, &json!({})).await {
            Ok(_) => {
                info!(target: LOG_TARGET, "{} with ID={} was closed", what, id);
                Some(true)
            }
            Err(e) => {
                error!(target: LOG_TARGET, "Failed to close {}: \"{}\"", what, e);
                Some(false)
            }
        }
    }
}

#[async_trait]
impl SessionHooks for Session {
    async fn on_collection_finalized<T: TaggedTest + Send>(&mut self, items: &mut [T]) {
        self.target = self.resolve_target(items).await;
    }

    fn on_test_finished(&mut self, report: &TestReport) {
        if report.phase != Phase::Call || report.case_ids.is_empty() {
            return;
        }
        match status_for(report.outcome) {
            Ok(status) => {
                self.buffer
                    .record(&report.case_ids, status, &report.trace, report.duration)
            }
            Err(e) => error!(
                target: LOG_TARGET,
                cases = %join_ids(report.case_ids.iter()),
                "Result not recorded: {}",
                e
            ),
        }
    }

    async fn on_session_finished(&mut self) -> SessionReport {
        let mut report = SessionReport {
            target: Some(self.target),
            ..Default::default()
        };

        info!(target: LOG_TARGET, "Start publishing");
        if self.buffer.is_empty() {
            info!(target: LOG_TARGET, "No results recorded");
            info!(target: LOG_TARGET, "End publishing");
            return report;
        }

        info!(
            target: LOG_TARGET,
            "Testcases to publish: {}",
            join_ids(self.buffer.outcomes().iter().map(|o| &o.case_id))
        );

        match self.target {
            Target::RunSelected(run_id) | Target::RunCreated(run_id) => {
                self.publish_to(run_id, &mut report).await;
            }
            Target::PlanSelected(plan_id) => {
                let runs = self.resolver.open_runs_under_plan(plan_id).await;
                info!(target: LOG_TARGET, "Testruns to update: {}", join_ids(runs.iter()));
                for run_id in runs {
                    self.publish_to(run_id, &mut report).await;
                }
            }
            Target::Unresolved => info!(target: LOG_TARGET, "No data published"),
        }

        if self.settings.close_on_complete {
            report.closed = self.close().await;
        }
        info!(target: LOG_TARGET, "End publishing");
        report
    }
}
