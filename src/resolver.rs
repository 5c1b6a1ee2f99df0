//! Queries about runs and plans in the service.
//!
//! Availability checks fail closed: if the service cannot be asked, or
//! answers with an error, the run or plan is treated as not open. The one
//! query that cannot degrade is [`Resolver::tests_in_run`], since callers
//! need the case list to proceed; it raises [`ResolveError::TestsNotFound`].

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::{error, warn};

use crate::LOG_TARGET;
use crate::client::{self, PlanId, RunId, ServiceClient, paths};
use crate::results::CaseId;
use crate::status::ServiceStatus;

/// Errors raised by resolver queries that do not fail closed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    /// The tests of a run could not be retrieved.
    #[error("Tests not found for run {run_id}: {reason}")]
    TestsNotFound { run_id: RunId, reason: String },
}

/// Result type for resolver queries.
pub type ResolveResult<T> = Result<T, ResolveError>;

/// A test of a run: one case as instantiated in that run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RunTest {
    pub case_id: CaseId,

    /// Current status code; custom statuses may exceed the built-in range.
    #[serde(default)]
    pub status_id: Option<u64>,
}

impl RunTest {
    /// Returns true if the test is currently blocked.
    pub fn is_blocked(&self) -> bool {
        self.status_id == Some(u64::from(ServiceStatus::Blocked.code()))
    }
}

#[derive(Debug, Default, Deserialize)]
struct PlanEntry {
    #[serde(default)]
    runs: Vec<PlanRun>,
}

#[derive(Debug, Deserialize)]
struct PlanRun {
    id: RunId,
    #[serde(default)]
    is_completed: bool,
}

/// Answers run/plan questions through a [`ServiceClient`].
#[derive(Clone)]
pub struct Resolver {
    client: Arc<dyn ServiceClient>,
}

impl Resolver {
    pub fn new(client: Arc<dyn ServiceClient>) -> Self {
        Self { client }
    }

    /// Returns true if the run exists and is not completed.
    pub async fn is_run_open(&self, run_id: RunId) -> bool {
        match client::get(self.client.as_ref(), &paths::get_run(run_id)).await {
            Ok(run) => is_open(&run),
            Err(e) => {
                error!(target: LOG_TARGET, run_id, "Failed to retrieve testrun: \"{}\"", e);
                false
            }
        }
    }

    /// Returns true if the plan exists and is not completed.
    pub async fn is_plan_open(&self, plan_id: PlanId) -> bool {
        match client::get(self.client.as_ref(), &paths::get_plan(plan_id)).await {
            Ok(plan) => is_open(&plan),
            Err(e) => {
                error!(target: LOG_TARGET, plan_id, "Failed to retrieve testplan: \"{}\"", e);
                false
            }
        }
    }

    /// Returns the ids of every run of the plan that is not completed.
    ///
    /// An unreachable or failing plan yields an empty set.
    pub async fn open_runs_under_plan(&self, plan_id: PlanId) -> BTreeSet<RunId> {
        let plan = match client::get(self.client.as_ref(), &paths::get_plan(plan_id)).await {
            Ok(plan) => plan,
            Err(e) => {
                error!(target: LOG_TARGET, plan_id, "Failed to retrieve testplan: \"{}\"", e);
                return BTreeSet::new();
            }
        };

        let entries: Vec<PlanEntry> = match plan.get("entries") {
            Some(entries) => serde_json::from_value(entries.clone()).unwrap_or_else(|e| {
                warn!(target: LOG_TARGET, plan_id, "Unreadable testplan entries: {}", e);
                Vec::new()
            }),
            None => Vec::new(),
        };

        entries
            .into_iter()
            .flat_map(|entry| entry.runs)
            .filter(|run| !run.is_completed)
            .map(|run| run.id)
            .collect()
    }

    /// Returns the tests of a run.
    ///
    /// Accepts both the bare list and the paginated `{"tests": [...]}`
    /// shape, following `_links.next` until the last page.
    pub async fn tests_in_run(&self, run_id: RunId) -> ResolveResult<Vec<RunTest>> {
        let not_found = |reason: String| {
            error!(target: LOG_TARGET, run_id, "Failed to get tests: \"{}\"", reason);
            ResolveError::TestsNotFound { run_id, reason }
        };

        let mut tests = Vec::new();
        let mut visited = HashSet::new();
        let mut next = Some(paths::get_tests(run_id));

        while let Some(path) = next.take() {
            if !visited.insert(path.clone()) {
                return Err(not_found(format!("pagination loops back to {path}")));
            }

            let response = client::get(self.client.as_ref(), &path)
                .await
                .map_err(|e| not_found(e.to_string()))?;

            let page = match response {
                Value::Object(mut page) => {
                    next = page
                        .get("_links")
                        .and_then(|links| links.get("next"))
                        .and_then(Value::as_str)
                        .map(next_page_path);
                    page.remove("tests").unwrap_or(Value::Array(Vec::new()))
                }
                list => list,
            };

            let page: Vec<RunTest> =
                serde_json::from_value(page).map_err(|e| not_found(e.to_string()))?;
            tests.extend(page);
        }

        Ok(tests)
    }

    /// Returns the case ids currently blocked in a run.
    pub async fn blocked_cases(&self, run_id: RunId) -> ResolveResult<BTreeSet<CaseId>> {
        Ok(self
            .tests_in_run(run_id)
            .await?
            .into_iter()
            .filter(RunTest::is_blocked)
            .map(|test| test.case_id)
            .collect())
    }
}

/// Turns a `_links.next` link such as `/api/v2/get_tests/10&offset=250`
/// into a path relative to the API root.
fn next_page_path(link: &str) -> String {
    let link = link.trim_start_matches('/');
    link.strip_prefix("api/v2/").unwrap_or(link).to_string()
}

fn is_open(response: &Value) -> bool {
    response.get("is_completed").and_then(Value::as_bool) == Some(false)
}
