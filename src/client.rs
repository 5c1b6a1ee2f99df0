//! Transport to the test management service.
//!
//! Everything the crate needs from the service goes through the
//! [`ServiceClient`] trait: a JSON `POST`, a JSON `GET`, and a way to read
//! the `error` field the service puts in failed responses. The HTTP
//! implementation lives in [`http`]; tests inject their own client.
//!
//! # Error Handling
//!
//! Two failure kinds are kept apart:
//!
//! - **Transport** failures ([`ClientError`]): the request never produced a
//!   usable response (connection refused, timeout, non-JSON body).
//! - **Remote** failures: the service answered with `{"error": "..."}`.
//!
//! [`post`] and [`get`] fold both into a [`RequestError`] for callers that
//! treat them the same way.

pub mod http;

#[cfg(test)]
pub(crate) mod mock;

use async_trait::async_trait;
use serde_json::Value;

use crate::results::CaseId;

/// Identifier of a test run.
pub type RunId = u64;

/// Identifier of a test plan.
pub type PlanId = u64;

/// Identifier of a project.
pub type ProjectId = u64;

/// Identifier of a test suite.
pub type SuiteId = u64;

/// Result type for transport operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Transport-level failures.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The client could not be built from its configuration.
    #[error("Invalid client configuration: {0}")]
    Config(String),

    /// The service could not be reached.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The request did not complete in time.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The service answered with a failure status and no error payload.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The response body was not valid JSON.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Why a request to the service did not succeed.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// The service reported an error.
    #[error("{0}")]
    Remote(String),

    /// The request failed before the service could answer.
    #[error(transparent)]
    Transport(#[from] ClientError),
}

/// Capability to talk to the service's JSON API.
///
/// Paths are relative to the API root, e.g. `get_run/12`.
#[async_trait]
pub trait ServiceClient: Send + Sync {
    /// Sends a `POST` with a JSON body.
    async fn send_post(&self, path: &str, body: &Value) -> ClientResult<Value>;

    /// Sends a `GET`.
    async fn send_get(&self, path: &str) -> ClientResult<Value>;

    /// Extracts the service-reported error from a response, if any.
    fn get_error(&self, response: &Value) -> Option<String> {
        remote_error(response)
    }
}

/// Reads the `error` field of a response.
///
/// Returns `None` when the field is absent, null, or an empty string.
pub fn remote_error(response: &Value) -> Option<String> {
    match response.get("error")? {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Sends a `POST` and turns a service-reported error into a [`RequestError`].
pub async fn post(
    client: &dyn ServiceClient,
    path: &str,
    body: &Value,
) -> Result<Value, RequestError> {
    let response = client.send_post(path, body).await?;
    match client.get_error(&response) {
        Some(error) => Err(RequestError::Remote(error)),
        None => Ok(response),
    }
}

/// Sends a `GET` and turns a service-reported error into a [`RequestError`].
pub async fn get(client: &dyn ServiceClient, path: &str) -> Result<Value, RequestError> {
    let response = client.send_get(path).await?;
    match client.get_error(&response) {
        Some(error) => Err(RequestError::Remote(error)),
        None => Ok(response),
    }
}

/// API endpoint paths.
pub mod paths {
    use super::{CaseId, PlanId, ProjectId, RunId};

    pub fn add_result_for_case(run_id: RunId, case_id: CaseId) -> String {
        format!("add_result_for_case/{run_id}/{case_id}")
    }

    pub fn add_run(project_id: ProjectId) -> String {
        format!("add_run/{project_id}")
    }

    pub fn close_run(run_id: RunId) -> String {
        format!("close_run/{run_id}")
    }

    pub fn close_plan(plan_id: PlanId) -> String {
        format!("close_plan/{plan_id}")
    }

    pub fn get_run(run_id: RunId) -> String {
        format!("get_run/{run_id}")
    }

    pub fn get_plan(plan_id: PlanId) -> String {
        format!("get_plan/{plan_id}")
    }

    pub fn get_tests(run_id: RunId) -> String {
        format!("get_tests/{run_id}")
    }
}
