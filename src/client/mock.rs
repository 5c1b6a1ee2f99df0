//! In-memory service client for tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use super::{ClientError, ClientResult, ServiceClient};

#[derive(Debug, Clone)]
enum Canned {
    Json(Value),
    Transport(String),
}

/// A request seen by the mock.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RecordedRequest {
    pub method: &'static str,
    pub path: String,
    pub body: Option<Value>,
}

/// Serves canned responses by exact path and records every request.
///
/// Unknown paths answer `{}`.
#[derive(Debug, Default)]
pub(crate) struct MockClient {
    responses: Mutex<HashMap<String, Canned>>,
    requests: Mutex<Vec<RecordedRequest>>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(self, path: impl Into<String>, response: Value) -> Self {
        self.set_response(path, response);
        self
    }

    pub fn with_transport_error(self, path: impl Into<String>, message: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(path.into(), Canned::Transport(message.to_string()));
        self
    }

    /// Makes every request take `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_response(&self, path: impl Into<String>, response: Value) {
        self.responses
            .lock()
            .unwrap()
            .insert(path.into(), Canned::Json(response));
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Requests whose path starts with `prefix`, in arrival order.
    pub fn requests_to(&self, prefix: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path.starts_with(prefix))
            .collect()
    }

    /// Highest number of requests observed in flight at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    async fn respond(&self, method: &'static str, path: &str, body: Option<&Value>) -> ClientResult<Value> {
        self.requests.lock().unwrap().push(RecordedRequest {
            method,
            path: path.to_string(),
            body: body.cloned(),
        });

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let canned = self.responses.lock().unwrap().get(path).cloned();
        match canned {
            Some(Canned::Json(value)) => Ok(value),
            Some(Canned::Transport(message)) => Err(ClientError::Connection(message)),
            None => Ok(json!({})),
        }
    }
}

#[async_trait]
impl ServiceClient for MockClient {
    async fn send_post(&self, path: &str, body: &Value) -> ClientResult<Value> {
        self.respond("POST", path, Some(body)).await
    }

    async fn send_get(&self, path: &str) -> ClientResult<Value> {
        self.respond("GET", path, None).await
    }
}
