//! Fixed-size pool of submission workers.
//!
//! The [`SubmissionPool`] owns `W` long-lived worker tasks draining one
//! bounded queue of capacity `2W`. A dispatch call enqueues its results
//! (waiting whenever the queue is full) and then waits until every one of
//! them has been acknowledged.
//!
//! ```text
//!   dispatch() ──send──► [ bounded queue (2W) ] ──recv──► worker 0..W
//!        ▲                                                   │
//!        │                                           add_result_for_case
//!        │                                                   │
//!        └───────────── ack channel (closes when the ────────┘
//!                        last job of the call is done)
//! ```
//!
//! Each job carries a clone of its call's acknowledgement sender, so the
//! acknowledgement channel closes exactly when the last job of that call
//! has been handled. That closing is the completion barrier.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::LOG_TARGET;
use crate::client::{self, RequestError, RunId, ServiceClient, paths};
use crate::results::{CaseId, PublishableResult};

/// How a single submission ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionStatus {
    /// The service stored the result.
    Accepted,

    /// The service refused the result.
    Rejected(String),

    /// The service refused the result for a known, harmless reason.
    Suppressed(String),

    /// The request failed before the service answered.
    Failed(String),
}

/// Outcome of one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionReport {
    pub run_id: RunId,
    pub case_id: CaseId,
    pub status: SubmissionStatus,
}

struct Submission {
    run_id: RunId,
    result: PublishableResult,
    ack: mpsc::UnboundedSender<SubmissionReport>,
}

/// A fixed pool of workers posting results to the service.
///
/// Must be created inside a Tokio runtime. Workers stop once the pool is
/// shut down or dropped.
pub struct SubmissionPool {
    queue: mpsc::Sender<Submission>,
    workers: Vec<JoinHandle<()>>,
}

impl SubmissionPool {
    /// Spawns `size` workers (at least one) sharing a queue of `2 * size`.
    pub fn new(client: Arc<dyn ServiceClient>, size: usize) -> Self {
        let size = size.max(1);
        let (queue, receiver) = mpsc::channel(size * 2);
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..size)
            .map(|idx| tokio::spawn(worker_loop(idx, client.clone(), receiver.clone())))
            .collect();

        Self { queue, workers }
    }

    /// Returns the number of workers.
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Returns the number of submissions waiting in the queue.
    pub fn pending(&self) -> usize {
        self.queue.max_capacity() - self.queue.capacity()
    }

    /// Submits `results` to `run_id` in order and waits for all of them.
    ///
    /// Never fails: every result yields a report, including results that
    /// could not be enqueued.
    pub async fn dispatch(
        &self,
        run_id: RunId,
        results: Vec<PublishableResult>,
    ) -> Vec<SubmissionReport> {
        let (ack, mut acks) = mpsc::unbounded_channel();

        for result in results {
            let job = Submission {
                run_id,
                result,
                ack: ack.clone(),
            };
            if let Err(mpsc::error::SendError(job)) = self.queue.send(job).await {
                error!(
                    target: LOG_TARGET,
                    run_id,
                    case_id = job.result.case_id,
                    "Submission queue closed"
                );
                let _ = ack.send(SubmissionReport {
                    run_id,
                    case_id: job.result.case_id,
                    status: SubmissionStatus::Failed("submission queue closed".to_string()),
                });
            }
        }
        drop(ack);

        let mut reports = Vec::new();
        while let Some(report) = acks.recv().await {
            reports.push(report);
        }
        reports
    }

    /// Closes the queue and waits for the workers to exit.
    pub async fn shutdown(self) {
        drop(self.queue);
        for result in futures::future::join_all(self.workers).await {
            if let Err(e) = result {
                warn!(target: LOG_TARGET, "Submission worker ended abnormally: {}", e);
            }
        }
    }
}

async fn worker_loop(
    worker: usize,
    client: Arc<dyn ServiceClient>,
    queue: Arc<Mutex<mpsc::Receiver<Submission>>>,
) {
    loop {
        let next = queue.lock().await.recv().await;
        let Some(job) = next else {
            break;
        };

        let status = submit(client.as_ref(), job.run_id, &job.result).await;
        let _ = job.ack.send(SubmissionReport {
            run_id: job.run_id,
            case_id: job.result.case_id,
            status,
        });
    }
    debug!(target: LOG_TARGET, worker, "Submission worker stopped");
}

async fn submit(
    client: &dyn ServiceClient,
    run_id: RunId,
    result: &PublishableResult,
) -> SubmissionStatus {
    let path = paths::add_result_for_case(run_id, result.case_id);
    match client::post(client, &path, &result.body()).await {
        Ok(_) => {
            debug!(target: LOG_TARGET, run_id, case_id = result.case_id, "Result published");
            SubmissionStatus::Accepted
        }
        Err(RequestError::Remote(reason)) if is_benign_rejection(&reason) => {
            SubmissionStatus::Suppressed(reason)
        }
        Err(RequestError::Remote(reason)) => {
            warn!(
                target: LOG_TARGET,
                run_id,
                case_id = result.case_id,
                "Info: Testcases not published for following reason: \"{}\"",
                reason
            );
            SubmissionStatus::Rejected(reason)
        }
        Err(RequestError::Transport(e)) => {
            error!(
                target: LOG_TARGET,
                run_id,
                case_id = result.case_id,
                "Testcase not published: {}",
                e
            );
            SubmissionStatus::Failed(e.to_string())
        }
    }
}

/// Returns true for the rejection sent when a case is not part of the run.
///
/// The service words it as `No (active) test found for the run/case
/// combination.`
pub fn is_benign_rejection(reason: &str) -> bool {
    let normalized: String = reason
        .to_lowercase()
        .chars()
        .filter(|c| *c != '(' && *c != ')')
        .collect();
    normalized.contains("no active test found") && normalized.contains("run/case combination")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientResult;
    use crate::client::mock::MockClient;
    use crate::status::ServiceStatus;
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn result(case_id: CaseId) -> PublishableResult {
        PublishableResult {
            case_id,
            status: ServiceStatus::Passed,
            comment: None,
            elapsed: None,
            version: None,
        }
    }

    #[test]
    fn test_benign_rejection_wording() {
        assert!(is_benign_rejection(
            "Field :case_id: No (active) test found for the run/case combination."
        ));
        assert!(is_benign_rejection(
            "No active test found for this run/case combination"
        ));
        assert!(!is_benign_rejection("Field :status_id is not a valid status."));
    }

    #[tokio::test]
    async fn test_dispatch_waits_for_every_result() {
        let client = Arc::new(MockClient::new().with_delay(Duration::from_millis(5)));
        let pool = SubmissionPool::new(client.clone(), 4);

        let reports = pool.dispatch(10, (1..=20).map(result).collect()).await;

        assert_eq!(reports.len(), 20);
        assert!(reports.iter().all(|r| r.status == SubmissionStatus::Accepted));
        assert_eq!(client.requests_to("add_result_for_case/10/").len(), 20);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded_by_pool_size() {
        let client = Arc::new(MockClient::new().with_delay(Duration::from_millis(10)));
        let pool = SubmissionPool::new(client.clone(), 3);
        assert_eq!(pool.size(), 3);

        pool.dispatch(1, (1..=30).map(result).collect()).await;

        assert!(client.peak_in_flight() <= 3);
        assert!(client.peak_in_flight() >= 1);
        pool.shutdown().await;
    }

    /// Holds every post until permits are added to the gate.
    struct GatedClient {
        gate: tokio::sync::Semaphore,
        started: AtomicUsize,
    }

    impl GatedClient {
        fn closed() -> Self {
            Self {
                gate: tokio::sync::Semaphore::new(0),
                started: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl ServiceClient for GatedClient {
        async fn send_post(&self, _path: &str, _body: &Value) -> ClientResult<Value> {
            self.started.fetch_add(1, Ordering::SeqCst);
            let permit = self.gate.acquire().await;
            drop(permit);
            Ok(json!({}))
        }

        async fn send_get(&self, _path: &str) -> ClientResult<Value> {
            Ok(json!({}))
        }
    }

    #[tokio::test]
    async fn test_full_queue_blocks_the_producer() {
        let client = Arc::new(GatedClient::closed());
        let pool = Arc::new(SubmissionPool::new(client.clone(), 1));

        let dispatch = tokio::spawn({
            let pool = pool.clone();
            async move { pool.dispatch(3, (1..=10).map(result).collect()).await }
        });

        // One item in flight, two queued, the producer parked on the fourth.
        tokio::time::timeout(Duration::from_secs(5), async {
            while client.started.load(Ordering::SeqCst) < 1 || pool.pending() < 2 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(client.started.load(Ordering::SeqCst), 1);
        assert_eq!(pool.pending(), 2);
        assert_eq!(pool.queue.capacity(), 0);
        assert!(!dispatch.is_finished());

        client.gate.add_permits(10);
        let reports = tokio::time::timeout(Duration::from_secs(5), dispatch)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(reports.len(), 10);
        assert!(reports.iter().all(|r| r.status == SubmissionStatus::Accepted));
        assert_eq!(client.started.load(Ordering::SeqCst), 10);
        assert_eq!(pool.pending(), 0);
    }

    #[tokio::test]
    async fn test_single_worker_preserves_dispatch_order() {
        let client = Arc::new(MockClient::new());
        let pool = SubmissionPool::new(client.clone(), 1);

        pool.dispatch(7, vec![result(3), result(1), result(2)]).await;

        let paths: Vec<_> = client.requests().into_iter().map(|r| r.path).collect();
        assert_eq!(
            paths,
            vec![
                "add_result_for_case/7/3",
                "add_result_for_case/7/1",
                "add_result_for_case/7/2",
            ]
        );
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let client = Arc::new(
            MockClient::new()
                .with_response(
                    "add_result_for_case/5/2",
                    json!({ "error": "Field :status_id is not a valid status." }),
                )
                .with_response(
                    "add_result_for_case/5/3",
                    json!({ "error": "No (active) test found for the run/case combination." }),
                )
                .with_transport_error("add_result_for_case/5/4", "connection reset"),
        );
        let pool = SubmissionPool::new(client.clone(), 2);

        let mut reports = pool.dispatch(5, (1..=5).map(result).collect()).await;
        reports.sort_by_key(|r| r.case_id);

        let statuses: Vec<_> = reports.iter().map(|r| r.status.clone()).collect();
        assert_eq!(statuses[0], SubmissionStatus::Accepted);
        assert!(matches!(statuses[1], SubmissionStatus::Rejected(_)));
        assert!(matches!(statuses[2], SubmissionStatus::Suppressed(_)));
        assert!(matches!(statuses[3], SubmissionStatus::Failed(_)));
        assert_eq!(statuses[4], SubmissionStatus::Accepted);
        assert_eq!(client.requests().len(), 5);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_pool_is_reusable_across_dispatches() {
        let client = Arc::new(MockClient::new());
        let pool = SubmissionPool::new(client.clone(), 2);

        assert_eq!(pool.dispatch(10, vec![result(1), result(2)]).await.len(), 2);
        assert_eq!(pool.dispatch(11, vec![result(1)]).await.len(), 1);
        assert!(pool.dispatch(12, Vec::new()).await.is_empty());

        assert_eq!(client.requests_to("add_result_for_case/10/").len(), 2);
        assert_eq!(client.requests_to("add_result_for_case/11/").len(), 1);
        pool.shutdown().await;
    }
}
