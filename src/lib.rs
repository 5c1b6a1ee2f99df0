//! railpost: publish test session results to a test management service.
//!
//! Outcomes collected while tests run are buffered, mapped onto the
//! service's status vocabulary, and submitted one case at a time through a
//! fixed pool of workers, against a single run or every open run of a plan.
//!
//! # Architecture
//!
//! The main components are:
//!
//! - **Status**: Map test finish states to service status codes
//! - **Comment**: Turn failure traces into bounded, indented comments
//! - **Results**: Buffer outcomes and project them into submissions
//! - **Resolver**: Ask the service which runs and plans are open
//! - **Publisher**: Submit results through a bounded worker pool
//! - **Session**: Pick the target once per session, publish, and close
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use railpost::client::http::HttpClient;
//! use railpost::config::load_config;
//! use railpost::markers::CollectedTest;
//! use railpost::session::{Session, SessionHooks};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config(std::path::Path::new("railpost.toml"))?;
//!     let client = Arc::new(HttpClient::new(&config.service)?);
//!     let mut session = Session::new(client, &config);
//!
//!     let mut items = vec![CollectedTest::new("tests/test_login.py::test_ok").with_cases([100])];
//!     session.on_collection_finalized(&mut items).await;
//!     // ... feed session.on_test_finished(...) as tests finish ...
//!     let report = session.on_session_finished().await;
//!     session.shutdown().await;
//!     println!("{} results accepted", report.total().accepted);
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod comment;
pub mod config;
pub mod markers;
pub mod publisher;
pub mod report;
pub mod resolver;
pub mod results;
pub mod session;
pub mod status;

/// Tracing target of every log line emitted by this crate.
pub const LOG_TARGET: &str = "testrail";

// Re-export commonly used types
pub use client::{ServiceClient, http::HttpClient};
pub use config::{Config, load_config};
pub use publisher::{PublishOptions, PublishSummary, Publisher};
pub use results::{Outcome, PublishableResult, ResultBuffer};
pub use session::{Session, SessionHooks, SessionReport, Target, TestReport};
pub use status::{FinishState, ServiceStatus};
