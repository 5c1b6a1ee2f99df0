//! HTTP client for the service's v2 JSON API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use serde_json::{Value, json};
use tracing::debug;

use super::{ClientError, ClientResult, ServiceClient, remote_error};
use crate::LOG_TARGET;
use crate::config::ServiceConfig;

/// User agent for service requests.
const USER_AGENT_VALUE: &str = concat!("railpost/", env!("CARGO_PKG_VERSION"));

/// Path segment between the service URL and an endpoint.
const API_ROOT: &str = "index.php?/api/v2/";

/// Talks to the service over HTTPS with basic authentication.
///
/// Timeouts are enforced by the underlying `reqwest` client and surface as
/// [`ClientError::Timeout`].
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    base_url: String,
    user: String,
    password: Option<String>,
}

impl HttpClient {
    /// Builds a client from the `[service]` configuration.
    pub fn new(config: &ServiceConfig) -> ClientResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(!config.verify_tls)
            .default_headers(headers)
            .build()
            .map_err(|e| ClientError::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: api_base(&config.url),
            user: config.user.clone(),
            password: config.password.clone(),
        })
    }

    /// Returns the URL endpoint paths are appended to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&Value>,
    ) -> ClientResult<Value> {
        let url = format!("{}{}", self.base_url, path);
        debug!(target: LOG_TARGET, %method, url = %url, "sending request");

        let mut request = self
            .client
            .request(method, &url)
            .basic_auth(&self.user, self.password.as_ref());
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ClientError::Timeout(format!("{}: {}", url, e))
            } else {
                ClientError::Connection(format!("{}: {}", url, e))
            }
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ClientError::Connection(format!("failed to read response body: {}", e)))?;

        parse_response(status.as_u16(), status.is_success(), &text)
    }
}

#[async_trait]
impl ServiceClient for HttpClient {
    async fn send_post(&self, path: &str, body: &Value) -> ClientResult<Value> {
        self.request(reqwest::Method::POST, path, Some(body)).await
    }

    async fn send_get(&self, path: &str) -> ClientResult<Value> {
        self.request(reqwest::Method::GET, path, None).await
    }
}

/// Normalizes the configured service URL into the API base.
fn api_base(url: &str) -> String {
    format!("{}/{}", url.trim_end_matches('/'), API_ROOT)
}

/// Interprets a response body.
///
/// Failure statuses carrying an `error` payload are returned as values so
/// the caller sees them as service-reported errors.
fn parse_response(status: u16, success: bool, text: &str) -> ClientResult<Value> {
    if text.trim().is_empty() {
        return if success {
            Ok(json!({}))
        } else {
            Err(ClientError::Http {
                status,
                body: String::new(),
            })
        };
    }

    match serde_json::from_str::<Value>(text) {
        Ok(value) if success || remote_error(&value).is_some() => Ok(value),
        Ok(_) => Err(ClientError::Http {
            status,
            body: text.to_string(),
        }),
        Err(_) if !success => Err(ClientError::Http {
            status,
            body: text.to_string(),
        }),
        Err(e) => Err(ClientError::InvalidResponse(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_base_normalizes_trailing_slash() {
        assert_eq!(
            api_base("https://example.testrail.io/"),
            "https://example.testrail.io/index.php?/api/v2/"
        );
        assert_eq!(
            api_base("https://example.testrail.io"),
            "https://example.testrail.io/index.php?/api/v2/"
        );
    }

    #[test]
    fn test_error_payload_on_failure_status_is_a_value() {
        let value = parse_response(400, false, r#"{"error": "Field :run_id is not a valid test run."}"#)
            .unwrap();
        assert_eq!(
            remote_error(&value).as_deref(),
            Some("Field :run_id is not a valid test run.")
        );
    }

    #[test]
    fn test_failure_status_without_payload() {
        assert!(matches!(
            parse_response(502, false, "Bad Gateway"),
            Err(ClientError::Http { status: 502, .. })
        ));
        assert!(matches!(
            parse_response(500, false, ""),
            Err(ClientError::Http { status: 500, .. })
        ));
    }

    #[test]
    fn test_success_bodies() {
        assert_eq!(parse_response(200, true, "").unwrap(), json!({}));
        assert_eq!(
            parse_response(200, true, r#"{"id": 12}"#).unwrap(),
            json!({ "id": 12 })
        );
        assert!(matches!(
            parse_response(200, true, "<html>"),
            Err(ClientError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_client_builds_from_config() {
        let config = ServiceConfig {
            url: "https://example.testrail.io".to_string(),
            user: "ci@example.com".to_string(),
            password: Some("secret".to_string()),
            verify_tls: true,
            timeout_secs: 30,
        };
        let client = HttpClient::new(&config).unwrap();
        assert_eq!(client.base_url(), "https://example.testrail.io/index.php?/api/v2/");
    }
}
