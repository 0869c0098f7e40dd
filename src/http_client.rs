//! HTTP client abstraction for provider APIs.
//!
//! Command generators and model listing talk to provider APIs through the
//! [`HttpClient`] trait so they can be tested against a mock without making
//! real network requests.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use std::time::Duration;
use tracing::warn;

/// Upper bound for a single provider request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Status and body of a completed HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Trait for HTTP communication with external APIs.
///
/// Non-2xx statuses are returned as responses, not errors; only transport
/// failures are errors.
///
/// # Example
///
/// ```ignore
/// use aida::http_client::{HttpClient, ReqwestHttpClient};
///
/// let client = ReqwestHttpClient::new();
/// let response = client.post_json(
///     "https://api.example.com/endpoint",
///     &[("Authorization", "Bearer token")],
///     &serde_json::json!({"key": "value"}),
/// ).await?;
/// ```
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a POST request with a JSON body.
    async fn post_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &serde_json::Value,
    ) -> Result<HttpResponse>;

    /// Sends a GET request.
    async fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<HttpResponse>;
}

/// HTTP client implementation using reqwest.
pub struct ReqwestHttpClient {
    client: Client,
}

/// Builds `builder`, falling back to a default client without the timeout.
fn build_client(builder: ClientBuilder) -> Client {
    match builder.build() {
        Ok(client) => client,
        Err(err) => {
            warn!("Failed to build HTTP client, requests will have no timeout: {}", err);
            Client::new()
        }
    }
}

impl ReqwestHttpClient {
    /// Creates a client with [`REQUEST_TIMEOUT`] applied to every request.
    pub fn new() -> Self {
        let client = build_client(Client::builder().timeout(REQUEST_TIMEOUT));
        Self { client }
    }

    async fn finish(request: reqwest::RequestBuilder) -> Result<HttpResponse> {
        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(HttpResponse { status, body })
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn post_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &serde_json::Value,
    ) -> Result<HttpResponse> {
        let mut request = self.client.post(url);

        for (key, value) in headers {
            request = request.header(*key, *value);
        }

        Self::finish(request.json(body)).await
    }

    async fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<HttpResponse> {
        let mut request = self.client.get(url);

        for (key, value) in headers {
            request = request.header(*key, *value);
        }

        Self::finish(request).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// A request captured by [`MockHttpClient`].
    #[derive(Debug, Clone)]
    pub struct RecordedRequest {
        pub method: &'static str,
        pub url: String,
        pub headers: Vec<(String, String)>,
        pub body: Option<serde_json::Value>,
    }

    impl RecordedRequest {
        pub fn header(&self, name: &str) -> Option<&str> {
            self.headers
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value.as_str())
        }
    }

    /// Mock HTTP client for testing.
    ///
    /// Replays queued responses in order and records every request.
    pub struct MockHttpClient {
        responses: Mutex<VecDeque<HttpResponse>>,
        requests: Mutex<Vec<RecordedRequest>>,
    }

    impl MockHttpClient {
        pub fn new(responses: Vec<(u16, &str)>) -> Self {
            Self {
                responses: Mutex::new(
                    responses
                        .into_iter()
                        .map(|(status, body)| HttpResponse {
                            status,
                            body: body.to_string(),
                        })
                        .collect(),
                ),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn requests(&self) -> Vec<RecordedRequest> {
            self.requests.lock().unwrap().clone()
        }

        fn record(
            &self,
            method: &'static str,
            url: &str,
            headers: &[(&str, &str)],
            body: Option<&serde_json::Value>,
        ) -> Result<HttpResponse> {
            self.requests.lock().unwrap().push(RecordedRequest {
                method,
                url: url.to_string(),
                headers: headers
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                body: body.cloned(),
            });
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| anyhow::anyhow!("no mock response queued for {url}"))
        }
    }

    #[async_trait]
    impl HttpClient for MockHttpClient {
        async fn post_json(
            &self,
            url: &str,
            headers: &[(&str, &str)],
            body: &serde_json::Value,
        ) -> Result<HttpResponse> {
            self.record("POST", url, headers, Some(body))
        }

        async fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<HttpResponse> {
            self.record("GET", url, headers, None)
        }
    }

    #[test]
    fn test_http_response_success_range() {
        let ok = HttpResponse { status: 204, body: String::new() };
        let redirect = HttpResponse { status: 302, body: String::new() };
        let error = HttpResponse { status: 401, body: String::new() };

        assert!(ok.is_success());
        assert!(!redirect.is_success());
        assert!(!error.is_success());
    }

    #[test]
    fn test_build_client_falls_back_when_builder_fails() {
        assert!(Client::builder().user_agent("bad\nagent").build().is_err());

        let client = build_client(Client::builder().user_agent("bad\nagent"));

        assert!(client.get("http://localhost/models").build().is_ok());
    }

    #[tokio::test]
    async fn test_mock_http_client_replays_and_records() {
        let client = MockHttpClient::new(vec![(200, "first"), (500, "second")]);

        let first = client
            .post_json("https://x/a", &[("k", "v")], &serde_json::json!({"a": 1}))
            .await
            .unwrap();
        let second = client.get("https://x/b", &[]).await.unwrap();

        assert_eq!(first.body, "first");
        assert_eq!(second.status, 500);
        let requests = client.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].header("K"), Some("v"));
        assert_eq!(requests[1].method, "GET");
        assert!(client.get("https://x/c", &[]).await.is_err());
    }
}
