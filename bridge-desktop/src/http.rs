//! `reqwest` transport with rustls and bounded retries.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy},
};
use reqwest::{Client, Method};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("playlist-sync/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Pooled client shared by every adapter.
///
/// [`execute`](HttpClient::execute) sends exactly once; the sync executor
/// owns retries and the YouTube quota counts every request on the wire.
/// [`execute_with_retry`](HttpClient::execute_with_retry) retries connection
/// failures, timeouts and 5xx responses for idempotent methods only. POST is
/// never resent. Every other status is handed back as a response.
pub struct ReqwestHttpClient {
    client: Client,
}

impl ReqwestHttpClient {
    /// Client whose requests give up after `timeout` unless a request sets
    /// its own.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT.min(timeout))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| BridgeError::NotAvailable(format!("Cannot build HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    fn method(method: HttpMethod) -> Method {
        match method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Delete => Method::DELETE,
        }
    }

    async fn send_once(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let mut builder = self
            .client
            .request(Self::method(request.method), &request.url);
        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(map_error)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = response.bytes().await.map_err(map_error)?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

fn map_error(err: reqwest::Error) -> BridgeError {
    if err.is_timeout() {
        BridgeError::Timeout(err.to_string())
    } else if err.is_connect() || err.is_request() || err.is_body() {
        BridgeError::Network(err.to_string())
    } else {
        BridgeError::OperationFailed(err.to_string())
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.execute_with_retry(request, RetryPolicy::no_retry()).await
    }

    async fn execute_with_retry(
        &self,
        request: HttpRequest,
        policy: RetryPolicy,
    ) -> Result<HttpResponse> {
        let max_attempts = if request.method == HttpMethod::Post {
            1
        } else {
            policy.max_attempts.max(1)
        };
        let mut attempt = 1;

        loop {
            debug!(attempt, method = ?request.method, url = %request.url, "HTTP request");
            let outcome = self.send_once(&request).await;

            let retryable = match &outcome {
                Ok(response) => response.is_server_error(),
                Err(err) => err.is_transient(),
            };
            if !retryable || attempt >= max_attempts {
                return outcome;
            }

            let delay = policy.delay_for(attempt);
            match &outcome {
                Ok(response) => warn!(status = response.status, attempt, ?delay, "Server error, retrying"),
                Err(err) => warn!(error = %err, attempt, ?delay, "Transport error, retrying"),
            }
            sleep(delay).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Local server answering every request with 503; returns its base URL.
    async fn unavailable_server(requests: Arc<AtomicUsize>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                requests.fetch_add(1, Ordering::SeqCst);
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(
                        b"HTTP/1.1 503 Service Unavailable\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
                    )
                    .await;
            }
        });
        format!("http://{}", addr)
    }

    fn fast_retries() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_method_mapping() {
        assert_eq!(ReqwestHttpClient::method(HttpMethod::Put), Method::PUT);
        assert_eq!(ReqwestHttpClient::method(HttpMethod::Delete), Method::DELETE);
    }

    #[tokio::test]
    async fn test_connection_refused_is_transient() {
        let client = ReqwestHttpClient::with_timeout(Duration::from_secs(2)).unwrap();
        let request = HttpRequest::new(HttpMethod::Get, "http://127.0.0.1:9/unreachable");

        let err = client
            .execute_with_retry(request, RetryPolicy::no_retry())
            .await
            .unwrap_err();
        assert!(err.is_transient(), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn test_execute_sends_once() {
        let requests = Arc::new(AtomicUsize::new(0));
        let base = unavailable_server(requests.clone()).await;
        let client = ReqwestHttpClient::with_timeout(Duration::from_secs(5)).unwrap();

        let response = client
            .execute(HttpRequest::new(HttpMethod::Post, format!("{}/playlistItems", base)).form("a=b"))
            .await
            .unwrap();

        assert_eq!(response.status, 503);
        assert_eq!(requests.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_policy_applies_to_idempotent_methods_only() {
        let requests = Arc::new(AtomicUsize::new(0));
        let base = unavailable_server(requests.clone()).await;
        let client = ReqwestHttpClient::with_timeout(Duration::from_secs(5)).unwrap();

        let response = client
            .execute_with_retry(
                HttpRequest::new(HttpMethod::Get, format!("{}/playlists", base)),
                fast_retries(),
            )
            .await
            .unwrap();
        assert_eq!(response.status, 503);
        assert_eq!(requests.load(Ordering::SeqCst), 3);

        client
            .execute_with_retry(
                HttpRequest::new(HttpMethod::Post, format!("{}/playlistItems", base)).form("a=b"),
                fast_retries(),
            )
            .await
            .unwrap();
        assert_eq!(requests.load(Ordering::SeqCst), 4);
    }
}
