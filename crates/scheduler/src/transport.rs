//! HTTP transport: sends a [`ResolvedRequest`] and reports status and timing.

use std::time::{Duration, Instant};

use reqsched_core::ResolvedRequest;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};

/// Errors that prevented a response from being received.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("HTTP request failed: {0}")]
    Request(String),

    #[error("invalid header '{name}': {reason}")]
    InvalidHeader { name: String, reason: String },
}

/// What came back from a completed exchange, successful or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    /// `"<code> <reason>"`, e.g. `"200 OK"`.
    pub status_line: String,
    /// Time from send until the body was fully read.
    pub duration: Duration,
    pub body_bytes: usize,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends resolved requests. Implemented by [`ReqwestTransport`] and by test doubles.
#[async_trait::async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(
        &self,
        request: &ResolvedRequest,
        timeout: Duration,
    ) -> Result<TransportResponse, TransportError>;
}

/// [`HttpTransport`] over a shared `reqwest::Client` (connection pooling).
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn header_map(request: &ResolvedRequest) -> Result<HeaderMap, TransportError> {
    let mut headers = HeaderMap::with_capacity(request.headers.len() + 1);
    for (key, value) in &request.headers {
        let invalid = |reason: String| TransportError::InvalidHeader {
            name: key.clone(),
            reason,
        };
        let name = HeaderName::from_bytes(key.as_bytes()).map_err(|e| invalid(e.to_string()))?;
        let value = HeaderValue::from_str(value).map_err(|e| invalid(e.to_string()))?;
        headers.append(name, value);
    }
    Ok(headers)
}

fn classify(e: reqwest::Error, timeout: Duration) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(timeout)
    } else if e.is_connect() {
        TransportError::Connect(e.to_string())
    } else {
        TransportError::Request(e.to_string())
    }
}

#[async_trait::async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(
        &self,
        request: &ResolvedRequest,
        timeout: Duration,
    ) -> Result<TransportResponse, TransportError> {
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| TransportError::Request(e.to_string()))?;
        let mut headers = header_map(request)?;

        let body = match &request.body {
            Some(body) if request.method.sends_body() => {
                let bytes = serde_json::to_vec(body)
                    .map_err(|e| TransportError::Request(format!("failed to encode body: {e}")))?;
                headers
                    .entry(CONTENT_TYPE)
                    .or_insert(HeaderValue::from_static("application/json"));
                Some(bytes)
            }
            _ => None,
        };

        let mut builder = self
            .client
            .request(method, &request.url)
            .headers(headers)
            .timeout(timeout);
        if let Some(bytes) = body {
            builder = builder.body(bytes);
        }

        let start = Instant::now();
        let response = builder.send().await.map_err(|e| classify(e, timeout))?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(|e| classify(e, timeout))?;
        let duration = start.elapsed();

        let status_line = match status.canonical_reason() {
            Some(reason) => format!("{} {reason}", status.as_u16()),
            None => status.as_u16().to_string(),
        };

        tracing::debug!(
            request = %request.name,
            url = %request.url,
            status = %status_line,
            duration_ms = duration.as_millis() as u64,
            bytes = bytes.len(),
            "response received"
        );

        Ok(TransportResponse {
            status: status.as_u16(),
            status_line,
            duration,
            body_bytes: bytes.len(),
        })
    }
}
