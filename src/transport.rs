//! HTTP transport seam.
//!
//! [`ApiClient`](crate::client::ApiClient) talks to the network only through
//! [`HttpTransport`], so retry and rate-limit behaviour can be exercised
//! against a scripted transport. [`UreqTransport`] is the real one.

use std::collections::HashMap;
use std::time::Duration;

use thiserror::Error;

use crate::rate_limit::{HEADER_LIMIT, HEADER_REMAINING, HEADER_RESET, HEADER_RETRY_AFTER};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
}

/// Failure below HTTP: nothing came back from the server.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("transport error: {0}")]
    Other(String),
}

pub trait HttpTransport: Send + Sync {
    /// Perform one request. Any HTTP status, error statuses included, is an
    /// `Ok` response.
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// ureq
// ─────────────────────────────────────────────────────────────────────────────

/// Header names the client reads, in the casing it reads them.
const TRACKED_HEADERS: &[&str] = &[HEADER_LIMIT, HEADER_REMAINING, HEADER_RESET, HEADER_RETRY_AFTER];

pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(connect_timeout: Duration, read_timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(connect_timeout)
            .timeout_read(read_timeout)
            .user_agent(concat!("parsitweet/", env!("CARGO_PKG_VERSION")))
            .build();
        Self { agent }
    }

    fn read_response(response: ureq::Response) -> Result<HttpResponse, TransportError> {
        let status = response.status();
        let mut headers = HashMap::new();
        for name in response.headers_names() {
            if let Some(value) = response.header(&name) {
                // ureq may hand names back lowercased.
                let canonical = TRACKED_HEADERS
                    .iter()
                    .find(|h| h.eq_ignore_ascii_case(&name))
                    .map_or(name.clone(), |h| h.to_string());
                headers.insert(canonical, value.to_string());
            }
        }
        let body = response
            .into_string()
            .map_err(|e| TransportError::Other(format!("failed to read body: {e}")))?;
        Ok(HttpResponse { status, headers, body })
    }
}

impl HttpTransport for UreqTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut req = self.agent.request(&request.method, &request.url);
        for (k, v) in &request.headers {
            req = req.set(k, v);
        }
        for (k, v) in &request.query {
            req = req.query(k, v);
        }

        match req.call() {
            Ok(response) => Self::read_response(response),
            Err(ureq::Error::Status(_, response)) => Self::read_response(response),
            Err(ureq::Error::Transport(t)) => {
                let msg = t.to_string();
                Err(match t.kind() {
                    ureq::ErrorKind::Dns | ureq::ErrorKind::ConnectionFailed => {
                        TransportError::Connect(msg)
                    }
                    _ if msg.contains("timed out") => TransportError::Timeout(msg),
                    _ => TransportError::Other(msg),
                })
            }
        }
    }
}
