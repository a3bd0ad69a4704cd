//! HTTP invoker: one fully-expanded request in, one captured response out.

use std::collections::HashMap;
use std::time::Duration;

use apiqa_core::Request;

use crate::cancel::CancelToken;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("client: {0}")]
    Client(String),
    #[error("invalid HTTP method {0:?}")]
    Method(String),
    #[error("json marshal body: {0}")]
    Body(String),
    #[error("do: {0}")]
    Send(String),
    #[error("read body: {0}")]
    Read(String),
    #[error("cancelled")]
    Cancelled,
}

/// A fully-read response. Headers are multi-valued, matching the wire.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, Vec<String>>,
    pub body: Vec<u8>,
}

/// Shared blocking client. Idle connections are pooled and reused across
/// steps; HTTP/2 is negotiated when the server offers it.
#[derive(Debug, Clone)]
pub struct HttpInvoker {
    client: reqwest::blocking::Client,
}

impl HttpInvoker {
    /// # Errors
    ///
    /// Returns an error if the underlying client cannot be constructed.
    pub fn new() -> Result<Self, HttpError> {
        let client = reqwest::blocking::Client::builder()
            .pool_max_idle_per_host(64)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| HttpError::Client(e.to_string()))?;
        Ok(Self { client })
    }

    /// Execute one request. The per-call timeout comes from the request
    /// (default 10 s) clamped by the cancellation token's deadline.
    ///
    /// # Errors
    ///
    /// Transport failures, timeouts, unreadable bodies, and cancellation all
    /// surface as errors; the caller records them as step failures.
    pub fn send(&self, req: &Request, cancel: &CancelToken) -> Result<HttpResponse, HttpError> {
        if cancel.is_cancelled() {
            return Err(HttpError::Cancelled);
        }

        let timeout = if req.timeout_ms > 0 {
            Duration::from_millis(req.timeout_ms as u64)
        } else {
            DEFAULT_TIMEOUT
        };
        let timeout = cancel.clamp(timeout);

        let method = reqwest::Method::from_bytes(req.method.as_bytes())
            .map_err(|_| HttpError::Method(req.method.clone()))?;

        let mut builder = self.client.request(method, &req.url).timeout(timeout);
        for (k, v) in &req.headers {
            builder = builder.header(k, v);
        }
        builder = match &req.body {
            None => builder,
            Some(serde_json::Value::String(s)) => builder.body(s.clone()),
            Some(value) => builder.body(
                serde_json::to_vec(value).map_err(|e| HttpError::Body(e.to_string()))?,
            ),
        };

        let resp = builder.send().map_err(|e| HttpError::Send(e.to_string()))?;

        let status = resp.status().as_u16();
        let mut headers: HashMap<String, Vec<String>> = HashMap::new();
        for key in resp.headers().keys() {
            let values = resp
                .headers()
                .get_all(key)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .map(str::to_string)
                .collect();
            headers.insert(key.as_str().to_string(), values);
        }

        let body = resp
            .bytes()
            .map_err(|e| HttpError::Read(e.to_string()))?
            .to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
