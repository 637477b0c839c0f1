//! Thin HTTP request/response primitive against a fixed engine endpoint.
//!
//! The transport never interprets status codes: a 404 or 500 from the engine
//! is a successful round-trip as far as this layer is concerned. Only failing
//! to talk to the engine at all is an error here.

use async_trait::async_trait;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::TransportError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        }
    }
}

/// Request payload with its content type.
#[derive(Clone, Debug)]
pub enum RequestBody {
    Json(Vec<u8>),
    Binary(Vec<u8>),
}

impl RequestBody {
    pub fn json<T: serde::Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_vec(value).map(RequestBody::Json)
    }

    fn content_type(&self) -> &'static str {
        match self {
            RequestBody::Json(_) => "application/json",
            RequestBody::Binary(_) => "application/octet-stream",
        }
    }

    fn into_bytes(self) -> Vec<u8> {
        match self {
            RequestBody::Json(b) | RequestBody::Binary(b) => b,
        }
    }
}

/// Status, content type and the complete body of one engine response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// One round-trip against the engine.
#[async_trait]
pub trait Transport: Send + Sync {
    /// `path` includes the query string and starts with `/`.
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<RequestBody>,
    ) -> Result<RawResponse, TransportError>;
}

/// reqwest-backed transport. No retries, no timeout, no auth.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: config.endpoint().to_string(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn unreachable(&self, e: reqwest::Error) -> TransportError {
        TransportError::Unreachable {
            endpoint: self.endpoint.clone(),
            reason: e.to_string(),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<RequestBody>,
    ) -> Result<RawResponse, TransportError> {
        let url = format!("{}{}", self.endpoint, path);
        let mut req = match method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Delete => self.client.delete(&url),
        };
        if let Some(body) = body {
            req = req
                .header(reqwest::header::CONTENT_TYPE, body.content_type())
                .body(body.into_bytes());
        }

        let mut resp = req.send().await.map_err(|e| self.unreachable(e))?;
        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        // Read chunk by chunk; the log endpoint can be large.
        let mut bytes = Vec::new();
        while let Some(chunk) = resp.chunk().await.map_err(|e| self.unreachable(e))? {
            bytes.extend_from_slice(&chunk);
        }

        debug!(method = method.as_str(), path, status, len = bytes.len(), "engine request");

        Ok(RawResponse { status, content_type, body: bytes })
    }
}
