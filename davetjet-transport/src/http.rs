//! The ambient network primitive.
//!
//! [`HttpClient`] is the "perform network call" capability the executor and
//! the facade wrap. [`ReqwestClient`] is the production implementation; tests
//! substitute scripted clients.

use crate::error::TransportError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// User-Agent sent by [`ReqwestClient`] unless overridden.
pub const DEFAULT_USER_AGENT: &str = concat!("davetjet/", env!("CARGO_PKG_VERSION"));

/// An outgoing request as seen by the ambient interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingRequest {
    /// Upper-case HTTP method.
    pub method: String,
    /// Absolute or origin-relative target.
    pub url: String,
    /// Header pairs in insertion order.
    pub headers: Vec<(String, String)>,
    /// Optional request body.
    pub body: Option<Vec<u8>>,
}

impl OutgoingRequest {
    /// Build a request with the given method and target.
    pub fn new(method: impl AsRef<str>, url: impl Into<String>) -> Self {
        Self {
            method: method.as_ref().to_ascii_uppercase(),
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// `GET url`.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    /// `POST url`.
    pub fn post(url: impl Into<String>) -> Self {
        Self::new("POST", url)
    }

    /// Append a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// First header value matching `name`, case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Drop every header matching `name`, returning the first removed value.
    pub fn take_header(&mut self, name: &str) -> Option<String> {
        let mut taken = None;
        self.headers.retain(|(key, value)| {
            if key.eq_ignore_ascii_case(name) {
                if taken.is_none() {
                    taken = Some(value.clone());
                }
                false
            } else {
                true
            }
        });
        taken
    }
}

/// A fully received response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Numeric status.
    pub status: u16,
    /// Canonical reason phrase, may be empty.
    pub status_text: String,
    /// Header pairs.
    pub headers: Vec<(String, String)>,
    /// Raw body bytes.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Response with `status` and an empty body.
    #[must_use]
    pub fn new(status: u16) -> Self {
        let status_text = reqwest::StatusCode::from_u16(status)
            .ok()
            .and_then(|code| code.canonical_reason())
            .unwrap_or_default()
            .to_owned();
        Self {
            status,
            status_text,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Set the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Append a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// `true` for 2xx statuses.
    #[must_use]
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as text, replacing invalid UTF-8.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Body decoded as JSON.
    ///
    /// # Errors
    ///
    /// Returns the serde error if the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// First header value matching `name`, case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Transport-level failure of a single attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("network error: {0}")]
pub struct NetworkError(pub String);

/// The "perform network call" capability.
///
/// Implementations must be cancel-safe: dropping the returned future abandons
/// the call.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Perform one attempt.
    async fn send(&self, request: &OutgoingRequest) -> Result<HttpResponse, NetworkError>;
}

/// [`HttpClient`] backed by [`reqwest`].
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    inner: reqwest::Client,
}

impl ReqwestClient {
    /// Build a client with a cookie store and bounded redirects.
    ///
    /// No client-level timeout is set: deadlines belong to the executor.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Http`] if the client cannot be constructed.
    pub fn new(user_agent: Option<&str>) -> Result<Self, TransportError> {
        let inner = reqwest::Client::builder()
            .cookie_store(true)
            .user_agent(user_agent.unwrap_or(DEFAULT_USER_AGENT))
            .redirect(reqwest::redirect::Policy::limited(10))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| TransportError::Http(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { inner })
    }

    /// Wrap an existing client.
    #[must_use]
    pub fn from_client(inner: reqwest::Client) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn send(&self, request: &OutgoingRequest) -> Result<HttpResponse, NetworkError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| NetworkError(format!("invalid method {}: {e}", request.method)))?;
        let mut builder = self.inner.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| NetworkError(e.to_string()))?;

        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_owned(), v.to_owned()))
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| NetworkError(format!("failed to read body: {e}")))?;

        Ok(HttpResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_owned(),
            headers,
            body: body.to_vec(),
        })
    }
}
