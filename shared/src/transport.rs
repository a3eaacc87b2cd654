//! Outbound HTTP collaborator.
//!
//! Destinations that need to read or reconcile remote state talk to the
//! third-party API through the [`Transport`] trait. The transport never turns
//! a non-2xx status into an error: the caller inspects
//! [`TransportResponse::status`] and decides what a failure means for it.

use async_trait::async_trait;
use http::{Method, StatusCode};
use indexmap::IndexMap;
use serde_json::Value;
use std::time::Duration;

/// Request headers, in insertion order.
pub type Headers = IndexMap<String, String>;

#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("request to {url} failed: {reason}")]
    Network { url: String, reason: String },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("could not decode response from {url}: {reason}")]
    Decode { url: String, reason: String },

    #[error("could not build HTTP client: {0}")]
    Client(String),
}

/// Status code and decoded JSON body of a remote call.
///
/// An empty response body decodes to `Value::Null`.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub data: Value,
}

impl TransportResponse {
    pub fn new(status: StatusCode, data: Value) -> Self {
        Self { status, data }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        method: Method,
        url: &str,
        headers: &Headers,
        body: Option<&Value>,
    ) -> Result<TransportResponse, TransportError>;

    async fn get(&self, url: &str, headers: &Headers) -> Result<TransportResponse, TransportError> {
        self.send(Method::GET, url, headers, None).await
    }

    async fn post(
        &self,
        url: &str,
        body: &Value,
        headers: &Headers,
    ) -> Result<TransportResponse, TransportError> {
        self.send(Method::POST, url, headers, Some(body)).await
    }

    async fn patch(
        &self,
        url: &str,
        body: &Value,
        headers: &Headers,
    ) -> Result<TransportResponse, TransportError> {
        self.send(Method::PATCH, url, headers, Some(body)).await
    }

    async fn delete(
        &self,
        url: &str,
        headers: &Headers,
    ) -> Result<TransportResponse, TransportError> {
        self.send(Method::DELETE, url, headers, None).await
    }
}

/// [`Transport`] backed by a pooled `reqwest` client.
///
/// The timeout applies to the whole request/response cycle, including
/// collecting the response body.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        method: Method,
        url: &str,
        headers: &Headers,
        body: Option<&Value>,
    ) -> Result<TransportResponse, TransportError> {
        let mut builder = self.client.request(method.clone(), url);
        for (name, value) in headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let to_error = |e: reqwest::Error| {
            if e.is_timeout() {
                TransportError::Timeout {
                    url: url.to_string(),
                }
            } else {
                TransportError::Network {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            }
        };

        let response = builder.send().await.map_err(to_error)?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(to_error)?;

        let data = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).map_err(|e| TransportError::Decode {
                url: url.to_string(),
                reason: e.to_string(),
            })?
        };

        tracing::debug!(%method, url, status = status.as_u16(), "remote call completed");

        Ok(TransportResponse { status, data })
    }
}
