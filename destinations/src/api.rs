//! Thin client over the transport for adapters that call a REST API during
//! transformation.

use serde_json::Value;
use shared::transport::{Headers, Transport, TransportError, TransportResponse};
use std::sync::Arc;

/// Base url plus the headers every call to one API carries.
///
/// Calls return `Err(reason)` for transport failures and non-2xx statuses
/// alike, so callers decide whether a failure is fatal or per-item.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    base_url: String,
    headers: Headers,
}

impl ApiClient {
    pub fn new(transport: Arc<dyn Transport>, base_url: &str, headers: Headers) -> Self {
        Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
            headers,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub async fn get(&self, path: &str) -> Result<TransportResponse, String> {
        checked(self.transport.get(&self.url(path), &self.headers).await)
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<TransportResponse, String> {
        checked(self.transport.post(&self.url(path), body, &self.headers).await)
    }
}

/// Turns a transport result into a response, treating non-2xx statuses as
/// failures described by status and body.
pub fn checked(
    result: Result<TransportResponse, TransportError>,
) -> Result<TransportResponse, String> {
    let response = result.map_err(|e| e.to_string())?;
    if response.is_success() {
        Ok(response)
    } else {
        Err(format!("unexpected status {}: {}", response.status, response.data))
    }
}

/// Reads a remote id that APIs return either as a string or a number.
pub fn remote_id(value: &Value) -> Option<String> {
    match value {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::MockTransport;
    use http::{Method, StatusCode};
    use serde_json::json;

    #[test]
    fn test_checked() {
        let ok = checked(Ok(TransportResponse::new(StatusCode::CREATED, json!({}))));
        assert!(ok.is_ok());

        let err = checked(Ok(TransportResponse::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({"errors": []}),
        )))
        .unwrap_err();
        assert_eq!(err, r#"unexpected status 422 Unprocessable Entity: {"errors":[]}"#);

        let err = checked(Err(TransportError::Timeout {
            url: "https://x".to_string(),
        }))
        .unwrap_err();
        assert_eq!(err, "request to https://x timed out");
    }

    #[test]
    fn test_remote_id() {
        assert_eq!(remote_id(&json!("12")), Some("12".to_string()));
        assert_eq!(remote_id(&json!(12)), Some("12".to_string()));
        assert_eq!(remote_id(&json!(null)), None);
    }

    #[tokio::test]
    async fn test_client_joins_base_url_and_sends_headers() {
        let transport = Arc::new(
            MockTransport::new().on(
                Method::GET,
                "https://acct.api-us1.com/api/3/tags",
                StatusCode::OK,
                json!({"tags": []}),
            ),
        );
        let client = ApiClient::new(
            transport.clone(),
            "https://acct.api-us1.com/",
            Headers::from([("Api-Token".to_string(), "secret".to_string())]),
        );

        let response = client.get("/api/3/tags").await.unwrap();
        assert_eq!(response.data, json!({"tags": []}));

        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].headers["Api-Token"], "secret");

        // Unrouted path answers 404
        assert!(client.post("/api/3/contacts", &json!({})).await.is_err());
    }
}
