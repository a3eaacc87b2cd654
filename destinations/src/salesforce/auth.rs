//! OAuth password grant against the Salesforce login endpoint.

use super::config::{SalesforceConfig, TOKEN_REQUEST_URL};
use crate::api::ApiClient;
use crate::errors::{Result, TransformError};
use serde::Deserialize;
use serde_json::json;
use shared::transport::{Headers, Transport};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    instance_url: String,
}

/// A token together with the instance it is valid for.
#[derive(Clone, Debug, PartialEq)]
pub struct Session {
    pub authorization: String,
    pub instance_url: String,
}

impl Session {
    pub fn headers(&self) -> Headers {
        Headers::from([("Authorization".to_string(), self.authorization.clone())])
    }
}

pub async fn login(transport: Arc<dyn Transport>, config: &SalesforceConfig) -> Result<Session> {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("username", &config.user_name)
        .append_pair("password", &format!("{}{}", config.password, config.initial_access_token))
        .append_pair("client_id", &config.consumer_key)
        .append_pair("client_secret", &config.consumer_secret)
        .append_pair("grant_type", "password")
        .finish();

    let response = ApiClient::new(transport, TOKEN_REQUEST_URL, Headers::new())
        .post(&format!("?{query}"), &json!({}))
        .await
        .map_err(|e| TransformError::fetch("access token", e))?;
    let token: TokenResponse = serde_json::from_value(response.data)
        .map_err(|e| TransformError::fetch("access token", e))?;

    Ok(Session {
        authorization: format!("Bearer {}", token.access_token),
        instance_url: token.instance_url.trim_end_matches('/').to_string(),
    })
}
