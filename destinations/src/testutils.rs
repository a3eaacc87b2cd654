//! Scripted transport for destination tests.

use async_trait::async_trait;
use http::{Method, StatusCode};
use serde_json::Value;
use shared::transport::{Headers, Transport, TransportError, TransportResponse};
use std::sync::Mutex;

#[derive(Clone, Debug)]
pub enum Reply {
    Respond(StatusCode, Value),
    Fail,
}

struct Route {
    method: Method,
    url: String,
    body: Option<Value>,
    reply: Reply,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RecordedCall {
    pub method: Method,
    pub url: String,
    pub headers: Headers,
    pub body: Option<Value>,
}

/// Answers calls from a route table and records every call it receives.
///
/// A route with a body only matches calls with exactly that body and takes
/// priority over a body-less route for the same method and url. Unmatched
/// calls get a 404 with an empty body.
#[derive(Default)]
pub struct MockTransport {
    routes: Vec<Route>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, method: Method, url: &str, status: StatusCode, data: Value) -> Self {
        self.routes.push(Route {
            method,
            url: url.to_string(),
            body: None,
            reply: Reply::Respond(status, data),
        });
        self
    }

    /// Fails calls with a network error. A `body` narrows the route to calls
    /// sending exactly that body.
    pub fn fail(mut self, method: Method, url: &str, body: Option<Value>) -> Self {
        self.routes.push(Route {
            method,
            url: url.to_string(),
            body,
            reply: Reply::Fail,
        });
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, method: Method, url: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.method == method && call.url == url)
            .collect()
    }

    fn route_for(&self, method: &Method, url: &str, body: Option<&Value>) -> Option<&Route> {
        let candidates = || {
            self.routes
                .iter()
                .filter(move |route| route.method == *method && route.url == url)
        };
        candidates()
            .find(|route| route.body.is_some() && route.body.as_ref() == body)
            .or_else(|| candidates().find(|route| route.body.is_none()))
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(
        &self,
        method: Method,
        url: &str,
        headers: &Headers,
        body: Option<&Value>,
    ) -> Result<TransportResponse, TransportError> {
        self.calls.lock().unwrap().push(RecordedCall {
            method: method.clone(),
            url: url.to_string(),
            headers: headers.clone(),
            body: body.cloned(),
        });

        match self.route_for(&method, url, body).map(|route| &route.reply) {
            Some(Reply::Respond(status, data)) => Ok(TransportResponse::new(*status, data.clone())),
            Some(Reply::Fail) => Err(TransportError::Network {
                url: url.to_string(),
                reason: "connection refused".to_string(),
            }),
            None => Ok(TransportResponse::new(StatusCode::NOT_FOUND, Value::Null)),
        }
    }
}
