//! Canonical description of one outbound HTTP call.
//!
//! The serialized form is what the dispatching layer consumes:
//!
//! ```json
//! {
//!   "version": "1",
//!   "type": "REST",
//!   "method": "POST",
//!   "endpoint": "https://api.example.com/contacts",
//!   "headers": {"Content-Type": "application/json"},
//!   "params": {},
//!   "body": {"JSON": {"email": "a@b.com"}, "XML": {}, "FORM": {}},
//!   "files": {},
//!   "userId": "anon-1",
//!   "statusCode": 200
//! }
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Payload fields where `None` stands for "undefined" and is dropped before
/// the payload is attached. `Some(Value::Null)` is kept: for several
/// destinations an explicit null means "clear this field".
pub type Fields = IndexMap<String, Option<Value>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

/// Encoding of the request body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BodyFormat {
    Json,
    Form,
    Xml,
}

/// Exactly one slot is populated per descriptor; the other two stay present
/// and empty so every destination emits the same shape.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RequestBody {
    #[serde(rename = "JSON")]
    pub json: Map<String, Value>,
    #[serde(rename = "XML")]
    pub xml: Map<String, Value>,
    #[serde(rename = "FORM")]
    pub form: Map<String, Value>,
}

impl RequestBody {
    pub fn new(format: BodyFormat, payload: Map<String, Value>) -> Self {
        let mut body = RequestBody::default();
        match format {
            BodyFormat::Json => body.json = payload,
            BodyFormat::Form => body.form = payload,
            BodyFormat::Xml => body.xml = payload,
        }
        body
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDescriptor {
    pub version: String,
    #[serde(rename = "type")]
    pub request_type: String,
    pub method: HttpMethod,
    pub endpoint: String,
    pub headers: IndexMap<String, String>,
    pub params: Map<String, Value>,
    pub body: RequestBody,
    pub files: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anonymous_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

impl RequestDescriptor {
    pub fn builder(method: HttpMethod, endpoint: impl Into<String>) -> RequestBuilder {
        RequestBuilder {
            descriptor: RequestDescriptor {
                version: "1".to_string(),
                request_type: "REST".to_string(),
                method,
                endpoint: endpoint.into(),
                headers: IndexMap::new(),
                params: Map::new(),
                body: RequestBody::default(),
                files: Map::new(),
                user_id: None,
                anonymous_id: None,
                status_code: None,
            },
        }
    }
}

pub struct RequestBuilder {
    descriptor: RequestDescriptor,
}

impl RequestBuilder {
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.descriptor.headers.insert(name.into(), value.into());
        self
    }

    pub fn params(mut self, params: Map<String, Value>) -> Self {
        self.descriptor.params = params;
        self
    }

    /// Sets the body, replacing any previously set slot.
    pub fn body(mut self, format: BodyFormat, payload: Map<String, Value>) -> Self {
        self.descriptor.body = RequestBody::new(format, payload);
        self
    }

    /// Sets the body from fields that may be undefined.
    pub fn body_fields(self, format: BodyFormat, fields: Fields) -> Self {
        self.body(format, strip_undefined(fields))
    }

    pub fn user_id(mut self, user_id: Option<&str>) -> Self {
        self.descriptor.user_id = user_id.map(str::to_string);
        self
    }

    pub fn anonymous_id(mut self, anonymous_id: Option<&str>) -> Self {
        self.descriptor.anonymous_id = anonymous_id.map(str::to_string);
        self
    }

    pub fn status_code(mut self, status_code: u16) -> Self {
        self.descriptor.status_code = Some(status_code);
        self
    }

    pub fn build(self) -> RequestDescriptor {
        self.descriptor
    }
}

/// Builds a descriptor in one call.
pub fn build(
    endpoint: impl Into<String>,
    method: HttpMethod,
    headers: IndexMap<String, String>,
    format: BodyFormat,
    payload: Fields,
) -> RequestDescriptor {
    let mut descriptor = RequestDescriptor::builder(method, endpoint)
        .body_fields(format, payload)
        .build();
    descriptor.headers = headers;
    descriptor
}

/// Drops undefined fields, keeping explicit nulls.
pub fn strip_undefined(fields: Fields) -> Map<String, Value> {
    fields
        .into_iter()
        .filter_map(|(key, value)| value.map(|v| (key, v)))
        .collect()
}
