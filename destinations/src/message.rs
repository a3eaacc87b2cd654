//! The normalized analytics event handed to every destination.

use crate::errors::TransformError;
use mapper::Path;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventType {
    Identify,
    Track,
    Page,
    Screen,
}

impl EventType {
    /// Parses a message type, ignoring case. Returns `None` for types this
    /// layer does not handle (`group`, `alias`, ...).
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "identify" => Some(EventType::Identify),
            "track" => Some(EventType::Track),
            "page" => Some(EventType::Page),
            "screen" => Some(EventType::Screen),
            _ => None,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            EventType::Identify => "identify",
            EventType::Track => "track",
            EventType::Page => "page",
            EventType::Screen => "screen",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only view over a message document.
///
/// The document is kept as JSON because mapping tables address it by path;
/// the accessors below cover the attributes every destination reads.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct Message(Value);

impl Message {
    /// The whole document, always a JSON object.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// The message type. A missing, `null` or blank type is an input error.
    pub fn event_type(&self) -> Result<EventType, TransformError> {
        match self.0.get("type") {
            None | Some(Value::Null) => Err(TransformError::MissingType),
            Some(Value::String(raw)) if raw.trim().is_empty() => Err(TransformError::MissingType),
            Some(Value::String(raw)) => EventType::parse(raw)
                .ok_or_else(|| TransformError::UnsupportedMessageType(raw.to_lowercase())),
            Some(other) => Err(TransformError::UnsupportedMessageType(other.to_string())),
        }
    }

    /// Track event name.
    pub fn event(&self) -> Option<&str> {
        self.0.get("event").and_then(Value::as_str)
    }

    /// Page or screen name.
    pub fn name(&self) -> Option<&str> {
        self.0.get("name").and_then(Value::as_str)
    }

    pub fn properties(&self) -> Option<&Map<String, Value>> {
        self.0.get("properties").and_then(Value::as_object)
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties()
            .and_then(|properties| properties.get(key))
            .filter(|value| !value.is_null())
    }

    /// User traits, read from `context.traits` with `traits` as fallback.
    pub fn traits(&self) -> Option<&Map<String, Value>> {
        self.0
            .pointer("/context/traits")
            .and_then(Value::as_object)
            .or_else(|| self.0.get("traits").and_then(Value::as_object))
    }

    pub fn anonymous_id(&self) -> Option<&str> {
        self.0.get("anonymousId").and_then(Value::as_str)
    }

    pub fn lookup(&self, path: &Path) -> Option<&Value> {
        path.lookup(&self.0)
    }
}

/// Whether a value is set in the loose sense used for fallbacks and flags:
/// null, false, zero and the empty string are not.
pub fn is_set(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

impl TryFrom<Value> for Message {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        if value.is_object() {
            Ok(Message(value))
        } else {
            Err(format!("message must be a JSON object, got {value}"))
        }
    }
}

impl From<Message> for Value {
    fn from(message: Message) -> Self {
        message.0
    }
}
