//! HubSpot: contact upserts, custom-object associations and behavioral
//! events.
//!
//! Traits are sent as contact properties. Besides the mapped traits, any
//! trait whose normalized key names a property of the account is sent too,
//! which needs the account's property list. The list is fetched once per
//! message.

mod config;

pub use config::HubSpotConfig;

use crate::api::ApiClient;
use crate::dispatcher::{Dispatcher, EventAliases};
use crate::errors::{Result, TransformError};
use crate::handler::{Destination, MappingTables, parse_config};
use crate::message::{EventType, Message, is_set};
use crate::request::{BodyFormat, HttpMethod, RequestDescriptor};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use config::{
    API_URL, CREATE_OR_UPDATE_PATH, IDENTIFY, MAPPING_TABLES, PROPERTIES_PATH, TRACK, TRACK_URL,
};
use mapper::MappingError;
use serde_json::{Map, Value, json};
use shared::transport::{Headers, Transport};
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

/// Contact property name to property type (`string`, `date`, ...).
type PropertyTypes = HashMap<String, String>;

pub struct HubSpot {
    transport: Arc<dyn Transport>,
    tables: MappingTables,
    dispatcher: Dispatcher,
}

impl HubSpot {
    pub const NAME: &'static str = "HS";

    pub fn new(transport: Arc<dyn Transport>) -> std::result::Result<Self, MappingError> {
        Ok(Self {
            transport,
            tables: MappingTables::load(MAPPING_TABLES)?,
            dispatcher: Dispatcher::new().identify(&IDENTIFY).track(&TRACK),
        })
    }

    async fn property_types(&self, config: &HubSpotConfig) -> Result<PropertyTypes> {
        let client = ApiClient::new(self.transport.clone(), API_URL, Headers::new());
        let path = format!("{PROPERTIES_PATH}?{}", api_key_query(config));
        let response = client
            .get(&path)
            .await
            .map_err(|e| TransformError::fetch("contact properties", e))?;

        let properties = response.data.as_array().ok_or_else(|| {
            TransformError::fetch("contact properties", "response is not a list of properties")
        })?;
        let types: PropertyTypes = properties
            .iter()
            .filter_map(|property| {
                let name = property.get("name")?.as_str()?;
                let kind = property.get("type")?.as_str()?;
                Some((name.to_string(), kind.to_string()))
            })
            .collect();
        tracing::debug!(properties = types.len(), "fetched contact properties");
        Ok(types)
    }

    /// Mapped traits plus the traits that match an account property.
    ///
    /// A mapped value wins over a matched trait with the same key.
    async fn user_properties(
        &self,
        message: &Message,
        config: &HubSpotConfig,
    ) -> Result<Map<String, Value>> {
        let Some(traits) = message.traits() else {
            return Ok(Map::new());
        };
        let mut payload = self.tables.get(IDENTIFY.name)?.construct(message.as_value())?;
        let types = self.property_types(config).await?;

        for (key, value) in traits {
            if value.is_null() {
                continue;
            }
            let property = property_key(key);
            if payload.contains_key(&property) {
                continue;
            }
            let Some(kind) = types.get(&property) else {
                continue;
            };
            let value = if kind == "date" {
                date_value(&property, value)
            } else {
                value.clone()
            };
            payload.insert(property, value);
        }
        Ok(payload)
    }

    async fn identify(&self, message: &Message, config: &HubSpotConfig) -> Result<Vec<RequestDescriptor>> {
        let traits = message.traits();
        let email = traits
            .and_then(|traits| traits.get("email"))
            .and_then(Value::as_str)
            .filter(|email| !email.is_empty())
            .ok_or_else(|| TransformError::InvalidEvent("Identify without email is not supported.".to_string()))?;

        let properties: Vec<Value> = self
            .user_properties(message, config)
            .await?
            .into_iter()
            .map(|(property, value)| json!({"property": property, "value": value}))
            .collect();

        let endpoint = with_segments(&format!("{API_URL}{CREATE_OR_UPDATE_PATH}"), &[email])?;
        let mut body = Map::new();
        body.insert("properties".to_string(), Value::Array(properties));

        let mut requests = vec![
            RequestDescriptor::builder(HttpMethod::Post, endpoint)
                .header("Content-Type", "application/json")
                .params(api_key_params(config))
                .body(BodyFormat::Json, body)
                .user_id(message.anonymous_id())
                .anonymous_id(message.anonymous_id())
                .status_code(200)
                .build(),
        ];

        if let Some(association) = traits.and_then(|traits| traits.get("hubspot")) {
            requests.push(association_request(message, association, config)?);
        }
        Ok(requests)
    }

    async fn track(&self, message: &Message, config: &HubSpotConfig) -> Result<RequestDescriptor> {
        let hub_id = config.hub_id.clone().ok_or_else(|| {
            TransformError::InvalidDestinationConfig(format!("{}: hubID is required for track events", Self::NAME))
        })?;

        let mut params = Map::new();
        params.insert("_a".to_string(), Value::String(hub_id));
        if let Some(event) = message.event() {
            params.insert("_n".to_string(), Value::String(event.to_string()));
        }
        let amount = ["revenue", "value"]
            .iter()
            .filter_map(|key| message.property(key))
            .find(|amount| is_set(amount));
        if let Some(amount) = amount {
            params.insert("_m".to_string(), amount.clone());
        }
        params.extend(self.user_properties(message, config).await?);

        Ok(RequestDescriptor::builder(HttpMethod::Get, TRACK_URL)
            .header("Content-Type", "application/json")
            .params(params)
            .user_id(message.anonymous_id())
            .anonymous_id(message.anonymous_id())
            .status_code(200)
            .build())
    }
}

#[async_trait]
impl Destination for HubSpot {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn process(&self, message: &Message, config: &Value) -> Result<Vec<RequestDescriptor>> {
        let config: HubSpotConfig = parse_config(Self::NAME, config)?;
        let classification = self.dispatcher.classify(message, &EventAliases::default())?;

        match classification.event_type {
            EventType::Identify => self.identify(message, &config).await,
            EventType::Track => Ok(vec![self.track(message, &config).await?]),
            other => Err(TransformError::UnsupportedMessageType(other.to_string())),
        }
    }
}

/// Batch association of custom objects to the contact, driven by
/// `traits.hubspot`.
fn association_request(
    message: &Message,
    association: &Value,
    config: &HubSpotConfig,
) -> Result<RequestDescriptor> {
    let aborted = |what: &str| {
        TransformError::InvalidEvent(format!(
            "HubSpot {what} is not provided. Aborting custom-object association"
        ))
    };

    let contact_id = association
        .get("contactId")
        .filter(|id| is_set(id))
        .ok_or_else(|| aborted("contactId"))?;
    let qualified_name = association
        .get("qualifiedName")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| aborted("qualifiedName"))?;
    let objects = association
        .get("objects")
        .and_then(Value::as_array)
        .filter(|objects| !objects.is_empty())
        .ok_or_else(|| aborted("objects"))?;

    let inputs: Vec<Value> = objects
        .iter()
        .map(|object| {
            let object_type = match object.get("objectType") {
                Some(Value::String(kind)) => kind.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            };
            json!({
                "from": {"id": object.get("objectId").cloned().unwrap_or(Value::Null)},
                "to": {"id": contact_id},
                "type": format!("{object_type}_to_contact"),
            })
        })
        .collect();

    let endpoint = with_segments(
        &format!("{API_URL}/crm/v3/associations"),
        &[qualified_name, "contact", "batch", "create"],
    )?;
    let mut body = Map::new();
    body.insert("inputs".to_string(), Value::Array(inputs));

    Ok(RequestDescriptor::builder(HttpMethod::Post, endpoint)
        .header("Content-Type", "application/json")
        .params(api_key_params(config))
        .body(BodyFormat::Json, body)
        .user_id(message.anonymous_id())
        .anonymous_id(message.anonymous_id())
        .status_code(200)
        .build())
}

/// Property name HubSpot uses for a trait key.
fn property_key(key: &str) -> String {
    key.to_lowercase()
        .chars()
        .map(|c| if c.is_whitespace() || c == '.' { '_' } else { c })
        .collect()
}

/// Date properties are sent as epoch milliseconds at UTC midnight.
///
/// Values that are not a recognizable date are sent unchanged.
fn date_value(property: &str, value: &Value) -> Value {
    match midnight_millis(value) {
        Some(millis) => json!(millis),
        None => {
            tracing::warn!(property, value = %value, "date property is not a date, sending it unchanged");
            value.clone()
        }
    }
}

fn midnight_millis(value: &Value) -> Option<i64> {
    let date = match value {
        Value::String(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|time| time.with_timezone(&Utc).date_naive())
            .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
            .ok()?,
        Value::Number(millis) => DateTime::<Utc>::from_timestamp_millis(millis.as_i64()?)?.date_naive(),
        _ => return None,
    };
    Some(date.and_time(NaiveTime::MIN).and_utc().timestamp_millis())
}

fn api_key_params(config: &HubSpotConfig) -> Map<String, Value> {
    let mut params = Map::new();
    params.insert("hapikey".to_string(), Value::String(config.api_key.clone()));
    params
}

fn api_key_query(config: &HubSpotConfig) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .append_pair("hapikey", &config.api_key)
        .finish()
}

/// Appends percent-encoded path segments to `base`.
fn with_segments(base: &str, segments: &[&str]) -> Result<String> {
    let mut url = Url::parse(base).map_err(|e| TransformError::InvalidEvent(format!("invalid url {base}: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| TransformError::InvalidEvent(format!("url {base} cannot have a path")))?
        .extend(segments);
    Ok(url.to_string())
}
