//! Facebook Pixel through the Conversions API.
//!
//! Every message becomes one server event: `user_data` from the identity
//! traits, the common event fields, and `custom_data` built from the
//! flattened properties after PII filtering. Standard ecommerce events add
//! the content fields Facebook expects for them.

mod config;
mod ecommerce;

pub use config::FacebookPixelConfig;

use crate::dispatcher::{Category, Dispatcher};
use crate::errors::{Result, TransformError};
use crate::handler::{Destination, MappingTables, parse_config};
use crate::message::{EventType, Message};
use crate::request::{BodyFormat, HttpMethod, RequestDescriptor};
use async_trait::async_trait;
use chrono::DateTime;
use config::{
    CHECKOUT_STARTED, COMMON, DEFAULT_PII_PROPERTIES, GRAPH_API_URL, MAPPING_TABLES, ORDER_COMPLETED, PAGE,
    PRODUCT_ADDED, PRODUCT_LIST_VIEWED, PRODUCT_VIEWED, PRODUCTS_SEARCHED, SIMPLE_TRACK, USER_DATA,
};
use mapper::{MappingError, flatten_json};
use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};

pub struct FacebookPixel {
    tables: MappingTables,
    dispatcher: Dispatcher,
}

impl FacebookPixel {
    pub const NAME: &'static str = "FACEBOOK_PIXEL";

    pub fn new() -> std::result::Result<Self, MappingError> {
        Ok(Self {
            tables: MappingTables::load(MAPPING_TABLES)?,
            dispatcher: Dispatcher::new()
                .identify(&USER_DATA)
                .page(&PAGE)
                .screen(&PAGE)
                .track(&SIMPLE_TRACK)
                .track_event(&PRODUCT_LIST_VIEWED)
                .track_event(&PRODUCT_VIEWED)
                .track_event(&PRODUCT_ADDED)
                .track_event(&ORDER_COMPLETED)
                .track_event(&PRODUCTS_SEARCHED)
                .track_event(&CHECKOUT_STARTED),
        })
    }

    fn user_data(&self, message: &Message) -> Result<Map<String, Value>> {
        let mut user_data = self.tables.get(USER_DATA.name)?.construct(message.as_value())?;
        if let Some(Value::String(name)) = user_data.remove("name") {
            let tokens: Vec<&str> = name.split(' ').collect();
            if let [first, last] = tokens.as_slice() {
                user_data.insert("fn".to_string(), json!(sha256_hex(first)));
                user_data.insert("ln".to_string(), json!(sha256_hex(last)));
            }
        }
        Ok(user_data)
    }

    fn common_data(
        &self,
        message: &Message,
        category: &Category,
        config: &FacebookPixelConfig,
    ) -> Result<Map<String, Value>> {
        let mut common = self.tables.get(COMMON.name)?.construct(message.as_value())?;
        let event_time = common
            .get("event_time")
            .map(unix_seconds)
            .transpose()?
            .ok_or_else(|| TransformError::InvalidEvent("Event timestamp is required".to_string()))?;
        common.insert("event_time".to_string(), json!(event_time));
        common.insert("action_source".to_string(), json!("website"));

        if let Some(name) = standard_event_name(category) {
            common.insert("event_name".to_string(), json!(name));
        } else if *category == PAGE {
            let name = match message.name() {
                Some(name) if !name.is_empty() => format!("Viewed Page {name}"),
                _ => "Viewed a Page".to_string(),
            };
            common.insert("event_name".to_string(), json!(name));
        }

        if config.limited_data_usage {
            let options = message
                .as_value()
                .pointer("/context/dataProcessingOptions")
                .and_then(Value::as_array);
            if let Some(options) = options {
                let keys = [
                    "data_processing_options",
                    "data_processing_options_country",
                    "data_processing_options_state",
                ];
                for (key, value) in keys.iter().zip(options) {
                    common.insert(key.to_string(), value.clone());
                }
            }
        }

        Ok(common)
    }

    fn custom_data(
        &self,
        message: &Message,
        category: &Category,
        config: &FacebookPixelConfig,
    ) -> Result<Map<String, Value>> {
        let flattened = message
            .properties()
            .map(|properties| flatten_json(&Value::Object(properties.clone())))
            .unwrap_or_default();
        if flattened.is_empty() && category.standard {
            return Err(TransformError::InvalidEvent(
                "No properties for the event so the event cannot be sent.".to_string(),
            ));
        }

        let mut custom = PiiFilter::new(config).apply(flattened, category.standard);

        if let Some(table) = self.tables.find(category.name) {
            custom.extend(table.construct(message.as_value())?);
        }

        let category_to_content = config.category_to_content.as_slice();
        let extra = if *category == PRODUCT_LIST_VIEWED {
            ecommerce::product_list_viewed(message, category_to_content)?
        } else if *category == PRODUCT_VIEWED || *category == PRODUCT_ADDED {
            ecommerce::product(message, category_to_content, config.value_field_identifier.as_deref())?
        } else if *category == ORDER_COMPLETED || *category == CHECKOUT_STARTED {
            ecommerce::order(message, category_to_content)?
        } else {
            Map::new()
        };
        custom.extend(extra);

        if category.standard {
            let properties = message.properties().cloned().unwrap_or_default();
            custom.insert("currency".to_string(), ecommerce::currency(&properties));
        } else if *category == SIMPLE_TRACK {
            custom.remove("revenue");
        }

        Ok(custom)
    }
}

#[async_trait]
impl Destination for FacebookPixel {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn process(&self, message: &Message, config: &Value) -> Result<Vec<RequestDescriptor>> {
        let config: FacebookPixelConfig = parse_config(Self::NAME, config)?;
        let classification = self.dispatcher.classify(message, &config.events_to_events)?;
        let category = classification.category;

        if classification.event_type == EventType::Identify && !config.advanced_mapping {
            return Err(TransformError::InvalidEvent(
                "Advanced Mapping is not enabled. Identify events will not be sent."
                    .to_string(),
            ));
        }

        let mut event = Map::new();
        event.insert("user_data".to_string(), Value::Object(self.user_data(message)?));
        event.extend(self.common_data(message, category, &config)?);
        if classification.event_type != EventType::Identify {
            let custom = self.custom_data(message, category, &config)?;
            event.insert("custom_data".to_string(), Value::Object(custom));
        }

        tracing::debug!(category = category.name, "built pixel event");

        let endpoint = format!(
            "{GRAPH_API_URL}/{}/events?access_token={}",
            config.pixel_id, config.access_token
        );
        let mut body = Map::new();
        body.insert("data".to_string(), json!([Value::Object(event).to_string()]));

        Ok(vec![
            RequestDescriptor::builder(HttpMethod::Post, endpoint)
                .body(BodyFormat::Form, body)
                .build(),
        ])
    }
}

/// Facebook name for a standard category, used as `event_name`.
fn standard_event_name(category: &Category) -> Option<&'static str> {
    if *category == PRODUCT_VIEWED {
        Some("ViewContent")
    } else if category.standard {
        category.standard_name
    } else {
        None
    }
}

/// Event time as unix seconds, from RFC 3339 or an existing number.
fn unix_seconds(value: &Value) -> Result<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| TransformError::InvalidEvent(format!("Invalid event time {n}"))),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|time| time.timestamp())
            .map_err(|e| TransformError::InvalidEvent(format!("Invalid event time `{s}`: {e}"))),
        other => Err(TransformError::InvalidEvent(format!("Invalid event time {other}"))),
    }
}

fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Decides which flattened properties may be sent as custom data.
struct PiiFilter<'a> {
    blacklist: HashMap<&'a str, bool>,
    whitelist: HashSet<&'a str>,
    custom_properties: HashSet<&'a str>,
}

impl<'a> PiiFilter<'a> {
    fn new(config: &'a FacebookPixelConfig) -> Self {
        Self {
            blacklist: config
                .blacklist_pii_properties
                .iter()
                .map(|entry| (entry.property.as_str(), entry.hash))
                .collect(),
            whitelist: config
                .whitelist_pii_properties
                .iter()
                .map(|entry| entry.property.as_str())
                .collect(),
            custom_properties: config
                .event_custom_properties
                .iter()
                .map(|entry| entry.property.as_str())
                .collect(),
        }
    }

    /// Default PII is dropped unless whitelisted. Blacklisted properties are
    /// hashed or dropped. Standard events keep only default PII and the
    /// configured custom properties.
    fn apply(&self, properties: Map<String, Value>, standard: bool) -> Map<String, Value> {
        properties
            .into_iter()
            .filter_map(|(key, value)| {
                let name = key.as_str();
                let default_pii = DEFAULT_PII_PROPERTIES.contains(&name);

                let kept = match self.blacklist.get(name) {
                    Some(true) => Some(json!(sha256_hex(&plain_string(&value)))),
                    Some(false) => None,
                    None if default_pii && !self.whitelist.contains(name) => None,
                    None => Some(value),
                };
                if standard && !default_pii && !self.custom_properties.contains(name) {
                    return None;
                }

                kept.map(|value| (key, value))
            })
            .collect()
    }
}

fn plain_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
