use crate::dispatcher::Category;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

pub const IDENTIFY: Category = Category::new("HSIdentify", "identify");
pub const TRACK: Category = Category::new("HSTrack", "track");

pub const API_URL: &str = "https://api.hubapi.com";
pub const PROPERTIES_PATH: &str = "/properties/v1/contacts/properties";
pub const CREATE_OR_UPDATE_PATH: &str = "/contacts/v1/contact/createOrUpdate/email";
pub const TRACK_URL: &str = "https://track.hubspot.com/v1/event";

/// Track events carry the same user properties as identify.
pub const MAPPING_TABLES: &[(&str, &str)] = &[
    (IDENTIFY.name, include_str!("../../data/hubspot/HSIdentify.json")),
];

#[derive(Clone, Debug, Deserialize)]
pub struct HubSpotConfig {
    #[serde(rename = "apiKey")]
    pub api_key: String,
    /// Portal id, required for track events
    #[serde(rename = "hubID", default, deserialize_with = "string_or_number")]
    pub hub_id: Option<String>,
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(id)) => Ok(Some(id)),
        Some(Value::Number(id)) => Ok(Some(id.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "hubID must be a string or a number, got {other}"
        ))),
    }
}
