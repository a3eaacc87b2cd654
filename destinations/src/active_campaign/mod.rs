//! ActiveCampaign: contacts with tags and custom fields, site tracking and
//! event tracking.
//!
//! Identify creates or updates the contact first, then reconciles its tags
//! (reusing existing tags, creating missing ones) and gives values to the
//! custom fields the account already defines. Screen and track make sure the
//! event definition exists before the event itself is sent.

mod config;
mod remote;

pub use config::ActiveCampaignConfig;

use crate::api::{ApiClient, remote_id};
use crate::dispatcher::{Category, Dispatcher, EventAliases};
use crate::errors::{Result, TransformError};
use crate::handler::{Destination, MappingTables, parse_config};
use crate::message::{EventType, Message};
use crate::reconciler::{DesiredEntity, Reconciler};
use crate::request::{BodyFormat, Fields, HttpMethod, RequestDescriptor};
use async_trait::async_trait;
use config::{
    CONTACT_SYNC_PATH, EVENT_TRACKING_URL, IDENTIFY, MAPPING_TABLES, PAGE, SCREEN,
    SITE_TRACKING_DOMAINS_PATH, TRACK,
};
use mapper::{FieldTable, MappingError, Path};
use remote::{Events, Fields as CustomFields, Tags};
use serde_json::{Map, Value, json};
use shared::transport::{Headers, Transport};
use std::sync::Arc;

pub struct ActiveCampaign {
    transport: Arc<dyn Transport>,
    tables: MappingTables,
    fields: FieldTable,
    dispatcher: Dispatcher,
}

impl ActiveCampaign {
    pub const NAME: &'static str = "ACTIVE_CAMPAIGN";

    pub fn new(transport: Arc<dyn Transport>) -> std::result::Result<Self, MappingError> {
        Ok(Self {
            transport,
            tables: MappingTables::load(MAPPING_TABLES)?,
            fields: FieldTable::standard()?,
            dispatcher: Dispatcher::new()
                .identify(&IDENTIFY)
                .page(&PAGE)
                .screen(&SCREEN)
                .track(&TRACK),
        })
    }

    fn client(&self, config: &ActiveCampaignConfig) -> ApiClient {
        ApiClient::new(self.transport.clone(), &config.api_url, json_headers(config))
    }

    fn contact_payload(&self, message: &Message, category: &Category) -> Result<Map<String, Value>> {
        let mut contact = self.tables.get(category.name)?.construct(message.as_value())?;
        for field in ["firstName", "lastName"] {
            if let Some(value) = self.fields.value(message.as_value(), field)? {
                contact.insert(field.to_string(), value.clone());
            }
        }
        Ok(contact)
    }

    async fn identify(
        &self,
        message: &Message,
        category: &Category,
        config: &ActiveCampaignConfig,
    ) -> Result<RequestDescriptor> {
        let contact = self.contact_payload(message, category)?;
        let client = self.client(config);

        let response = client
            .post(CONTACT_SYNC_PATH, &json!({"contact": contact}))
            .await
            .map_err(|e| TransformError::write("contact", e))?;
        let contact_id = response
            .data
            .pointer("/contact/id")
            .and_then(remote_id)
            .ok_or_else(|| TransformError::write("contact", "response has no contact id"))?;
        tracing::debug!(contact_id = %contact_id, "synced contact");

        let tags = desired_tags(message);
        let tag_outcome = Reconciler::new(Tags {
            client: client.clone(),
        })
        .reconcile(&contact_id, tags)
        .await?;

        let field_values = desired_field_values(message);
        let field_outcome = Reconciler::new(CustomFields { client })
            .link_existing(&contact_id, field_values)
            .await?;

        tracing::debug!(
            contact_id = %contact_id,
            tags_linked = tag_outcome.linked.len(),
            fields_linked = field_outcome.linked.len(),
            dropped = tag_outcome.failures.len() + field_outcome.failures.len(),
            "reconciled contact"
        );

        Ok(self.json_request(
            config,
            CONTACT_SYNC_PATH,
            Fields::from([
                ("contact".to_string(), Some(Value::Object(contact))),
                ("apiKey".to_string(), Some(Value::String(config.api_key.clone()))),
            ]),
        ))
    }

    fn page(
        &self,
        message: &Message,
        category: &Category,
        config: &ActiveCampaignConfig,
    ) -> Result<RequestDescriptor> {
        let mut domain = self.tables.get(category.name)?.construct(message.as_value())?;
        let stripped = domain
            .get("name")
            .and_then(Value::as_str)
            .map(|name| strip_scheme(name).to_string());
        if let Some(name) = stripped {
            domain.insert("name".to_string(), Value::String(name));
        }

        Ok(self.json_request(
            config,
            SITE_TRACKING_DOMAINS_PATH,
            Fields::from([
                ("siteTrackingDomain".to_string(), Some(Value::Object(domain))),
                ("apiKey".to_string(), Some(Value::String(config.api_key.clone()))),
            ]),
        ))
    }

    /// Screen and track share one shape; only the mapping table differs.
    async fn event(
        &self,
        message: &Message,
        category: &Category,
        config: &ActiveCampaignConfig,
    ) -> Result<RequestDescriptor> {
        let payload = self.tables.get(category.name)?.construct(message.as_value())?;
        let event_name = match payload.get("event") {
            Some(Value::String(name)) if !name.is_empty() => name.clone(),
            _ => return Err(TransformError::InvalidEvent("Event name is required".to_string())),
        };

        Reconciler::new(Events {
            client: self.client(config),
        })
        .ensure_exists(DesiredEntity::named(event_name))
        .await?;

        let mut fields: Fields = payload.into_iter().map(|(k, v)| (k, Some(v))).collect();
        fields.insert("actid".to_string(), config.actid.clone().map(Value::String));
        fields.insert("key".to_string(), config.event_key.clone().map(Value::String));
        fields.insert("apiKey".to_string(), Some(Value::String(config.api_key.clone())));

        Ok(RequestDescriptor::builder(HttpMethod::Post, EVENT_TRACKING_URL)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .header("Api-Token", config.api_key.as_str())
            .body_fields(BodyFormat::Form, fields)
            .build())
    }

    fn json_request(&self, config: &ActiveCampaignConfig, path: &str, body: Fields) -> RequestDescriptor {
        let endpoint = format!("{}{path}", config.api_url.trim_end_matches('/'));
        RequestDescriptor::builder(HttpMethod::Post, endpoint)
            .header("Content-Type", "application/json")
            .header("Api-Token", config.api_key.as_str())
            .body_fields(BodyFormat::Json, body)
            .build()
    }
}

#[async_trait]
impl Destination for ActiveCampaign {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn process(&self, message: &Message, config: &Value) -> Result<Vec<RequestDescriptor>> {
        let config: ActiveCampaignConfig = parse_config(Self::NAME, config)?;
        let classification = self.dispatcher.classify(message, &EventAliases::default())?;
        let category = classification.category;

        let request = match classification.event_type {
            EventType::Identify => self.identify(message, category, &config).await?,
            EventType::Page => self.page(message, category, &config)?,
            EventType::Screen | EventType::Track => self.event(message, category, &config).await?,
        };
        Ok(vec![request])
    }
}

fn json_headers(config: &ActiveCampaignConfig) -> Headers {
    Headers::from([
        ("Content-Type".to_string(), "application/json".to_string()),
        ("Api-Token".to_string(), config.api_key.clone()),
    ])
}

fn strip_scheme(url: &str) -> &str {
    url.strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url)
}

/// Reads `key` from `context.traits`, falling back to `traits`.
fn trait_value<'a>(message: &'a Message, key: &str) -> Option<&'a Value> {
    ["context.traits", "traits"].iter().find_map(|prefix| {
        let path = Path::parse(&format!("{prefix}.{key}")).ok()?;
        message.lookup(&path).filter(|value| !value.is_null())
    })
}

fn desired_tags(message: &Message) -> Vec<DesiredEntity> {
    trait_value(message, "tags")
        .and_then(Value::as_array)
        .map(|tags| {
            tags.iter()
                .filter_map(|tag| match tag {
                    Value::String(name) if !name.is_empty() => Some(DesiredEntity::named(name.as_str())),
                    Value::Number(n) => Some(DesiredEntity::named(n.to_string())),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

fn desired_field_values(message: &Message) -> Vec<DesiredEntity> {
    trait_value(message, "fieldInfo")
        .and_then(Value::as_object)
        .map(|fields| {
            fields
                .iter()
                .map(|(title, value)| DesiredEntity::with_value(title.as_str(), value.clone()))
                .collect()
        })
        .unwrap_or_default()
}
