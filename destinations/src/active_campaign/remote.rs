//! ActiveCampaign collections driven by the reconciler.

use super::config::{
    CONTACT_TAGS_PATH, EVENT_TRACKING_EVENTS_PATH, FIELD_VALUES_PATH, FIELDS_PATH, TAGS_PATH,
};
use crate::api::{ApiClient, remote_id};
use crate::errors::{Result, TransformError};
use crate::reconciler::{
    CreatableCollection, DesiredEntity, LinkableCollection, RemoteCollection, RemoteEntityCache,
    RemoteId,
};
use async_trait::async_trait;
use serde_json::{Value, json};

/// Builds a name to id cache from `data[list_key]`, reading each item's
/// `name_key` and `id_key`.
fn index(data: &Value, list_key: &str, name_key: &str, id_key: &str) -> Result<RemoteEntityCache> {
    let items = data
        .get(list_key)
        .and_then(Value::as_array)
        .ok_or_else(|| TransformError::fetch(list_key, format!("response has no `{list_key}` list")))?;

    Ok(items
        .iter()
        .filter_map(|item| {
            let name = item.get(name_key)?.as_str()?;
            let id = remote_id(item.get(id_key)?)?;
            Some((name.to_string(), id))
        })
        .collect())
}

pub struct Tags {
    pub client: ApiClient,
}

#[async_trait]
impl RemoteCollection for Tags {
    fn kind(&self) -> &'static str {
        "tag"
    }

    async fn list(&self) -> Result<RemoteEntityCache> {
        let response = self
            .client
            .get(TAGS_PATH)
            .await
            .map_err(|e| TransformError::fetch("tags", e))?;
        index(&response.data, "tags", "tag", "id")
    }
}

#[async_trait]
impl CreatableCollection for Tags {
    async fn create(&self, entity: &DesiredEntity) -> Result<RemoteId> {
        let body = json!({"tag": {"tag": entity.name, "tagType": "contact", "description": ""}});
        let response = self
            .client
            .post(TAGS_PATH, &body)
            .await
            .map_err(|e| TransformError::write("tag", e))?;
        response
            .data
            .pointer("/tag/id")
            .and_then(remote_id)
            .ok_or_else(|| TransformError::write("tag", "response has no tag id"))
    }
}

#[async_trait]
impl LinkableCollection for Tags {
    async fn link(&self, primary_id: &str, remote_id: &str, _entity: &DesiredEntity) -> Result<()> {
        let body = json!({"contactTag": {"contact": primary_id, "tag": remote_id}});
        self.client
            .post(CONTACT_TAGS_PATH, &body)
            .await
            .map_err(|e| TransformError::write("contactTag", e))?;
        Ok(())
    }
}

/// Custom contact fields. Fields are never created from a message, only
/// given values.
pub struct Fields {
    pub client: ApiClient,
}

#[async_trait]
impl RemoteCollection for Fields {
    fn kind(&self) -> &'static str {
        "field"
    }

    async fn list(&self) -> Result<RemoteEntityCache> {
        let response = self
            .client
            .get(FIELDS_PATH)
            .await
            .map_err(|e| TransformError::fetch("fields", e))?;
        index(&response.data, "fields", "title", "id")
    }
}

#[async_trait]
impl LinkableCollection for Fields {
    async fn link(&self, primary_id: &str, remote_id: &str, entity: &DesiredEntity) -> Result<()> {
        let body = json!({
            "fieldValue": {
                "contact": primary_id,
                "field": remote_id,
                "value": entity.value.clone().unwrap_or(Value::Null),
            }
        });
        self.client
            .post(FIELD_VALUES_PATH, &body)
            .await
            .map_err(|e| TransformError::write("fieldValue", e))?;
        Ok(())
    }
}

/// Event tracking event definitions, identified by name.
pub struct Events {
    pub client: ApiClient,
}

#[async_trait]
impl RemoteCollection for Events {
    fn kind(&self) -> &'static str {
        "event"
    }

    async fn list(&self) -> Result<RemoteEntityCache> {
        let response = self
            .client
            .get(EVENT_TRACKING_EVENTS_PATH)
            .await
            .map_err(|e| TransformError::fetch("events", e))?;
        index(&response.data, "eventTrackingEvents", "name", "name")
    }
}

#[async_trait]
impl CreatableCollection for Events {
    async fn create(&self, entity: &DesiredEntity) -> Result<RemoteId> {
        let body = json!({"eventTrackingEvent": {"name": entity.name}});
        self.client
            .post(EVENT_TRACKING_EVENTS_PATH, &body)
            .await
            .map_err(|e| TransformError::write("event", e))?;
        Ok(entity.name.clone())
    }
}
