use crate::errors::{Result, TransformError};
use crate::message::Message;
use crate::request::RequestDescriptor;
use async_trait::async_trait;
use mapper::{MappingError, MappingTable};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;

/// A destination adapter: turns one message into the requests that deliver
/// it to a third-party API.
///
/// Adapters hold only static state (mapping tables, the transport handle).
/// Anything learned from the remote side lives for one `process` call.
#[async_trait]
pub trait Destination: Send + Sync {
    /// Destination name as it appears in `destination.name`.
    fn name(&self) -> &'static str;

    async fn process(&self, message: &Message, config: &Value) -> Result<Vec<RequestDescriptor>>;
}

/// Mapping tables of one destination keyed by category name.
#[derive(Debug, Default)]
pub struct MappingTables {
    tables: HashMap<&'static str, MappingTable>,
}

impl MappingTables {
    /// Parses and validates every `(category name, JSON)` pair.
    pub fn load(sources: &[(&'static str, &str)]) -> std::result::Result<Self, MappingError> {
        let tables = sources
            .iter()
            .map(|(name, json)| {
                MappingTable::from_json(json)
                    .map(|table| (*name, table))
                    .map_err(|e| MappingError::Configuration(format!("{name}: {e}")))
            })
            .collect::<std::result::Result<_, _>>()?;
        Ok(Self { tables })
    }

    pub fn get(&self, name: &str) -> std::result::Result<&MappingTable, MappingError> {
        self.tables
            .get(name)
            .ok_or_else(|| MappingError::Configuration(format!("no mapping table for category `{name}`")))
    }

    /// Table for categories whose table is optional.
    pub fn find(&self, name: &str) -> Option<&MappingTable> {
        self.tables.get(name)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Deserializes `destination.config` into the adapter's typed settings.
pub fn parse_config<T: DeserializeOwned>(destination: &str, config: &Value) -> Result<T> {
    T::deserialize(config)
        .map_err(|e| TransformError::InvalidDestinationConfig(format!("{destination}: {e}")))
}
