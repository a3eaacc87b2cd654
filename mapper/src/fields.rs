//! Precedence lists for logical fields that most destinations need.
//!
//! `email` for example is looked up in `context.traits.email` first, then in
//! `traits.email`, then in `properties.email`.

use crate::errors::MappingError;
use crate::resolver::{SourceKeys, resolve};
use serde_json::Value;
use std::collections::HashMap;

const STANDARD_FIELDS: &str = include_str!("../data/message.json");

#[derive(Clone, Debug)]
pub struct FieldTable {
    fields: HashMap<String, SourceKeys>,
}

impl FieldTable {
    /// The field table shipped with the crate.
    pub fn standard() -> Result<Self, MappingError> {
        Self::from_json(STANDARD_FIELDS)
    }

    pub fn from_json(json: &str) -> Result<Self, MappingError> {
        let fields: HashMap<String, SourceKeys> = serde_json::from_str(json)
            .map_err(|e| MappingError::Configuration(format!("malformed field table: {e}")))?;
        for keys in fields.values() {
            keys.validate()?;
        }
        Ok(Self { fields })
    }

    pub fn source_keys(&self, field: &str) -> Option<&SourceKeys> {
        self.fields.get(field)
    }

    /// Resolves a logical field. Asking for a field the table does not know
    /// is a programming error and reported as such.
    pub fn value<'a>(&self, message: &'a Value, field: &str) -> Result<Option<&'a Value>, MappingError> {
        let keys = self
            .source_keys(field)
            .ok_or_else(|| MappingError::Configuration(format!("unknown logical field `{field}`")))?;
        resolve(message, keys)
    }

}
