use crate::resolver::SourceKeys;
use thiserror::Error;

/// Errors raised while loading mapping tables or building payloads
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MappingError {
    /// A rule marked as required resolved to nothing
    #[error("Missing required value from {source_keys}")]
    MissingRequiredField { source_keys: SourceKeys },

    /// The mapping data itself is malformed. This is a defect in the
    /// destination configuration, not in the message.
    #[error("Invalid mapping configuration: {0}")]
    Configuration(String),
}
