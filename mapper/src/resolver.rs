//! Resolves a single logical field out of a message.

use crate::errors::MappingError;
use crate::path::Path;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Where a rule reads its value from.
///
/// Deserializes from either a single path string or a list of path strings.
/// Candidates are ordered by precedence, highest first.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceKeys {
    Single(Path),
    Candidates(Vec<Path>),
}

impl SourceKeys {
    pub fn validate(&self) -> Result<(), MappingError> {
        match self {
            SourceKeys::Candidates(paths) if paths.is_empty() => Err(MappingError::Configuration(
                "blank sourceKeys list".to_string(),
            )),
            _ => Ok(()),
        }
    }

    pub fn paths(&self) -> &[Path] {
        match self {
            SourceKeys::Single(path) => std::slice::from_ref(path),
            SourceKeys::Candidates(paths) => paths,
        }
    }
}

impl From<Path> for SourceKeys {
    fn from(path: Path) -> Self {
        SourceKeys::Single(path)
    }
}

impl fmt::Display for SourceKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKeys::Single(path) => write!(f, "\"{path}\""),
            SourceKeys::Candidates(paths) => {
                let quoted: Vec<String> = paths.iter().map(|p| format!("\"{p}\"")).collect();
                write!(f, "[{}]", quoted.join(","))
            }
        }
    }
}

/// Returns the first candidate value that is present and not `null`.
///
/// Later candidates are never consulted once an earlier one resolves. An
/// empty candidate list is a configuration error rather than "absent".
pub fn resolve<'a>(
    message: &'a Value,
    source_keys: &SourceKeys,
) -> Result<Option<&'a Value>, MappingError> {
    source_keys.validate()?;

    let resolved = source_keys
        .paths()
        .iter()
        .find_map(|path| path.lookup(message).filter(|value| !value.is_null()));

    Ok(resolved)
}
