use mapper::MappingError;
use shared::transport::TransportError;
use thiserror::Error;

/// Result type alias for transform operations
pub type Result<T, E = TransformError> = std::result::Result<T, E>;

/// Errors that abort the transformation of a message.
///
/// None of these produce partial output: the caller gets either the full
/// list of request descriptors or one of these.
#[derive(Error, Debug)]
pub enum TransformError {
    #[error("Message Type is not present. Aborting message.")]
    MissingType,

    #[error("Message type {0} is not supported")]
    UnsupportedMessageType(String),

    #[error(transparent)]
    Mapping(#[from] MappingError),

    /// A blocking read of remote state failed, so it is unsafe to continue
    #[error("Failed to fetch {what}: {reason}")]
    RemoteFetch { what: String, reason: String },

    /// A blocking remote write that later steps depend on failed
    #[error("Failed to write {what}: {reason}")]
    RemoteWrite { what: String, reason: String },

    /// The message is well-formed but rejected by a destination rule
    #[error("{0}")]
    InvalidEvent(String),

    #[error("Invalid destination config: {0}")]
    InvalidDestinationConfig(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl TransformError {
    pub fn fetch(what: impl Into<String>, reason: impl ToString) -> Self {
        TransformError::RemoteFetch {
            what: what.into(),
            reason: reason.to_string(),
        }
    }

    pub fn write(what: impl Into<String>, reason: impl ToString) -> Self {
        TransformError::RemoteWrite {
            what: what.into(),
            reason: reason.to_string(),
        }
    }
}

/// Which step of a fan-out batch an item failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStep {
    Create,
    Link,
}

impl WriteStep {
    pub const fn as_str(&self) -> &'static str {
        match self {
            WriteStep::Create => "create",
            WriteStep::Link => "link",
        }
    }
}

/// A single item of a create or link batch failed.
///
/// Never aborts the transformation. The reconciler logs it and drops the
/// item from everything downstream.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Failed to {} {kind} `{item}`: {reason}", .step.as_str())]
pub struct RemotePartialWriteError {
    pub kind: &'static str,
    pub step: WriteStep,
    pub item: String,
    pub reason: String,
}
