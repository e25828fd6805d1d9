use std::io;

use thiserror::Error;

use crate::data::ResourceKind;

/// Error type for record source, cache, and configuration failures.
#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("record source for '{resource}' failed: {reason}")]
    Transport {
        resource: ResourceKind,
        reason: String,
    },
    #[error("record source for '{resource}' reported failure: {message}")]
    Logical {
        resource: ResourceKind,
        message: String,
    },
    #[error("status count endpoint unavailable: {reason}")]
    CountUnavailable { reason: String },
    #[error("result cache failure: {0}")]
    CacheStore(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl AggregateError {
    /// Build a transport failure for `resource`.
    pub fn transport(resource: ResourceKind, reason: impl Into<String>) -> Self {
        Self::Transport {
            resource,
            reason: reason.into(),
        }
    }

    /// Build a logical (`success: false`) failure for `resource`.
    pub fn logical(resource: ResourceKind, message: impl Into<String>) -> Self {
        Self::Logical {
            resource,
            message: message.into(),
        }
    }
}
