use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::WatchMode;

/// Broad error category used by hosts to decide how to react.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum WatchErrorCategory {
    /// Invalid configuration value.
    Config,
    /// A host channel was closed or lagged.
    Channel,
    /// Internal bug or invariant break.
    Internal,
}

/// Stable error payload surfaced by configuration and host layers.
///
/// Presence operations themselves never fail; unexpected input is handled as
/// a no-op and traced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[error("{category:?}:{code}: {message}")]
pub struct WatchError {
    /// High-level error category.
    pub category: WatchErrorCategory,
    /// Stable machine-readable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl WatchError {
    /// Construct a new error.
    pub fn new(
        category: WatchErrorCategory,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            code: code.into(),
            message: message.into(),
        }
    }

    /// Build a standard invalid-configuration error for one field.
    pub fn invalid_config(field: &str, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self::new(
            WatchErrorCategory::Config,
            "invalid_config",
            format!("invalid value for '{field}': {reason}"),
        )
    }

    /// Build a standard error for a mode transition that cannot happen.
    pub fn invalid_mode(current: WatchMode, action: impl Into<String>) -> Self {
        let action = action.into();
        Self::new(
            WatchErrorCategory::Internal,
            "invalid_mode_transition",
            format!("cannot run '{action}' while watch list is in mode {current:?}"),
        )
    }
}
