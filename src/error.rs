use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// All errors generated by the overlay core.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Error)]
pub enum OverlayError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("invalid configuration: {0}")]
    Configuration(#[from] ConfigurationError),
}

/// Bad data or a malformed definition presented by the caller.
///
/// Raised before any state is touched, so a rejected bar leaves the tracker
/// exactly as it was.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Error)]
pub enum ValidationError {
    #[error("bar at {received} does not follow previous bar at {previous}")]
    NonMonotonicBar {
        previous: DateTime<Utc>,
        received: DateTime<Utc>,
    },

    #[error("malformed bar at {timestamp}: {reason}")]
    MalformedBar {
        timestamp: DateTime<Utc>,
        reason: String,
    },

    #[error("session {name} has an empty window (start == end == {hour})")]
    EmptySessionWindow { name: String, hour: u32 },

    #[error("session {name} hour {hour} outside [0, 24)")]
    HourOutOfRange { name: String, hour: u32 },

    #[error("duplicate session definition: {0}")]
    DuplicateSession(String),

    #[error("current price must be positive and finite, got {0}")]
    InvalidPrice(f64),
}

/// Visualization limits that cannot be honoured.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Error)]
pub enum ConfigurationError {
    #[error("limit {field} must be >= 0, got {value}")]
    NegativeLimit { field: String, value: i64 },

    #[error("maxDistancePercent must be finite and >= 0, got {0}")]
    InvalidDistance(f64),

    #[error("unreadable settings document: {0}")]
    Parse(String),
}

impl From<serde_json::Error> for ConfigurationError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value.to_string())
    }
}
