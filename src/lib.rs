// Library crate - session windows, session extremes and overlay filtering

pub mod data;
pub mod error;
pub mod overlay;
pub mod sessions;
pub mod types;

// Re-export commonly used types
pub use error::{ConfigurationError, OverlayError, ValidationError};
pub use overlay::{FilterContext, PatternCandidate, PatternCategory, PatternSet, RenderPlan, VisualizationLimits};
pub use sessions::{SessionCalendar, SessionExtremumTracker, SessionState, TrackerConfig, TrackerRegistry};
pub use types::*;
