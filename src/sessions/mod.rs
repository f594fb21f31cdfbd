//! Sessions - trading-session windows and their running extremes
//!
//! - Session calendar (which sessions are active, lifecycle, overlaps)
//! - Session extremum tracker (streaming high/low per session instance)
//! - Tracker registry (one tracker per symbol/timeframe)
//! - Renderable session levels and background bands

pub mod calendar;
pub mod levels;
pub mod registry;
pub mod tracker;

pub use calendar::{SessionCalendar, SessionDefinition, SessionOverlap, SessionState, SessionWindow};
pub use levels::{session_backgrounds, session_levels, LevelKind, LevelLine, SessionBackground, SessionLevel};
pub use registry::TrackerRegistry;
pub use tracker::{SessionEvent, SessionExtremumTracker, SessionInstance, TrackerConfig};
