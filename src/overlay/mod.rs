//! Overlay - deciding which patterns and lines reach the chart
//!
//! - Visualization limits (settings, defaults, presets)
//! - Pattern candidates and the scanner signal adapter
//! - Pattern visualization filter (recency, proximity, rank, cap)
//! - Render plan combining session levels with filtered patterns

pub mod candidates;
pub mod config;
pub mod filter;
pub mod plan;

pub use candidates::{resolve_bar_index, PatternAnchor, PatternCandidate, PatternCategory, PatternSet, SignalPatterns};
pub use config::{limits_from_settings, load_limits, VisualizationLimits};
pub use filter::{distance_percent, filter_category, filter_patterns, FilterContext, FilteredPatterns, RankedPattern};
pub use plan::RenderPlan;
