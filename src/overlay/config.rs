//! Visualization limits
//!
//! Read from the scanner settings document under `visualizationLimits`.
//! Every missing key falls back to its default below; negative values are
//! rejected rather than clamped.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

use super::candidates::PatternCategory;
use crate::error::ConfigurationError;

pub const DEFAULT_MAX_FVGS: usize = 3;
pub const DEFAULT_MAX_ORDER_BLOCKS: usize = 3;
pub const DEFAULT_MAX_CHOCH: usize = 2;
pub const DEFAULT_MAX_BOS: usize = 2;
pub const DEFAULT_MAX_CANDLES_BACK: usize = 100;
pub const DEFAULT_MAX_DISTANCE_PERCENT: f64 = 5.0;
/// Two lines (high + low) for each of the three standard sessions
pub const DEFAULT_MAX_SESSION_LEVELS: usize = 6;

/// Caps applied to every render cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawVisualizationLimits")]
pub struct VisualizationLimits {
    #[serde(rename = "maxFVGs")]
    pub max_fvgs: usize,
    pub max_order_blocks: usize,
    #[serde(rename = "maxCHOCH")]
    pub max_choch: usize,
    #[serde(rename = "maxBOS")]
    pub max_bos: usize,
    /// Oldest pattern shown, in bars behind the latest bar
    pub max_candles_back: usize,
    /// Farthest pattern shown, as percent of current price
    pub max_distance_percent: f64,
    /// Session high/low lines drawn in total
    pub max_session_levels: usize,
}

impl Default for VisualizationLimits {
    fn default() -> Self {
        Self {
            max_fvgs: DEFAULT_MAX_FVGS,
            max_order_blocks: DEFAULT_MAX_ORDER_BLOCKS,
            max_choch: DEFAULT_MAX_CHOCH,
            max_bos: DEFAULT_MAX_BOS,
            max_candles_back: DEFAULT_MAX_CANDLES_BACK,
            max_distance_percent: DEFAULT_MAX_DISTANCE_PERCENT,
            max_session_levels: DEFAULT_MAX_SESSION_LEVELS,
        }
    }
}

impl VisualizationLimits {
    /// One of each, tight window (small screens)
    pub fn minimal() -> Self {
        Self {
            max_fvgs: 1,
            max_order_blocks: 1,
            max_choch: 1,
            max_bos: 1,
            max_candles_back: 50,
            max_distance_percent: 2.0,
            max_session_levels: 2,
        }
    }

    /// Wide window for review sessions
    pub fn detailed() -> Self {
        Self {
            max_fvgs: 10,
            max_order_blocks: 10,
            max_choch: 5,
            max_bos: 5,
            max_candles_back: 300,
            max_distance_percent: 10.0,
            ..Default::default()
        }
    }

    /// Cap for a pattern category
    pub fn limit_for(&self, category: PatternCategory) -> usize {
        match category {
            PatternCategory::Fvg => self.max_fvgs,
            PatternCategory::OrderBlock => self.max_order_blocks,
            PatternCategory::Choch => self.max_choch,
            PatternCategory::Bos => self.max_bos,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !self.max_distance_percent.is_finite() || self.max_distance_percent < 0.0 {
            return Err(ConfigurationError::InvalidDistance(self.max_distance_percent));
        }
        Ok(())
    }
}

/// Named option set as it appears in settings, every key optional
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawVisualizationLimits {
    #[serde(rename = "maxFVGs")]
    pub max_fvgs: Option<i64>,
    pub max_order_blocks: Option<i64>,
    #[serde(rename = "maxCHOCH")]
    pub max_choch: Option<i64>,
    #[serde(rename = "maxBOS")]
    pub max_bos: Option<i64>,
    pub max_candles_back: Option<i64>,
    pub max_distance_percent: Option<f64>,
    pub max_session_levels: Option<i64>,
}

fn count(field: &str, value: Option<i64>, default: usize) -> Result<usize, ConfigurationError> {
    match value {
        None => {
            debug!("{} not set, using default {}", field, default);
            Ok(default)
        }
        Some(v) if v < 0 => Err(ConfigurationError::NegativeLimit {
            field: field.to_string(),
            value: v,
        }),
        Some(v) => Ok(v as usize),
    }
}

impl TryFrom<RawVisualizationLimits> for VisualizationLimits {
    type Error = ConfigurationError;

    fn try_from(raw: RawVisualizationLimits) -> Result<Self, Self::Error> {
        let limits = Self {
            max_fvgs: count("maxFVGs", raw.max_fvgs, DEFAULT_MAX_FVGS)?,
            max_order_blocks: count("maxOrderBlocks", raw.max_order_blocks, DEFAULT_MAX_ORDER_BLOCKS)?,
            max_choch: count("maxCHOCH", raw.max_choch, DEFAULT_MAX_CHOCH)?,
            max_bos: count("maxBOS", raw.max_bos, DEFAULT_MAX_BOS)?,
            max_candles_back: count("maxCandlesBack", raw.max_candles_back, DEFAULT_MAX_CANDLES_BACK)?,
            max_distance_percent: raw.max_distance_percent.unwrap_or(DEFAULT_MAX_DISTANCE_PERCENT),
            max_session_levels: count(
                "maxSessionLevels",
                raw.max_session_levels,
                DEFAULT_MAX_SESSION_LEVELS,
            )?,
        };
        limits.validate()?;
        Ok(limits)
    }
}

/// Limits from a settings document; a document without the section yields defaults
pub fn limits_from_settings(json: &str) -> Result<VisualizationLimits, ConfigurationError> {
    let settings: serde_json::Value = serde_json::from_str(json)?;

    let Some(section) = settings.get("visualizationLimits") else {
        warn!("No visualization limits configured, using defaults");
        return Ok(VisualizationLimits::default());
    };

    let raw: RawVisualizationLimits = serde_json::from_value(section.clone())?;
    VisualizationLimits::try_from(raw)
}

/// Load limits from a settings file on disk
pub fn load_limits(path: &Path) -> Result<VisualizationLimits> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings: {:?}", path))?;
    let limits = limits_from_settings(&json)
        .with_context(|| format!("Invalid visualization limits in {:?}", path))?;
    Ok(limits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_section() {
        let json = r#"{
            "symbols": ["BTCUSDT"],
            "visualizationLimits": {
                "maxFVGs": 5,
                "maxOrderBlocks": 4,
                "maxCHOCH": 1,
                "maxBOS": 0,
                "maxCandlesBack": 50,
                "maxDistancePercent": 2.5
            }
        }"#;

        let limits = limits_from_settings(json).unwrap();
        assert_eq!(limits.max_fvgs, 5);
        assert_eq!(limits.max_order_blocks, 4);
        assert_eq!(limits.max_choch, 1);
        assert_eq!(limits.max_bos, 0);
        assert_eq!(limits.max_candles_back, 50);
        assert_eq!(limits.max_distance_percent, 2.5);
        assert_eq!(limits.max_session_levels, DEFAULT_MAX_SESSION_LEVELS);
    }

    #[test]
    fn test_missing_keys_use_defaults_not_zero() {
        let limits = limits_from_settings(r#"{"visualizationLimits": {"maxFVGs": 7}}"#).unwrap();
        assert_eq!(limits.max_fvgs, 7);
        assert_eq!(limits.max_order_blocks, DEFAULT_MAX_ORDER_BLOCKS);
        assert_eq!(limits.max_candles_back, DEFAULT_MAX_CANDLES_BACK);
        assert_eq!(limits.max_distance_percent, DEFAULT_MAX_DISTANCE_PERCENT);

        let limits = limits_from_settings(r#"{"limit": 50}"#).unwrap();
        assert_eq!(limits, VisualizationLimits::default());
    }

    #[test]
    fn test_negative_limits_rejected() {
        let result = limits_from_settings(r#"{"visualizationLimits": {"maxBOS": -2}}"#);
        assert_eq!(
            result,
            Err(ConfigurationError::NegativeLimit {
                field: "maxBOS".to_string(),
                value: -2
            })
        );

        let result = limits_from_settings(r#"{"visualizationLimits": {"maxDistancePercent": -0.5}}"#);
        assert_eq!(result, Err(ConfigurationError::InvalidDistance(-0.5)));
    }

    #[test]
    fn test_malformed_document() {
        assert!(matches!(
            limits_from_settings("not json"),
            Err(ConfigurationError::Parse(_))
        ));
    }

    #[test]
    fn test_direct_deserialize_validates() {
        let limits: VisualizationLimits = serde_json::from_str(r#"{"maxCHOCH": 4}"#).unwrap();
        assert_eq!(limits.max_choch, 4);
        assert!(serde_json::from_str::<VisualizationLimits>(r#"{"maxFVGs": -1}"#).is_err());
    }

    #[test]
    fn test_limit_for_category() {
        let limits = VisualizationLimits::detailed();
        assert_eq!(limits.limit_for(PatternCategory::Fvg), 10);
        assert_eq!(limits.limit_for(PatternCategory::Choch), 5);
        assert_eq!(VisualizationLimits::minimal().limit_for(PatternCategory::Bos), 1);
    }
}
