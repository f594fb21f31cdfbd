//! Pattern Visualization Filter
//!
//! Down-selects detected patterns to what is safe to draw. Per category:
//! 1. RECENCY - drop anything more than `maxCandlesBack` bars old
//! 2. PROXIMITY - drop anything farther than `maxDistancePercent` from price
//! 3. RANK - newest first, then closest to price, then detection order
//! 4. CAP - keep the head `max<Category>` entries
//!
//! Both bars-ago and distance move with every new bar, so the filter is
//! re-run per render cycle and its output is never cached.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use super::candidates::{PatternCandidate, PatternCategory, PatternSet};
use super::config::VisualizationLimits;
use crate::error::{OverlayError, ValidationError};
use crate::types::PriceBar;

/// Chart position the filter measures against
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterContext {
    pub current_price: f64,
    pub latest_bar_index: usize,
}

impl FilterContext {
    pub fn new(current_price: f64, latest_bar_index: usize) -> Self {
        Self {
            current_price,
            latest_bar_index,
        }
    }

    /// Last close and index of the last bar
    pub fn from_bars(bars: &[PriceBar]) -> Option<Self> {
        let last = bars.last()?;
        Some(Self::new(last.close, bars.len() - 1))
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.current_price.is_finite() || self.current_price <= 0.0 {
            return Err(ValidationError::InvalidPrice(self.current_price));
        }
        Ok(())
    }
}

/// A surviving candidate with the metrics it was ranked by
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedPattern {
    pub candidate: PatternCandidate,
    pub bars_ago: usize,
    pub distance_percent: f64,
}

/// Render set per category, every category present
pub type FilteredPatterns = BTreeMap<PatternCategory, Vec<RankedPattern>>;

/// Absolute distance from `current_price` as a percentage of it
pub fn distance_percent(anchor_price: f64, current_price: f64) -> f64 {
    (anchor_price - current_price).abs() / current_price * 100.0
}

/// Filter one category's candidates (given in detection order)
pub fn filter_category(
    candidates: &[PatternCandidate],
    cap: usize,
    limits: &VisualizationLimits,
    context: &FilterContext,
) -> Vec<RankedPattern> {
    if cap == 0 {
        return Vec::new();
    }

    let mut ranked: Vec<RankedPattern> = candidates
        .iter()
        .filter_map(|candidate| {
            let bars_ago = candidate.bars_ago(context.latest_bar_index);
            if bars_ago > limits.max_candles_back {
                return None;
            }
            let distance = distance_percent(candidate.anchor_price(), context.current_price);
            if !distance.is_finite() || distance > limits.max_distance_percent {
                return None;
            }
            Some(RankedPattern {
                candidate: candidate.clone(),
                bars_ago,
                distance_percent: distance,
            })
        })
        .collect();

    // Stable: equal keys keep detection order
    ranked.sort_by(|a, b| {
        a.bars_ago
            .cmp(&b.bars_ago)
            .then_with(|| a.distance_percent.total_cmp(&b.distance_percent))
    });
    ranked.truncate(cap);
    ranked
}

/// Filter every category against `limits`
pub fn filter_patterns(
    candidates: &PatternSet,
    limits: &VisualizationLimits,
    context: &FilterContext,
) -> Result<FilteredPatterns, OverlayError> {
    limits.validate()?;
    context.validate()?;

    let mut filtered = FilteredPatterns::new();
    for category in PatternCategory::ALL {
        let input = candidates.get(&category).map(Vec::as_slice).unwrap_or(&[]);
        let cap = limits.limit_for(category);
        let kept = filter_category(input, cap, limits, context);
        debug!("{}: {} candidates, {} kept (cap {})", category, input.len(), kept.len(), cap);
        filtered.insert(category, kept);
    }

    Ok(filtered)
}
