//! Pattern candidates
//!
//! Detection happens upstream; this module only describes what a detected
//! pattern looks like to the overlay filter and converts the scanner's
//! signal payload into that shape.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::data::parse_timestamp;
use crate::types::{Direction, PriceBar};

/// Overlay category, each with its own cap
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PatternCategory {
    Fvg,
    OrderBlock,
    Choch,
    Bos,
}

impl PatternCategory {
    pub const ALL: [PatternCategory; 4] = [
        PatternCategory::Fvg,
        PatternCategory::OrderBlock,
        PatternCategory::Choch,
        PatternCategory::Bos,
    ];
}

impl std::fmt::Display for PatternCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PatternCategory::Fvg => write!(f, "FVG"),
            PatternCategory::OrderBlock => write!(f, "OB"),
            PatternCategory::Choch => write!(f, "CHoCH"),
            PatternCategory::Bos => write!(f, "BOS"),
        }
    }
}

/// Price a pattern is pinned to
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum PatternAnchor {
    /// Broken structure level (CHoCH / BOS)
    Level { price: f64 },
    /// Price zone (FVG / order block)
    Zone { bottom: f64, top: f64 },
}

impl PatternAnchor {
    /// Reference price for proximity; zones use their midpoint
    pub fn price(&self) -> f64 {
        match *self {
            PatternAnchor::Level { price } => price,
            PatternAnchor::Zone { bottom, top } => (bottom + top) / 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternCandidate {
    pub category: PatternCategory,
    /// Always set for zones, optional for structure events
    pub direction: Option<Direction>,
    pub anchor_timestamp: DateTime<Utc>,
    pub anchor: PatternAnchor,
    /// Index of the anchor bar in the chart's bar series
    pub bar_index: usize,
}

impl PatternCandidate {
    pub fn fvg(direction: Direction, bar_index: usize, anchor_timestamp: DateTime<Utc>, bottom: f64, top: f64) -> Self {
        Self {
            category: PatternCategory::Fvg,
            direction: Some(direction),
            anchor_timestamp,
            anchor: PatternAnchor::Zone { bottom, top },
            bar_index,
        }
    }

    pub fn order_block(
        direction: Direction,
        bar_index: usize,
        anchor_timestamp: DateTime<Utc>,
        bottom: f64,
        top: f64,
    ) -> Self {
        Self {
            category: PatternCategory::OrderBlock,
            ..Self::fvg(direction, bar_index, anchor_timestamp, bottom, top)
        }
    }

    pub fn choch(direction: Option<Direction>, bar_index: usize, anchor_timestamp: DateTime<Utc>, level: f64) -> Self {
        Self {
            category: PatternCategory::Choch,
            direction,
            anchor_timestamp,
            anchor: PatternAnchor::Level { price: level },
            bar_index,
        }
    }

    pub fn bos(direction: Option<Direction>, bar_index: usize, anchor_timestamp: DateTime<Utc>, level: f64) -> Self {
        Self {
            category: PatternCategory::Bos,
            ..Self::choch(direction, bar_index, anchor_timestamp, level)
        }
    }

    /// Bars between the anchor and the latest bar; anchors past the latest bar count as 0
    pub fn bars_ago(&self, latest_bar_index: usize) -> usize {
        latest_bar_index.saturating_sub(self.bar_index)
    }

    pub fn anchor_price(&self) -> f64 {
        self.anchor.price()
    }
}

/// Candidates per category, each vector in detection order
pub type PatternSet = BTreeMap<PatternCategory, Vec<PatternCandidate>>;

/// Candle time as the scanner writes it: ISO-8601 text or epoch milliseconds
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RecordTimestamp {
    Millis(i64),
    Text(String),
}

impl RecordTimestamp {
    fn to_utc(&self) -> Option<DateTime<Utc>> {
        match self {
            RecordTimestamp::Millis(ms) => DateTime::from_timestamp_millis(*ms),
            RecordTimestamp::Text(raw) => parse_timestamp(raw).ok(),
        }
    }
}

/// `{bullish: [...], bearish: [...]}`, records kept raw and parsed one by one
#[derive(Debug, Clone, Default, Deserialize)]
struct Sided {
    #[serde(default)]
    bullish: Vec<serde_json::Value>,
    #[serde(default)]
    bearish: Vec<serde_json::Value>,
}

impl Sided {
    fn iter(&self) -> impl Iterator<Item = (Direction, &serde_json::Value)> {
        self.bullish
            .iter()
            .map(|r| (Direction::Bullish, r))
            .chain(self.bearish.iter().map(|r| (Direction::Bearish, r)))
    }

    fn len(&self) -> usize {
        self.bullish.len() + self.bearish.len()
    }
}

/// Structure events come split by side or as one list carrying `direction`
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum StructureEvents {
    Flat(Vec<serde_json::Value>),
    Sided(Sided),
}

impl Default for StructureEvents {
    fn default() -> Self {
        StructureEvents::Flat(Vec::new())
    }
}

impl StructureEvents {
    /// Raw records with the side they were filed under, if any
    fn iter(&self) -> Box<dyn Iterator<Item = (Option<Direction>, &serde_json::Value)> + '_> {
        match self {
            StructureEvents::Flat(events) => Box::new(events.iter().map(|r| (None, r))),
            StructureEvents::Sided(sided) => Box::new(sided.iter().map(|(d, r)| (Some(d), r))),
        }
    }

    fn len(&self) -> usize {
        match self {
            StructureEvents::Flat(events) => events.len(),
            StructureEvents::Sided(sided) => sided.len(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ZoneRecord {
    index: usize,
    top: f64,
    bottom: f64,
    timestamp: RecordTimestamp,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StructureRecord {
    broken_level: f64,
    timestamp: RecordTimestamp,
    #[serde(default)]
    direction: Option<String>,
}

impl StructureRecord {
    fn direction(&self) -> Option<Direction> {
        match self.direction.as_deref().map(str::to_ascii_lowercase).as_deref() {
            Some("bullish") => Some(Direction::Bullish),
            Some("bearish") => Some(Direction::Bearish),
            _ => None,
        }
    }
}

/// One record, or None (logged) if it does not have the expected shape
fn parse_record<T: DeserializeOwned>(category: PatternCategory, raw: &serde_json::Value) -> Option<T> {
    match serde_json::from_value(raw.clone()) {
        Ok(record) => Some(record),
        Err(e) => {
            warn!("Skipping unreadable {} record: {}", category, e);
            None
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HtfData {
    #[serde(default)]
    fvgs: Sided,
    #[serde(default)]
    order_blocks: Sided,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StructureAnalysis {
    #[serde(default)]
    choch_events: StructureEvents,
    #[serde(default)]
    bos_events: StructureEvents,
}

/// Pattern sections of a scanner signal
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalPatterns {
    #[serde(default)]
    htf_data: Option<HtfData>,
    #[serde(default)]
    structure_analysis: Option<StructureAnalysis>,
}

impl SignalPatterns {
    /// Parse either a bare signal or a scanner entry wrapping it under `signal`
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        match value.get("signal") {
            Some(inner) if inner.is_object() => serde_json::from_value(inner.clone()),
            _ => serde_json::from_value(value),
        }
    }

    /// Total records before any filtering
    pub fn total(&self) -> usize {
        let zones = self
            .htf_data
            .as_ref()
            .map_or(0, |h| h.fvgs.len() + h.order_blocks.len());
        let structure = self
            .structure_analysis
            .as_ref()
            .map_or(0, |s| s.choch_events.len() + s.bos_events.len());
        zones + structure
    }

    /// Convert to candidates against the chart's bars.
    ///
    /// Records that do not parse are skipped one at a time. Structure events
    /// carry only a timestamp, so they are pinned to the last bar at or
    /// before it; events older than the first bar are dropped.
    pub fn to_candidates(&self, bars: &[PriceBar]) -> PatternSet {
        let mut set: PatternSet = PatternCategory::ALL.iter().map(|c| (*c, Vec::new())).collect();

        if let Some(htf) = &self.htf_data {
            for (category, zones) in [
                (PatternCategory::Fvg, &htf.fvgs),
                (PatternCategory::OrderBlock, &htf.order_blocks),
            ] {
                let out = set.entry(category).or_default();
                for (direction, raw) in zones.iter() {
                    let Some(zone) = parse_record::<ZoneRecord>(category, raw) else {
                        continue;
                    };
                    let Some(ts) = zone.timestamp.to_utc() else {
                        warn!("Skipping {} with invalid timestamp {:?}", category, zone.timestamp);
                        continue;
                    };
                    let (bottom, top) = (zone.bottom.min(zone.top), zone.bottom.max(zone.top));
                    let candidate = match category {
                        PatternCategory::Fvg => PatternCandidate::fvg(direction, zone.index, ts, bottom, top),
                        _ => PatternCandidate::order_block(direction, zone.index, ts, bottom, top),
                    };
                    out.push(candidate);
                }
            }
        }

        if let Some(structure) = &self.structure_analysis {
            for (category, events) in [
                (PatternCategory::Choch, &structure.choch_events),
                (PatternCategory::Bos, &structure.bos_events),
            ] {
                let out = set.entry(category).or_default();
                for (side, raw) in events.iter() {
                    let Some(event) = parse_record::<StructureRecord>(category, raw) else {
                        continue;
                    };
                    let Some(ts) = event.timestamp.to_utc() else {
                        warn!("Skipping {} with invalid timestamp {:?}", category, event.timestamp);
                        continue;
                    };
                    let Some(index) = resolve_bar_index(bars, ts) else {
                        debug!("{} at {} precedes the first bar, dropped", category, ts);
                        continue;
                    };
                    let direction = side.or_else(|| event.direction());
                    let candidate = match category {
                        PatternCategory::Choch => PatternCandidate::choch(direction, index, ts, event.broken_level),
                        _ => PatternCandidate::bos(direction, index, ts, event.broken_level),
                    };
                    out.push(candidate);
                }
            }
        }

        set
    }
}

/// Index of the last bar opened at or before `t`
pub fn resolve_bar_index(bars: &[PriceBar], t: DateTime<Utc>) -> Option<usize> {
    let after = bars.partition_point(|b| b.timestamp <= t);
    after.checked_sub(1)
}
