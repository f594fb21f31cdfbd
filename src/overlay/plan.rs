//! Render plan
//!
//! Everything the chart layer needs for one render cycle: session lines and
//! backgrounds, overlaps, and the filtered pattern sets. Session lines are
//! capped like any other overlay category.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use super::candidates::PatternSet;
use super::config::VisualizationLimits;
use super::filter::{filter_patterns, FilterContext, FilteredPatterns};
use crate::error::OverlayError;
use crate::sessions::{
    session_backgrounds, session_levels, LevelLine, SessionBackground, SessionExtremumTracker, SessionLevel,
    SessionOverlap,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderPlan {
    pub generated_at: DateTime<Utc>,
    pub active_sessions: Vec<String>,
    pub session_levels: Vec<SessionLevel>,
    pub session_backgrounds: Vec<SessionBackground>,
    pub overlaps: Vec<SessionOverlap>,
    pub patterns: FilteredPatterns,
}

impl RenderPlan {
    /// Assemble the plan for `now`.
    ///
    /// Session levels keep the active sessions first, then the most recently
    /// completed, limited to `maxSessionLevels / 2` sessions (two lines each).
    pub fn build(
        tracker: &SessionExtremumTracker,
        candidates: &PatternSet,
        limits: &VisualizationLimits,
        context: &FilterContext,
        now: DateTime<Utc>,
    ) -> Result<Self, OverlayError> {
        let patterns = filter_patterns(candidates, limits, context)?;
        let calendar = tracker.calendar();

        let mut levels = session_levels(tracker, now);
        levels.truncate(limits.max_session_levels / 2);

        let plan = Self {
            generated_at: now,
            active_sessions: calendar
                .classify(now)
                .into_iter()
                .map(|(d, _)| d.name.clone())
                .collect(),
            session_levels: levels,
            session_backgrounds: session_backgrounds(calendar, now),
            overlaps: calendar.overlaps(now),
            patterns,
        };

        info!(
            "Render plan at {}: {} session lines, {} patterns, active: [{}]",
            now,
            plan.line_count(),
            plan.pattern_count(),
            plan.active_sessions.join(", ")
        );

        Ok(plan)
    }

    /// High and low line for every session level
    pub fn level_lines(&self) -> Vec<LevelLine> {
        self.session_levels.iter().flat_map(|l| l.lines()).collect()
    }

    pub fn line_count(&self) -> usize {
        self.session_levels.len() * 2
    }

    /// One arrow marker per line
    pub fn marker_count(&self) -> usize {
        self.line_count()
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.values().map(Vec::len).sum()
    }

    /// The distinguished overlap, if it is running
    pub fn prime_overlap(&self) -> Option<&SessionOverlap> {
        self.overlaps.iter().find(|o| o.highest_liquidity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::candidates::{PatternCandidate, PatternCategory};
    use crate::sessions::calendar::{ASIA, LONDON, NEW_YORK};
    use crate::sessions::{SessionCalendar, SessionState, TrackerConfig};
    use crate::types::{Direction, PriceBar};
    use chrono::{Duration, TimeZone};

    fn ts(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, hour, minute, 0).unwrap()
    }

    /// 15m bars from 00:00 to `until`, gently rising
    fn tracker_until(until: DateTime<Utc>) -> (SessionExtremumTracker, Vec<PriceBar>) {
        let mut tracker = SessionExtremumTracker::new(SessionCalendar::standard(), TrackerConfig::default());
        let mut bars = Vec::new();
        let mut t = ts(0, 0);
        let mut price = 13.00;
        while t <= until {
            let bar = PriceBar::new(t, price, price + 0.02, price - 0.02, price + 0.01);
            tracker.ingest(&bar).unwrap();
            bars.push(bar);
            t += Duration::minutes(15);
            price += 0.005;
        }
        (tracker, bars)
    }

    #[test]
    fn test_plan_at_ten_utc() {
        let (tracker, bars) = tracker_until(ts(10, 0));
        let context = FilterContext::from_bars(&bars).unwrap();

        let plan = RenderPlan::build(
            &tracker,
            &PatternSet::new(),
            &VisualizationLimits::default(),
            &context,
            ts(10, 0),
        )
        .unwrap();

        assert_eq!(plan.active_sessions, vec![LONDON]);
        assert!(plan.overlaps.is_empty());
        assert_eq!(plan.session_levels.len(), 2);
        assert_eq!(plan.session_levels[0].session_name, LONDON);
        assert_eq!(plan.session_levels[1].session_name, ASIA);
        assert_eq!(plan.session_levels[1].state, SessionState::Completed);
        assert_eq!(plan.line_count(), 4);
        assert_eq!(plan.marker_count(), 4);
        assert_eq!(plan.level_lines().len(), 4);
        assert_eq!(plan.pattern_count(), 0);
    }

    #[test]
    fn test_plan_caps_session_lines() {
        let (tracker, bars) = tracker_until(ts(14, 0));
        let context = FilterContext::from_bars(&bars).unwrap();
        let limits = VisualizationLimits {
            max_session_levels: 4,
            ..Default::default()
        };

        let plan = RenderPlan::build(&tracker, &PatternSet::new(), &limits, &context, ts(14, 0)).unwrap();

        // London and New York active, Asia completed and dropped
        let names: Vec<_> = plan.session_levels.iter().map(|l| l.session_name.as_str()).collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&LONDON));
        assert!(names.contains(&NEW_YORK));
        assert!(plan.prime_overlap().is_some());
    }

    #[test]
    fn test_plan_filters_patterns() {
        let (tracker, bars) = tracker_until(ts(12, 0));
        let context = FilterContext::from_bars(&bars).unwrap();
        let latest = context.latest_bar_index;
        let price = context.current_price;

        let mut candidates = PatternSet::new();
        candidates.insert(
            PatternCategory::Fvg,
            (0..6)
                .map(|i| {
                    PatternCandidate::fvg(Direction::Bullish, latest - i, bars[latest - i].timestamp, price - 0.01, price + 0.01)
                })
                .collect(),
        );

        let plan = RenderPlan::build(
            &tracker,
            &candidates,
            &VisualizationLimits::default(),
            &context,
            ts(12, 0),
        )
        .unwrap();

        assert_eq!(plan.patterns[&PatternCategory::Fvg].len(), 3);
        assert_eq!(plan.pattern_count(), 3);
        let json = serde_json::to_value(&plan).unwrap();
        assert!(json.get("sessionLevels").is_some());
    }
}
