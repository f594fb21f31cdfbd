//! Session Extremum Tracker
//!
//! Streams bars for one symbol/timeframe and keeps a running high/low for
//! every session instance (one session on one calendar date):
//! 1. NOT STARTED - no instance exists until a bar lands inside the window
//! 2. ACTIVE - every in-window bar widens high/low
//! 3. COMPLETED - first bar at or past the window end freezes the instance

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use super::calendar::{SessionCalendar, SessionDefinition, SessionState, SessionWindow};
use crate::error::ValidationError;
use crate::types::PriceBar;

/// Configuration for the extremum tracker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Calendar days of instances kept behind the latest bar (default: 3)
    pub retain_days: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self { retain_days: 3 }
    }
}

/// One session on one calendar date with its running extremes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInstance {
    pub definition: SessionDefinition,
    pub calendar_date: NaiveDate,
    pub window: SessionWindow,
    pub state: SessionState,
    pub high: Option<f64>,
    pub low: Option<f64>,
    /// Bars folded into high/low
    pub bar_count: usize,
}

impl SessionInstance {
    fn open(definition: &SessionDefinition, calendar_date: NaiveDate) -> Self {
        Self {
            definition: definition.clone(),
            calendar_date,
            window: definition.window(calendar_date),
            state: SessionState::Active,
            high: None,
            low: None,
            bar_count: 0,
        }
    }

    fn apply(&mut self, bar: &PriceBar) {
        self.high = Some(self.high.map_or(bar.high, |h| h.max(bar.high)));
        self.low = Some(self.low.map_or(bar.low, |l| l.min(bar.low)));
        self.bar_count += 1;
    }

    fn freeze(&mut self) {
        self.state = SessionState::Completed;
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn is_completed(&self) -> bool {
        self.state == SessionState::Completed
    }

    /// `(high, low)` once at least one bar was observed
    pub fn range(&self) -> Option<(f64, f64)> {
        match (self.high, self.low) {
            (Some(high), Some(low)) => Some((high, low)),
            _ => None,
        }
    }
}

/// Lifecycle events emitted while ingesting
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// First bar landed inside a session window
    Opened { session: String, date: NaiveDate },
    /// Window end reached, extremes frozen
    Completed {
        session: String,
        date: NaiveDate,
        high: Option<f64>,
        low: Option<f64>,
    },
}

/// Running session extremes for a single symbol/timeframe
#[derive(Debug, Clone)]
pub struct SessionExtremumTracker {
    config: TrackerConfig,
    calendar: SessionCalendar,
    instances: BTreeMap<(NaiveDate, String), SessionInstance>,
    last_timestamp: Option<DateTime<Utc>>,
}

impl SessionExtremumTracker {
    pub fn new(calendar: SessionCalendar, config: TrackerConfig) -> Self {
        Self {
            config,
            calendar,
            instances: BTreeMap::new(),
            last_timestamp: None,
        }
    }

    pub fn calendar(&self) -> &SessionCalendar {
        &self.calendar
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.last_timestamp
    }

    /// Fold one bar into every session instance whose window contains it.
    ///
    /// The bar is validated before anything is touched: a malformed,
    /// duplicate or out-of-order bar returns an error and leaves all
    /// instances unchanged.
    pub fn ingest(&mut self, bar: &PriceBar) -> Result<Vec<SessionEvent>, ValidationError> {
        if let Err(e) = self.check(bar) {
            warn!("Rejected bar: {}", e);
            return Err(e);
        }

        let mut events = self.freeze_ended(bar.timestamp);

        for (definition, date) in self.calendar.classify(bar.timestamp) {
            let key = (date, definition.name.clone());
            let instance = self.instances.entry(key).or_insert_with(|| {
                debug!("{} session opened for {}", definition.name, date);
                events.push(SessionEvent::Opened {
                    session: definition.name.clone(),
                    date,
                });
                SessionInstance::open(definition, date)
            });

            if instance.is_completed() {
                continue;
            }
            instance.apply(bar);
        }

        self.last_timestamp = Some(bar.timestamp);
        self.prune(bar.timestamp.date_naive());

        Ok(events)
    }

    fn check(&self, bar: &PriceBar) -> Result<(), ValidationError> {
        bar.validate()?;
        if let Some(previous) = self.last_timestamp {
            if bar.timestamp <= previous {
                return Err(ValidationError::NonMonotonicBar {
                    previous,
                    received: bar.timestamp,
                });
            }
        }
        Ok(())
    }

    /// Freeze every instance whose window ended at or before `now`.
    ///
    /// Used for live queries where wall-clock time has moved past a session
    /// end before the next bar arrives.
    pub fn seal_until(&mut self, now: DateTime<Utc>) -> Vec<SessionEvent> {
        self.freeze_ended(now)
    }

    fn freeze_ended(&mut self, now: DateTime<Utc>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        for instance in self.instances.values_mut() {
            if !instance.is_completed() && instance.window.end <= now {
                instance.freeze();
                info!(
                    "{} session {} completed: high={:?} low={:?}",
                    instance.name(),
                    instance.calendar_date,
                    instance.high,
                    instance.low
                );
                events.push(SessionEvent::Completed {
                    session: instance.name().to_string(),
                    date: instance.calendar_date,
                    high: instance.high,
                    low: instance.low,
                });
            }
        }
        events
    }

    fn prune(&mut self, latest: NaiveDate) {
        let cutoff = latest - Duration::days(self.config.retain_days as i64);
        self.instances
            .retain(|(date, _), instance| *date >= cutoff || !instance.is_completed());
    }

    /// Instance for `session` opened on `date`, if any bar landed in it
    pub fn query(&self, session: &str, date: NaiveDate) -> Option<&SessionInstance> {
        self.instances.get(&(date, session.to_string()))
    }

    /// All tracked instances, oldest date first
    pub fn instances(&self) -> impl Iterator<Item = &SessionInstance> {
        self.instances.values()
    }

    pub fn instances_on(&self, date: NaiveDate) -> Vec<&SessionInstance> {
        self.instances
            .values()
            .filter(|i| i.calendar_date == date)
            .collect()
    }

    /// Drop all state (new replay)
    pub fn reset(&mut self) {
        self.instances.clear();
        self.last_timestamp = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sessions::calendar::{ASIA, LONDON, NEW_YORK};
    use chrono::TimeZone;

    fn ts(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, hour, minute, 0).unwrap()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
    }

    fn bar(t: DateTime<Utc>, high: f64, low: f64) -> PriceBar {
        PriceBar::new(t, low, high, low, high)
    }

    fn tracker() -> SessionExtremumTracker {
        SessionExtremumTracker::new(SessionCalendar::standard(), TrackerConfig::default())
    }

    #[test]
    fn test_query_absent_before_first_bar() {
        let t = tracker();
        assert!(t.query(LONDON, day()).is_none());
    }

    #[test]
    fn test_london_high_low() {
        let mut t = tracker();
        t.ingest(&bar(ts(10, 0), 13.35, 13.25)).unwrap();
        t.ingest(&bar(ts(10, 15), 13.39, 13.30)).unwrap();
        t.ingest(&bar(ts(10, 30), 13.31, 13.21)).unwrap();

        let london = t.query(LONDON, day()).unwrap();
        assert_eq!(london.high, Some(13.39));
        assert_eq!(london.low, Some(13.21));
        assert_eq!(london.state, SessionState::Active);
        assert_eq!(london.bar_count, 3);
        assert!(t.query(ASIA, day()).is_none());
    }

    #[test]
    fn test_overlapping_sessions_update_independently() {
        let mut t = tracker();
        t.ingest(&bar(ts(7, 0), 10.0, 9.0)).unwrap();
        let events = t.ingest(&bar(ts(8, 30), 12.0, 11.0)).unwrap();
        assert_eq!(
            events,
            vec![SessionEvent::Opened {
                session: LONDON.to_string(),
                date: day()
            }]
        );

        let asia = t.query(ASIA, day()).unwrap();
        let london = t.query(LONDON, day()).unwrap();
        assert_eq!(asia.range(), Some((12.0, 9.0)));
        assert_eq!(london.range(), Some((12.0, 11.0)));
    }

    #[test]
    fn test_session_freezes_at_window_end() {
        let mut t = tracker();
        t.ingest(&bar(ts(8, 45), 20.0, 19.0)).unwrap();

        // 09:00 is outside Asia and closes it
        let events = t.ingest(&bar(ts(9, 0), 25.0, 18.0)).unwrap();
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::Completed { session, high: Some(h), .. } if session == ASIA && *h == 20.0
        )));

        let asia = t.query(ASIA, day()).unwrap();
        assert!(asia.is_completed());
        assert_eq!(asia.range(), Some((20.0, 19.0)));

        // London keeps moving
        t.ingest(&bar(ts(9, 15), 30.0, 17.0)).unwrap();
        assert_eq!(t.query(LONDON, day()).unwrap().range(), Some((30.0, 17.0)));
        assert_eq!(t.query(ASIA, day()).unwrap().range(), Some((20.0, 19.0)));
    }

    #[test]
    fn test_duplicate_bar_rejected_without_mutation() {
        let mut t = tracker();
        let b = bar(ts(10, 0), 13.35, 13.25);
        t.ingest(&b).unwrap();

        let before = t.query(LONDON, day()).cloned();
        let result = t.ingest(&b);
        assert!(matches!(result, Err(ValidationError::NonMonotonicBar { .. })));
        assert_eq!(t.query(LONDON, day()).cloned(), before);
        assert_eq!(t.query(LONDON, day()).unwrap().bar_count, 1);
    }

    #[test]
    fn test_out_of_order_bar_rejected() {
        let mut t = tracker();
        t.ingest(&bar(ts(10, 30), 13.35, 13.25)).unwrap();
        let result = t.ingest(&bar(ts(10, 0), 99.0, 1.0));
        assert!(result.is_err());
        assert_eq!(t.query(LONDON, day()).unwrap().range(), Some((13.35, 13.25)));
        assert_eq!(t.last_timestamp(), Some(ts(10, 30)));
    }

    #[test]
    fn test_malformed_bar_rejected() {
        let mut t = tracker();
        let result = t.ingest(&PriceBar::new(ts(10, 0), 1.0, 1.0, 2.0, 1.0));
        assert!(matches!(result, Err(ValidationError::MalformedBar { .. })));
        assert!(t.query(LONDON, day()).is_none());
        assert!(t.last_timestamp().is_none());
    }

    #[test]
    fn test_seal_until_freezes_live() {
        let mut t = tracker();
        t.ingest(&bar(ts(16, 0), 5.0, 4.0)).unwrap();

        assert!(t.seal_until(ts(16, 59)).is_empty());
        let events = t.seal_until(ts(17, 0));
        assert_eq!(events.len(), 1);
        assert!(t.query(LONDON, day()).unwrap().is_completed());
        assert!(!t.query(NEW_YORK, day()).unwrap().is_completed());

        // A late bar still inside London's window cannot move frozen extremes
        t.ingest(&bar(ts(16, 30), 50.0, 0.5)).unwrap();
        assert_eq!(t.query(LONDON, day()).unwrap().range(), Some((5.0, 4.0)));
        assert_eq!(t.query(NEW_YORK, day()).unwrap().range(), Some((50.0, 0.5)));
    }

    #[test]
    fn test_extremes_match_bar_sequence() {
        let mut t = tracker();
        let highs = [101.5, 103.25, 102.0, 104.75, 100.5, 103.0];
        let lows = [99.0, 100.5, 98.25, 101.0, 97.5, 99.75];

        for (i, (h, l)) in highs.iter().zip(lows.iter()).enumerate() {
            let time = ts(14, 0) + Duration::minutes(5 * i as i64);
            t.ingest(&bar(time, *h, *l)).unwrap();
        }

        let ny = t.query(NEW_YORK, day()).unwrap();
        assert_eq!(ny.high, Some(104.75));
        assert_eq!(ny.low, Some(97.5));
        let (high, low) = ny.range().unwrap();
        assert!(low <= high);
    }

    #[test]
    fn test_new_day_creates_new_instance_and_prunes() {
        let config = TrackerConfig { retain_days: 1 };
        let mut t = SessionExtremumTracker::new(SessionCalendar::standard(), config);
        t.ingest(&bar(ts(1, 0), 10.0, 9.0)).unwrap();

        let next = ts(1, 0) + Duration::days(1);
        t.ingest(&bar(next, 11.0, 10.5)).unwrap();
        let next_day = day().succ_opt().unwrap();
        assert!(t.query(ASIA, day()).unwrap().is_completed());
        assert_eq!(t.query(ASIA, next_day).unwrap().range(), Some((11.0, 10.5)));

        t.ingest(&bar(next + Duration::days(1), 12.0, 11.5)).unwrap();
        assert!(t.query(ASIA, day()).is_none());
        assert!(t.query(ASIA, next_day).is_some());
    }

    #[test]
    fn test_window_crossing_midnight_spans_two_dates() {
        let calendar = SessionCalendar::new(vec![SessionDefinition::new("Sydney", 21, 6, "#9C27B0")]).unwrap();
        let mut t = SessionExtremumTracker::new(calendar, TrackerConfig::default());
        let at = |d: u32, h: u32, m: u32| Utc.with_ymd_and_hms(2025, 3, d, h, m, 0).unwrap();
        let opened_on = NaiveDate::from_ymd_opt(2025, 3, 9).unwrap();

        t.ingest(&bar(at(9, 21, 30), 10.0, 9.5)).unwrap();
        t.ingest(&bar(at(9, 23, 45), 10.4, 9.8)).unwrap();
        t.ingest(&bar(at(10, 2, 0), 10.2, 9.1)).unwrap();
        t.ingest(&bar(at(10, 5, 45), 10.1, 9.9)).unwrap();

        // Bars after midnight land in the instance opened the previous evening
        let sydney = t.query("Sydney", opened_on).unwrap();
        assert_eq!(sydney.state, SessionState::Active);
        assert_eq!(sydney.range(), Some((10.4, 9.1)));
        assert_eq!(sydney.bar_count, 4);
        assert!(t.query("Sydney", day()).is_none());

        let events = t.ingest(&bar(at(10, 6, 0), 11.0, 8.0)).unwrap();
        assert!(events.iter().any(|e| matches!(e, SessionEvent::Completed { date, .. } if *date == opened_on)));

        let sydney = t.query("Sydney", opened_on).unwrap();
        assert!(sydney.is_completed());
        assert_eq!(sydney.range(), Some((10.4, 9.1)));
        assert!(t.query("Sydney", day()).is_none());
    }
}

