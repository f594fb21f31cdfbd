//! Tracker registry keyed by symbol/timeframe
//!
//! Each key owns its tracker behind its own mutex, so ingestion for one key
//! is serialized while different keys proceed in parallel. The outer map
//! lock is only held long enough to look up or insert a tracker.

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::calendar::SessionCalendar;
use super::levels::{session_levels, SessionLevel};
use super::tracker::{SessionEvent, SessionExtremumTracker, SessionInstance, TrackerConfig};
use crate::error::ValidationError;
use crate::types::{PriceBar, TrackerKey};

/// Session trackers for many symbol/timeframe keys, safe to share across threads
pub struct TrackerRegistry {
    calendar: SessionCalendar,
    config: TrackerConfig,
    trackers: RwLock<HashMap<TrackerKey, Arc<Mutex<SessionExtremumTracker>>>>,
}

impl TrackerRegistry {
    pub fn new(calendar: SessionCalendar, config: TrackerConfig) -> Self {
        Self {
            calendar,
            config,
            trackers: RwLock::new(HashMap::new()),
        }
    }

    fn tracker(&self, key: &TrackerKey) -> Arc<Mutex<SessionExtremumTracker>> {
        if let Some(tracker) = self.trackers.read().get(key) {
            return tracker.clone();
        }

        let mut trackers = self.trackers.write();
        trackers
            .entry(key.clone())
            .or_insert_with(|| {
                debug!("Creating session tracker for {}", key);
                Arc::new(Mutex::new(SessionExtremumTracker::new(
                    self.calendar.clone(),
                    self.config.clone(),
                )))
            })
            .clone()
    }

    /// Ingest under the key's exclusive lock
    pub fn ingest(&self, key: &TrackerKey, bar: &PriceBar) -> Result<Vec<SessionEvent>, ValidationError> {
        let tracker = self.tracker(key);
        let mut guard = tracker.lock();
        guard.ingest(bar)
    }

    pub fn query(&self, key: &TrackerKey, session: &str, date: NaiveDate) -> Option<SessionInstance> {
        let tracker = self.trackers.read().get(key)?.clone();
        let guard = tracker.lock();
        guard.query(session, date).cloned()
    }

    pub fn session_levels(&self, key: &TrackerKey, now: DateTime<Utc>) -> Vec<SessionLevel> {
        let Some(tracker) = self.trackers.read().get(key).cloned() else {
            return Vec::new();
        };
        let guard = tracker.lock();
        session_levels(&guard, now)
    }

    /// Run `f` against the key's tracker while holding its lock
    pub fn with_tracker<R>(&self, key: &TrackerKey, f: impl FnOnce(&SessionExtremumTracker) -> R) -> Option<R> {
        let tracker = self.trackers.read().get(key)?.clone();
        let guard = tracker.lock();
        Some(f(&guard))
    }

    /// Tracked keys, sorted
    pub fn keys(&self) -> Vec<TrackerKey> {
        let mut keys: Vec<_> = self.trackers.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.trackers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.trackers.read().is_empty()
    }
}

impl Default for TrackerRegistry {
    fn default() -> Self {
        Self::new(SessionCalendar::standard(), TrackerConfig::default())
    }
}
