//! Renderable session records
//!
//! Turns tracked session instances into what the chart layer consumes:
//! one record per session with data (two dashed lines plus arrow markers)
//! and the background bands for the current day's sessions.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;

use super::calendar::{SessionCalendar, SessionState, SessionWindow};
use super::tracker::{SessionExtremumTracker, SessionInstance};

/// Which extreme a line marks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LevelKind {
    High,
    Low,
}

impl std::fmt::Display for LevelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LevelKind::High => write!(f, "High"),
            LevelKind::Low => write!(f, "Low"),
        }
    }
}

/// Session high/low as handed to the renderer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionLevel {
    pub session_name: String,
    pub color: String,
    pub date: NaiveDate,
    /// Live state at the time the record was built
    pub state: SessionState,
    pub high: f64,
    pub low: f64,
    pub window: SessionWindow,
    /// Session end once completed, otherwise the build time
    pub marker_time: DateTime<Utc>,
}

/// One horizontal line with its arrow marker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelLine {
    pub session_name: String,
    pub kind: LevelKind,
    pub price: f64,
    pub color: String,
    /// Price-axis title, e.g. "London High"
    pub title: String,
    /// Marker text, e.g. "London H: 13.39"
    pub marker_label: String,
    pub marker_time: DateTime<Utc>,
}

impl SessionLevel {
    /// None while the instance has no bars
    pub fn from_instance(instance: &SessionInstance, now: DateTime<Utc>) -> Option<Self> {
        let (high, low) = instance.range()?;
        let live = SessionCalendar::lifecycle_state(&instance.definition, instance.calendar_date, now);
        // A frozen instance stays completed even if `now` lags the last bar
        let state = instance.state.max(live);

        let marker_time = match state {
            SessionState::Completed => instance.window.end,
            _ => now,
        };

        Some(Self {
            session_name: instance.definition.name.clone(),
            color: instance.definition.color.clone(),
            date: instance.calendar_date,
            state,
            high,
            low,
            window: instance.window,
            marker_time,
        })
    }

    pub fn lines(&self) -> [LevelLine; 2] {
        [self.line(LevelKind::High), self.line(LevelKind::Low)]
    }

    fn line(&self, kind: LevelKind) -> LevelLine {
        let (price, short) = match kind {
            LevelKind::High => (self.high, "H"),
            LevelKind::Low => (self.low, "L"),
        };
        LevelLine {
            session_name: self.session_name.clone(),
            kind,
            price,
            color: self.color.clone(),
            title: format!("{} {}", self.session_name, kind),
            marker_label: format!("{} {}: {}", self.session_name, short, format_price(price)),
            marker_time: self.marker_time,
        }
    }
}

/// Session levels relevant at `now`: instances opened today, plus yesterday's
/// if their window runs across midnight into today.
///
/// Active sessions come first, then completed ones by most recent end.
pub fn session_levels(tracker: &SessionExtremumTracker, now: DateTime<Utc>) -> Vec<SessionLevel> {
    let today = now.date_naive();
    let mut levels: Vec<SessionLevel> = tracker
        .instances()
        .filter(|i| i.calendar_date == today || (i.window.end > today_start(today) && i.calendar_date < today))
        .filter_map(|i| SessionLevel::from_instance(i, now))
        .filter(|l| l.state != SessionState::NotStarted)
        .collect();

    levels.sort_by_key(|l| (l.state != SessionState::Active, Reverse(l.window.end)));
    levels
}

fn today_start(today: NaiveDate) -> DateTime<Utc> {
    today.and_time(chrono::NaiveTime::MIN).and_utc()
}

/// Background band for a session on the current day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionBackground {
    pub session_name: String,
    pub color: String,
    pub window: SessionWindow,
    pub state: SessionState,
    /// Where the session label sits (window midpoint)
    pub label_time: DateTime<Utc>,
}

/// Bands for every session of the current UTC day that has started by `now`
pub fn session_backgrounds(calendar: &SessionCalendar, now: DateTime<Utc>) -> Vec<SessionBackground> {
    let today = now.date_naive();
    let mut anchors: Vec<_> = calendar
        .definitions()
        .iter()
        .map(|d| (d, today))
        .collect();

    // Yesterday's windows still running into today
    for (definition, date) in calendar.classify(now) {
        if date != today {
            anchors.push((definition, date));
        }
    }

    anchors
        .into_iter()
        .filter_map(|(definition, date)| {
            let state = SessionCalendar::lifecycle_state(definition, date, now);
            if state == SessionState::NotStarted {
                return None;
            }
            let window = definition.window(date);
            Some(SessionBackground {
                session_name: definition.name.clone(),
                color: definition.color.clone(),
                window,
                state,
                label_time: window.midpoint(),
            })
        })
        .collect()
}

/// Two decimals for ordinary prices, six for sub-unit ones
pub fn format_price(price: f64) -> String {
    if price.abs() >= 1.0 {
        format!("{:.2}", price)
    } else {
        format!("{:.6}", price)
    }
}
