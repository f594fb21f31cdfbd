//! Session Calendar
//!
//! Declarative table of trading sessions as UTC hour ranges. Every question
//! about sessions (which are active, where they overlap, whether one has
//! finished) is answered from the same table by the generic functions here,
//! so adding a session is a data change.
//!
//! Standard sessions (UTC):
//! - Asia:     00:00 - 09:00
//! - London:   08:00 - 17:00
//! - New York: 13:00 - 22:00

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::ValidationError;

pub const ASIA: &str = "Asia";
pub const LONDON: &str = "London";
pub const NEW_YORK: &str = "New York";

/// A named UTC time-of-day window, half-open `[start, end)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDefinition {
    pub name: String,
    #[serde(rename = "startHourUTC")]
    pub start_hour_utc: u32,
    #[serde(rename = "endHourUTC")]
    pub end_hour_utc: u32,
    /// Opaque render tag, passed through untouched
    pub color: String,
}

/// Concrete UTC bounds of one session on one calendar date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SessionWindow {
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t < self.end
    }

    pub fn midpoint(&self) -> DateTime<Utc> {
        self.start + (self.end - self.start) / 2
    }
}

impl SessionDefinition {
    pub fn new(name: &str, start_hour_utc: u32, end_hour_utc: u32, color: &str) -> Self {
        Self {
            name: name.to_string(),
            start_hour_utc,
            end_hour_utc,
            color: color.to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        for hour in [self.start_hour_utc, self.end_hour_utc] {
            if hour >= 24 {
                return Err(ValidationError::HourOutOfRange {
                    name: self.name.clone(),
                    hour,
                });
            }
        }
        if self.start_hour_utc == self.end_hour_utc {
            return Err(ValidationError::EmptySessionWindow {
                name: self.name.clone(),
                hour: self.start_hour_utc,
            });
        }
        Ok(())
    }

    /// Window ends on the following calendar date
    pub fn crosses_midnight(&self) -> bool {
        self.start_hour_utc > self.end_hour_utc
    }

    /// Window anchored on `date` (the date the session opens)
    pub fn window(&self, date: NaiveDate) -> SessionWindow {
        let midnight = date.and_time(NaiveTime::MIN).and_utc();
        let start = midnight + Duration::hours(self.start_hour_utc as i64);
        let end_day = if self.crosses_midnight() {
            midnight + Duration::days(1)
        } else {
            midnight
        };
        SessionWindow {
            start,
            end: end_day + Duration::hours(self.end_hour_utc as i64),
        }
    }

    /// Human readable hours, e.g. "08:00-17:00"
    pub fn hours_label(&self) -> String {
        format!("{:02}:00-{:02}:00", self.start_hour_utc, self.end_hour_utc)
    }
}

/// Lifecycle of one session instance; ordered so that time only moves it forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SessionState {
    NotStarted,
    Active,
    Completed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::NotStarted => write!(f, "NOT STARTED"),
            SessionState::Active => write!(f, "ACTIVE"),
            SessionState::Completed => write!(f, "COMPLETED"),
        }
    }
}

/// Two sessions active at the same instant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOverlap {
    pub first: String,
    pub second: String,
    /// Set for the calendar's prime pair (London/New York on the standard table)
    pub highest_liquidity: bool,
}

/// Immutable set of session definitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionCalendar {
    definitions: Vec<SessionDefinition>,
    prime_overlap: Option<(String, String)>,
}

impl Default for SessionCalendar {
    fn default() -> Self {
        Self::standard()
    }
}

impl SessionCalendar {
    /// Asia, London and New York with London/New York as the prime overlap
    pub fn standard() -> Self {
        Self {
            definitions: vec![
                SessionDefinition::new(ASIA, 0, 9, "#2196F3"),
                SessionDefinition::new(LONDON, 8, 17, "#4CAF50"),
                SessionDefinition::new(NEW_YORK, 13, 22, "#FF9800"),
            ],
            prime_overlap: Some((LONDON.to_string(), NEW_YORK.to_string())),
        }
    }

    /// Build a calendar from custom definitions, rejecting malformed ones
    pub fn new(definitions: Vec<SessionDefinition>) -> Result<Self, ValidationError> {
        let mut seen = HashSet::new();
        for definition in &definitions {
            definition.validate()?;
            if !seen.insert(definition.name.as_str()) {
                return Err(ValidationError::DuplicateSession(definition.name.clone()));
            }
        }
        Ok(Self {
            definitions,
            prime_overlap: None,
        })
    }

    /// Tag the overlap of `first` and `second` as the highest-liquidity window
    pub fn with_prime_overlap(mut self, first: &str, second: &str) -> Self {
        self.prime_overlap = Some((first.to_string(), second.to_string()));
        self
    }

    pub fn definitions(&self) -> &[SessionDefinition] {
        &self.definitions
    }

    pub fn definition(&self, name: &str) -> Option<&SessionDefinition> {
        self.definitions.iter().find(|d| d.name == name)
    }

    /// Every session whose window contains `t`, paired with the date the window opened on.
    ///
    /// Windows are anchored on `t`'s UTC date; when `t` falls before that
    /// date's start the previous date's window is tested as well, which is
    /// what catches sessions running across midnight.
    pub fn classify(&self, t: DateTime<Utc>) -> Vec<(&SessionDefinition, NaiveDate)> {
        let date = t.date_naive();
        let mut active = Vec::new();

        for definition in &self.definitions {
            let window = definition.window(date);
            if window.contains(t) {
                active.push((definition, date));
                continue;
            }
            if t < window.start {
                if let Some(previous) = date.pred_opt() {
                    if definition.window(previous).contains(t) {
                        active.push((definition, previous));
                    }
                }
            }
        }

        active
    }

    /// State of `definition` on `date` as seen at `now`
    pub fn lifecycle_state(
        definition: &SessionDefinition,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> SessionState {
        let window = definition.window(date);
        if now < window.start {
            SessionState::NotStarted
        } else if now < window.end {
            SessionState::Active
        } else {
            SessionState::Completed
        }
    }

    /// Unordered pairs of sessions active at `now`, in definition order
    pub fn overlaps(&self, now: DateTime<Utc>) -> Vec<SessionOverlap> {
        let active = self.classify(now);
        let mut overlaps = Vec::new();

        for (i, (first, _)) in active.iter().enumerate() {
            for (second, _) in active.iter().skip(i + 1) {
                overlaps.push(SessionOverlap {
                    first: first.name.clone(),
                    second: second.name.clone(),
                    highest_liquidity: self.is_prime_pair(&first.name, &second.name),
                });
            }
        }

        overlaps
    }

    fn is_prime_pair(&self, a: &str, b: &str) -> bool {
        match &self.prime_overlap {
            Some((x, y)) => (x == a && y == b) || (x == b && y == a),
            None => false,
        }
    }
}
