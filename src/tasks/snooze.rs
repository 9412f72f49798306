//! Snooze presets.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

const HOUR_MS: i64 = 60 * 60 * 1000;
const DAY_MS: i64 = 24 * HOUR_MS;

/// How long to hide a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnoozePreset {
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "1d")]
    OneDay,
    #[serde(rename = "7d")]
    SevenDays,
    /// Seven days before the invitation's event date, at least an hour out.
    #[serde(rename = "pre7")]
    BeforeEvent,
}

impl SnoozePreset {
    /// Parse a preset code. Unknown codes mean one day.
    #[must_use]
    pub fn parse_lenient(code: &str) -> Self {
        match code.trim() {
            "1h" => Self::OneHour,
            "7d" => Self::SevenDays,
            "pre7" => Self::BeforeEvent,
            _ => Self::OneDay,
        }
    }

    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::OneHour => "1h",
            Self::OneDay => "1d",
            Self::SevenDays => "7d",
            Self::BeforeEvent => "pre7",
        }
    }

    /// Snooze deadline in epoch ms.
    ///
    /// `event_date` is only consulted by [`SnoozePreset::BeforeEvent`]; when it
    /// is absent or unparseable that preset behaves like seven days.
    #[must_use]
    pub fn until(self, now_ms: i64, event_date: Option<&str>) -> i64 {
        match self {
            Self::OneHour => now_ms + HOUR_MS,
            Self::OneDay => now_ms + DAY_MS,
            Self::SevenDays => now_ms + 7 * DAY_MS,
            Self::BeforeEvent => match event_date.and_then(parse_event_date) {
                Some(event_ms) => (event_ms - 7 * DAY_MS).max(now_ms + HOUR_MS),
                None => now_ms + 7 * DAY_MS,
            },
        }
    }
}

impl fmt::Display for SnoozePreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Parse an ISO-ish event timestamp into epoch ms. Zone-less values are UTC.
fn parse_event_date(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.timestamp_millis());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc().timestamp_millis());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp_millis())
}
