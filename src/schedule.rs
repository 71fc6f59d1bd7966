//! Day/night auto schedule on the local wall clock.

use chrono::{Local, Timelike};
use thiserror::Error;

use crate::settings::Settings;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("expected 4 comma-separated fields, got {0}")]
    FieldCount(usize),
    #[error("time must be HH:MM, got {0:?}")]
    BadTime(String),
    #[error("brightness must be an integer 0-100, got {0:?}")]
    BadValue(String),
}

/// Exactly `HH:MM`, 00-23 and 00-59.
pub fn valid_hhmm(text: &str) -> bool {
    let b = text.as_bytes();
    if b.len() != 5 || b[2] != b':' {
        return false;
    }
    if !b[..2].iter().chain(&b[3..]).all(u8::is_ascii_digit) {
        return false;
    }
    let h = (b[0] - b'0') * 10 + (b[1] - b'0');
    let m = (b[3] - b'0') * 10 + (b[4] - b'0');
    h <= 23 && m <= 59
}

/// Minutes since midnight for a string accepted by [`valid_hhmm`].
pub fn hhmm_to_minutes(text: &str) -> Option<u32> {
    if !valid_hhmm(text) {
        return None;
    }
    let h: u32 = text[..2].parse().ok()?;
    let m: u32 = text[3..].parse().ok()?;
    Some(h * 60 + m)
}

/// `[start, end)` on a 24h clock, wrapping past midnight. `start == end`
/// covers the whole day.
pub fn in_clock_range(cur: u32, start: u32, end: u32) -> bool {
    if start == end {
        return true;
    }
    if start < end {
        start <= cur && cur < end
    } else {
        cur >= start || cur < end
    }
}

pub fn current_minutes() -> u32 {
    let now = Local::now();
    now.hour() * 60 + now.minute()
}

/// Brightness the schedule asks for at `minutes` past midnight.
pub fn target_at(settings: &Settings, minutes: u32) -> u8 {
    let day = hhmm_to_minutes(&settings.day_start).unwrap_or(8 * 60);
    let night = hhmm_to_minutes(&settings.night_start).unwrap_or(20 * 60);
    if in_clock_range(minutes, day, night) {
        settings.day
    } else {
        settings.night
    }
}

/// Values from the schedule editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleEdit {
    pub day_start: String,
    pub night_start: String,
    pub day: u8,
    pub night: u8,
}

impl ScheduleEdit {
    pub fn from_settings(s: &Settings) -> Self {
        Self {
            day_start: s.day_start.clone(),
            night_start: s.night_start.clone(),
            day: s.day,
            night: s.night,
        }
    }

    /// `dayStart,nightStart,dayValue,nightValue`, e.g. `08:00,20:00,40,25`.
    pub fn parse(text: &str) -> Result<Self, ScheduleError> {
        let parts: Vec<&str> = text.split(',').map(str::trim).collect();
        let [day_start, night_start, day, night] = parts[..] else {
            return Err(ScheduleError::FieldCount(parts.len()));
        };
        for t in [day_start, night_start] {
            if !valid_hhmm(t) {
                return Err(ScheduleError::BadTime(t.to_string()));
            }
        }
        let percent = |v: &str| {
            v.parse::<i64>()
                .map(|n| n.clamp(0, 100) as u8)
                .map_err(|_| ScheduleError::BadValue(v.to_string()))
        };
        Ok(Self {
            day_start: day_start.to_string(),
            night_start: night_start.to_string(),
            day: percent(day)?,
            night: percent(night)?,
        })
    }

    pub fn to_text(&self) -> String {
        format!("{},{},{},{}", self.day_start, self.night_start, self.day, self.night)
    }

    pub fn apply_to(self, s: &mut Settings) {
        s.day_start = self.day_start;
        s.night_start = self.night_start;
        s.day = self.day;
        s.night = self.night;
    }
}
