//! Active time-of-day window.
//!
//! Sensor ingestion and live forecast fetches are only permitted while the
//! local hour is inside `[start_hour, end_hour)`.

use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

pub const DEFAULT_START_HOUR: u32 = 5;
pub const DEFAULT_END_HOUR: u32 = 18;

/// Local-hour gate. Pure and stateless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveWindow {
    start_hour: u32,
    end_hour: u32,
    tz: Tz,
}

impl ActiveWindow {
    /// Build a window; `start_hour == end_hour`, a start above 23 or an end above 24 is rejected.
    /// `start_hour > end_hour` wraps past midnight.
    pub fn new(start_hour: u32, end_hour: u32, tz: Tz) -> Result<Self, ValidationError> {
        if start_hour > 23 || end_hour > 24 || start_hour == end_hour {
            return Err(ValidationError::InvalidHourRange {
                start: start_hour,
                end: end_hour,
            });
        }
        Ok(Self {
            start_hour,
            end_hour,
            tz,
        })
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    pub fn start_hour(&self) -> u32 {
        self.start_hour
    }

    pub fn end_hour(&self) -> u32 {
        self.end_hour
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        is_active(now, self.tz, self.start_hour, self.end_hour)
    }
}

impl Default for ActiveWindow {
    fn default() -> Self {
        Self {
            start_hour: DEFAULT_START_HOUR,
            end_hour: DEFAULT_END_HOUR,
            tz: chrono_tz::Asia::Tokyo,
        }
    }
}

/// True iff the local hour of `now` in `tz` lies in `[start_hour, end_hour)`.
pub fn is_active(now: DateTime<Utc>, tz: Tz, start_hour: u32, end_hour: u32) -> bool {
    let hour = now.with_timezone(&tz).hour();

    // Overnight window (e.g., 22:00 - 04:00)
    if start_hour > end_hour {
        return hour >= start_hour || hour < end_hour;
    }

    hour >= start_hour && hour < end_hour
}
