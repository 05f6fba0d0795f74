//! Live prevention detection.
//!
//! A reading counts as "prevented" when the adjusted outer exposure exceeds
//! the adjusted inner exposure, meaning the wearer's cover is doing its job.
//! Successes are rate-limited by a cooldown so one sunny stretch is not
//! counted on every notification.

use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use super::Sample;
use crate::clock::local_day;
use crate::error::CoreError;
use crate::events::Event;
use crate::storage::Database;

pub const DEFAULT_PREVENTION_COOLDOWN_SECS: u64 = 60;

/// Display-scale outer exposure.
pub fn adjusted_outer(value: f64) -> f64 {
    (value + 1.2) * 2.5
}

/// Display-scale inner exposure. The gauges score this value.
pub fn adjusted_inner(value: f64) -> f64 {
    (value + 1.0) * 2.1
}

#[derive(Debug, Clone)]
pub struct PreventionDetector {
    cooldown: Duration,
    tz: Tz,
    last_success: Option<DateTime<Utc>>,
}

impl PreventionDetector {
    pub fn new(cooldown: Duration, tz: Tz) -> Self {
        Self {
            cooldown,
            tz,
            last_success: None,
        }
    }

    pub fn is_prevented(sample: &Sample) -> bool {
        adjusted_outer(sample.outer_value) > adjusted_inner(sample.inner_value)
    }

    /// Count `sample` towards today's tally if it shows prevention and the
    /// cooldown since the last success has passed.
    ///
    /// Today's summary, if the rollover already wrote one, follows the tally.
    pub fn observe(
        &mut self,
        sample: &Sample,
        now: DateTime<Utc>,
        db: &Database,
        success_threshold: u32,
    ) -> Result<Option<Event>, CoreError> {
        if !Self::is_prevented(sample) {
            return Ok(None);
        }
        if let Some(last) = self.last_success {
            let elapsed = (now - last).to_std().unwrap_or_default();
            if elapsed <= self.cooldown {
                return Ok(None);
            }
        }

        let day = local_day(now, self.tz);
        let count = db.with_transaction(|db| {
            let count = db.increment_prevent_tally(day)?;
            db.update_summary_prevention(day, count, count >= success_threshold)?;
            Ok(count)
        })?;
        self.last_success = Some(now);

        tracing::debug!(%day, count, "prevention counted");
        Ok(Some(Event::PreventionCounted {
            day,
            count,
            at: now,
        }))
    }
}
