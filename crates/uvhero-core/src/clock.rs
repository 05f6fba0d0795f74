//! Clock abstraction and local-day arithmetic.
//!
//! Every time-driven component takes its "now" from a [`Clock`] so tests can
//! drive the day boundaries and the rollover schedule deterministically.

use std::ops::Range;
use std::sync::Mutex;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Hand-driven clock for tests and replays.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = at;
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *guard += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Calendar day of `at` in `tz`.
pub fn local_day(at: DateTime<Utc>, tz: Tz) -> NaiveDate {
    at.with_timezone(&tz).date_naive()
}

/// Whether two instants fall on the same calendar day in `tz`.
pub fn same_local_day(a: DateTime<Utc>, b: DateTime<Utc>, tz: Tz) -> bool {
    local_day(a, tz) == local_day(b, tz)
}

/// Resolve a local wall-clock time to an instant.
///
/// Ambiguous times take the earlier instant. Times inside a DST gap are moved
/// forward by an hour.
pub fn resolve_local(tz: Tz, naive: NaiveDateTime) -> DateTime<Utc> {
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
}

/// Instant at which `day` starts in `tz`.
pub fn day_start(day: NaiveDate, tz: Tz) -> DateTime<Utc> {
    resolve_local(tz, day.and_time(chrono::NaiveTime::MIN))
}

/// Half-open instant range covering `day` in `tz`.
pub fn day_range(day: NaiveDate, tz: Tz) -> Range<DateTime<Utc>> {
    let next = day.succ_opt().unwrap_or(day);
    day_start(day, tz)..day_start(next, tz)
}

/// First occurrence of local wall-clock `time` strictly after `now`.
///
/// Once today's occurrence has passed the result is tomorrow's. Should the
/// zone rules still produce an instant that is not in the future, the result
/// is pushed a full day past `now` so callers never see a zero or negative
/// delay.
pub fn next_daily_after(now: DateTime<Utc>, tz: Tz, time: NaiveTime) -> DateTime<Utc> {
    let today = local_day(now, tz);

    let candidate = resolve_local(tz, today.and_time(time));
    if candidate > now {
        return candidate;
    }

    let tomorrow = today.succ_opt().unwrap_or(today);
    let next = resolve_local(tz, tomorrow.and_time(time));
    if next > now {
        return next;
    }

    tracing::warn!(%now, %next, "computed occurrence is not in the future, pushing out a day");
    now + Duration::days(1)
}

/// Clock that follows tokio's (pausable) time from a fixed start, so
/// `start_paused` tests drive timers and wall time together.
#[cfg(test)]
pub(crate) struct TokioClock {
    base: DateTime<Utc>,
    start: tokio::time::Instant,
}

#[cfg(test)]
impl TokioClock {
    pub(crate) fn starting_at(base: DateTime<Utc>) -> Self {
        Self {
            base,
            start: tokio::time::Instant::now(),
        }
    }
}

#[cfg(test)]
impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = tokio::time::Instant::now() - self.start;
        self.base + Duration::from_std(elapsed).unwrap_or_else(|_| Duration::zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn local_day_uses_zone_offset() {
        // 16:00 UTC is 01:00 next day in Tokyo
        let at = utc("2025-06-01T16:00:00Z");
        assert_eq!(
            local_day(at, chrono_tz::Asia::Tokyo),
            NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()
        );
        assert_eq!(
            local_day(at, chrono_tz::UTC),
            NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
        );
    }

    #[test]
    fn day_range_spans_exactly_one_day() {
        let day = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let range = day_range(day, chrono_tz::Asia::Tokyo);
        assert_eq!(range.start, utc("2025-06-01T15:00:00Z"));
        assert_eq!(range.end - range.start, Duration::days(1));
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(utc("2025-06-01T00:00:00Z"));
        clock.advance(Duration::minutes(5));
        assert_eq!(clock.now(), utc("2025-06-01T00:05:00Z"));
        clock.set(utc("2025-07-01T00:00:00Z"));
        assert_eq!(clock.now(), utc("2025-07-01T00:00:00Z"));
    }

    #[test]
    fn next_daily_is_strictly_in_the_future() {
        let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        let tz = chrono_tz::Asia::Tokyo;
        // 08:00 JST
        assert_eq!(
            next_daily_after(utc("2025-06-01T23:00:00Z"), tz, nine),
            utc("2025-06-02T00:00:00Z")
        );
        // exactly 09:00 JST
        assert_eq!(
            next_daily_after(utc("2025-06-02T00:00:00Z"), tz, nine),
            utc("2025-06-03T00:00:00Z")
        );
    }

    #[test]
    fn resolve_local_skips_dst_gap() {
        // 2025-03-09 02:30 does not exist in New York
        let naive = NaiveDate::from_ymd_opt(2025, 3, 9)
            .unwrap()
            .and_hms_opt(2, 30, 0)
            .unwrap();
        let at = resolve_local(chrono_tz::America::New_York, naive);
        assert_eq!(at, utc("2025-03-09T07:30:00Z"));
    }
}
