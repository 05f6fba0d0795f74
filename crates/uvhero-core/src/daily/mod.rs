//! Daily summaries, badges and the rollover that produces them.

mod badges;
mod rollover;

pub use badges::{compute_streak, BadgeEvaluator, BadgeReport, BEGINNER_STREAK, MASTER_STREAK};
pub use rollover::{next_fire_after, DailyRollover, RolloverOutcome, RolloverPolicy, RolloverState};

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::{day_range, local_day, resolve_local};
use crate::error::DatabaseError;
use crate::gauge::{self, GaugeLevels};
use crate::storage::Database;

/// One folded day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub levels: GaugeLevels,
    pub prevent_count: u32,
    pub prevent_success: bool,
}

/// Streak badges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BadgeKind {
    /// Three successful days in a row
    Beginner,
    /// Seven successful days in a row
    Master,
}

impl BadgeKind {
    pub const ALL: [BadgeKind; 2] = [BadgeKind::Beginner, BadgeKind::Master];

    pub fn as_str(&self) -> &'static str {
        match self {
            BadgeKind::Beginner => "beginner",
            BadgeKind::Master => "master",
        }
    }

    /// Consecutive successful days needed to hold this badge.
    pub fn required_streak(&self) -> u32 {
        match self {
            BadgeKind::Beginner => BEGINNER_STREAK,
            BadgeKind::Master => MASTER_STREAK,
        }
    }
}

impl fmt::Display for BadgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BadgeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "beginner" => Ok(BadgeKind::Beginner),
            "master" => Ok(BadgeKind::Master),
            other => Err(format!("unknown badge '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Badge {
    pub id: String,
    pub name: BadgeKind,
    pub date_earned: DateTime<Utc>,
}

impl Badge {
    pub fn earned(name: BadgeKind, at: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            date_earned: at,
        }
    }
}

/// Where the displayed gauge levels came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LevelSource {
    /// Scored from today's committed records
    Live,
    /// Read from today's summary after the rollover
    Summary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayLevels {
    pub date: NaiveDate,
    pub levels: GaugeLevels,
    pub source: LevelSource,
    pub prevent_count: u32,
}

/// Levels to show at `now`: today's summary once the fire time has passed and
/// the summary exists, otherwise a live score over today's records.
pub fn display_levels(
    db: &Database,
    now: DateTime<Utc>,
    policy: &RolloverPolicy,
) -> Result<DisplayLevels, crate::error::CoreError> {
    let today = local_day(now, policy.tz);
    let fire_at = resolve_local(policy.tz, today.and_time(policy.fire_time));

    if now >= fire_at {
        if let Some(summary) = db.summary_for(today)? {
            return Ok(DisplayLevels {
                date: today,
                levels: summary.levels,
                source: LevelSource::Summary,
                prevent_count: summary.prevent_count,
            });
        }
    }

    let records = db.query_records(day_range(today, policy.tz))?;
    Ok(DisplayLevels {
        date: today,
        levels: gauge::score(&records),
        source: LevelSource::Live,
        prevent_count: db.prevent_tally(today)?,
    })
}

/// Summaries newest first. Convenience for callers that only read.
pub fn history(db: &Database) -> Result<Vec<DailySummary>, DatabaseError> {
    db.query_summaries_desc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn badge_kind_parses_and_prints() {
        for kind in BadgeKind::ALL {
            assert_eq!(kind.as_str().parse::<BadgeKind>().unwrap(), kind);
        }
        assert!("expert".parse::<BadgeKind>().is_err());
        assert_eq!(BadgeKind::Master.to_string(), "master");
    }

    #[test]
    fn display_uses_live_score_before_fire_time() {
        let db = Database::open_memory().unwrap();
        let policy = RolloverPolicy::default();
        // 10:00 JST
        let now = utc("2025-06-01T01:00:00Z");
        db.append_record(now - Duration::minutes(30), 1.0, 0.0).unwrap();
        let shown = display_levels(&db, now, &policy).unwrap();
        assert_eq!(shown.source, LevelSource::Live);
        assert_eq!(shown.levels.energy, 1);
    }

    #[test]
    fn display_switches_to_summary_after_fire_time() {
        let db = Database::open_memory().unwrap();
        let policy = RolloverPolicy::default();
        // 19:00 JST
        let now = utc("2025-06-01T10:00:00Z");
        let levels = GaugeLevels {
            fatigue: 2,
            sunburn: 1,
            energy: 3,
            sleepiness: 0,
        };
        db.create_summary(&DailySummary {
            date: "2025-06-01".parse().unwrap(),
            levels,
            prevent_count: 4,
            prevent_success: false,
        })
        .unwrap();
        let shown = display_levels(&db, now, &policy).unwrap();
        assert_eq!(shown.source, LevelSource::Summary);
        assert_eq!(shown.levels, levels);
        assert_eq!(shown.prevent_count, 4);
    }
}
