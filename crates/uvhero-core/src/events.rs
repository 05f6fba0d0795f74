use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::daily::BadgeKind;
use crate::gauge::GaugeLevels;

/// Every state change in the system produces an Event.
/// The CLI prints them; the daemon logs them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// A bucket's running maxima were written to the record store.
    RecordCommitted {
        record_id: i64,
        max_outer: f64,
        max_inner: f64,
        at: DateTime<Utc>,
    },
    /// The live prevention tally for `day` went up.
    PreventionCounted {
        day: NaiveDate,
        count: u32,
        at: DateTime<Utc>,
    },
    SummaryCreated {
        date: NaiveDate,
        levels: GaugeLevels,
        prevent_count: u32,
        prevent_success: bool,
        records_folded: usize,
        at: DateTime<Utc>,
    },
    /// Rollover fired but had nothing to fold.
    RolloverSkipped {
        date: NaiveDate,
        reason: String,
        at: DateTime<Utc>,
    },
    /// Retention removed summaries beyond the kept window.
    SummariesPurged {
        dates: Vec<NaiveDate>,
        at: DateTime<Utc>,
    },
    BadgeGranted {
        badge: BadgeKind,
        streak: u32,
        at: DateTime<Utc>,
    },
    BadgeRevoked {
        badge: BadgeKind,
        streak: u32,
        at: DateTime<Utc>,
    },
    /// The rollover timer was armed for its next firing.
    RolloverArmed {
        fire_at: DateTime<Utc>,
        delay_secs: i64,
        at: DateTime<Utc>,
    },
    ValueFixed {
        city: String,
        value: f64,
        authoritative: bool,
        at: DateTime<Utc>,
    },
    /// Fixed values from a previous local day were dropped.
    FixedValuesReset {
        cities: Vec<String>,
        at: DateTime<Utc>,
    },
}
