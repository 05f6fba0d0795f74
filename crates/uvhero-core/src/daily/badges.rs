//! Streak badges.
//!
//! Badge existence is re-derived from the summary history on every
//! evaluation. Grants and revocations are idempotent, so evaluating twice in
//! a row never duplicates or flaps a badge.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{Badge, BadgeKind, DailySummary};
use crate::error::CoreError;
use crate::events::Event;
use crate::storage::Database;

pub const BEGINNER_STREAK: u32 = 3;
pub const MASTER_STREAK: u32 = 7;

/// Current run of consecutive successful days, anchored at the newest summary.
///
/// `summaries` must be sorted by date, newest first. A gap in dates or an
/// unsuccessful day ends the run. Summaries dated after the day the walk
/// expects next are skipped without ending it.
pub fn compute_streak(summaries: &[DailySummary]) -> u32 {
    let mut streak = 0;
    let mut expected: Option<NaiveDate> = None;

    for summary in summaries {
        match expected {
            None => {
                if !summary.prevent_success {
                    break;
                }
                streak = 1;
                expected = summary.date.pred_opt();
            }
            Some(day) if summary.date > day => continue,
            Some(day) if summary.date == day => {
                if !summary.prevent_success {
                    break;
                }
                streak += 1;
                expected = day.pred_opt();
            }
            Some(_) => break,
        }
        if expected.is_none() {
            break;
        }
    }

    streak
}

/// Result of one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BadgeReport {
    pub streak: u32,
    /// Badges held after the evaluation.
    pub held: Vec<BadgeKind>,
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BadgeEvaluator;

impl BadgeEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Recompute the streak and bring the badge table in line with it.
    ///
    /// Runs as one transaction: either every grant and revoke applies or none.
    pub fn evaluate(&self, db: &Database, now: DateTime<Utc>) -> Result<BadgeReport, CoreError> {
        db.with_transaction(|db| {
            let summaries = db.query_summaries_desc()?;
            let streak = compute_streak(&summaries);
            let mut held = Vec::new();
            let mut events = Vec::new();

            for kind in BadgeKind::ALL {
                let existing = db.query_badges(Some(kind))?;
                if streak >= kind.required_streak() {
                    if existing.is_empty() {
                        db.insert_badge(&Badge::earned(kind, now))?;
                        tracing::info!(badge = %kind, streak, "badge granted");
                        events.push(Event::BadgeGranted {
                            badge: kind,
                            streak,
                            at: now,
                        });
                    }
                    held.push(kind);
                } else if !existing.is_empty() {
                    db.delete_badges(&existing)?;
                    tracing::info!(badge = %kind, streak, "badge revoked");
                    events.push(Event::BadgeRevoked {
                        badge: kind,
                        streak,
                        at: now,
                    });
                }
            }

            Ok(BadgeReport {
                streak,
                held,
                events,
            })
        })
    }
}
