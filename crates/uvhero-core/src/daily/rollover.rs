//! Daily rollover.
//!
//! Once a day, at a configured wall-clock time, the day's committed records
//! are scored, folded into one [`DailySummary`] and deleted. Summary creation,
//! record deletion and retention run as one transaction, so a failure leaves
//! the records in place and no summary behind.
//!
//! The timer is an explicit loop: compute the next fire instant from the
//! injected clock, sleep until then, fire, repeat.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};

use super::{BadgeEvaluator, BadgeReport, DailySummary};
use crate::clock::{day_range, local_day, next_daily_after, Clock};
use crate::error::CoreError;
use crate::events::Event;
use crate::gauge;
use crate::storage::SharedDb;

/// When and how the rollover runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolloverPolicy {
    /// Local wall-clock time of the daily fire.
    pub fire_time: NaiveTime,
    pub tz: Tz,
    /// Number of most recent summaries kept.
    pub retention: usize,
    /// Prevention count at which a day counts as successful.
    pub success_threshold: u32,
}

impl Default for RolloverPolicy {
    fn default() -> Self {
        Self {
            fire_time: NaiveTime::from_hms_opt(18, 0, 0).unwrap_or(NaiveTime::MIN),
            tz: chrono_tz::Asia::Tokyo,
            retention: 7,
            success_threshold: 10,
        }
    }
}

/// Next fire instant strictly after `now`.
///
/// Once today's fire time has passed the result is tomorrow's, never a zero
/// or negative delay.
pub fn next_fire_after(now: DateTime<Utc>, policy: &RolloverPolicy) -> DateTime<Utc> {
    next_daily_after(now, policy.tz, policy.fire_time)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum RolloverState {
    /// Timer armed for `next_fire`.
    Idle { next_fire: DateTime<Utc> },
    Firing,
}

/// What one fold did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolloverOutcome {
    pub date: NaiveDate,
    /// `None` when the day had no records.
    pub summary: Option<DailySummary>,
    pub records_folded: usize,
    pub purged: Vec<NaiveDate>,
    /// `None` when badge evaluation failed; the fold itself still stands.
    pub badges: Option<BadgeReport>,
    pub badge_error: Option<String>,
    pub events: Vec<Event>,
}

pub struct DailyRollover {
    db: SharedDb,
    clock: Arc<dyn Clock>,
    policy: RolloverPolicy,
    badges: BadgeEvaluator,
    state: Mutex<RolloverState>,
}

impl DailyRollover {
    /// Create a rollover, armed for the next fire time after the clock's now.
    pub fn new(db: SharedDb, clock: Arc<dyn Clock>, policy: RolloverPolicy) -> Self {
        let next_fire = next_fire_after(clock.now(), &policy);
        Self {
            db,
            clock,
            policy,
            badges: BadgeEvaluator::new(),
            state: Mutex::new(RolloverState::Idle { next_fire }),
        }
    }

    pub fn policy(&self) -> &RolloverPolicy {
        &self.policy
    }

    pub fn state(&self) -> RolloverState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: RolloverState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    /// Re-arm for the next fire time after now.
    pub fn arm(&self) -> Event {
        let now = self.clock.now();
        let next_fire = next_fire_after(now, &self.policy);
        self.set_state(RolloverState::Idle { next_fire });
        tracing::debug!(%next_fire, "rollover armed");
        Event::RolloverArmed {
            fire_at: next_fire,
            delay_secs: (next_fire - now).num_seconds(),
            at: now,
        }
    }

    /// Timer-driven fire: fold today, then re-arm whatever the result.
    pub fn fire(&self) -> Result<RolloverOutcome, CoreError> {
        self.set_state(RolloverState::Firing);
        let result = self.fold(None);
        self.arm();
        result
    }

    /// Out-of-band fold. Leaves the timer's arm state alone.
    ///
    /// When `deadline` passes before the fold commits, nothing is written and
    /// [`CoreError::DeadlineExceeded`] is returned.
    pub fn run_now(&self, deadline: Option<Instant>) -> Result<RolloverOutcome, CoreError> {
        self.fold(deadline)
    }

    /// [`run_now`](Self::run_now) on the blocking pool with a time budget.
    pub async fn run_now_within(
        self: Arc<Self>,
        budget: Duration,
    ) -> Result<RolloverOutcome, CoreError> {
        let deadline = Instant::now() + budget;
        tokio::task::spawn_blocking(move || self.run_now(Some(deadline)))
            .await
            .map_err(|e| CoreError::Custom(format!("rollover task failed: {e}")))?
    }

    fn fold(&self, deadline: Option<Instant>) -> Result<RolloverOutcome, CoreError> {
        let db = self.db.lock()?;
        check_deadline(deadline)?;

        let now = self.clock.now();
        let date = local_day(now, self.policy.tz);
        let records = db.query_records(day_range(date, self.policy.tz))?;
        let records_folded = records.len();
        let mut events = Vec::new();
        let mut summary = None;
        let mut purged = Vec::new();

        if records.is_empty() {
            tracing::info!(%date, "no records for today, skipping summary");
            events.push(Event::RolloverSkipped {
                date,
                reason: "no records for the day".into(),
                at: now,
            });
        } else {
            let levels = gauge::score(&records);
            let (created, removed) = db.with_transaction(|db| {
                let prevent_count = db.prevent_tally(date)?;
                let created = DailySummary {
                    date,
                    levels,
                    prevent_count,
                    prevent_success: prevent_count >= self.policy.success_threshold,
                };
                db.create_summary(&created)?;
                db.delete_records(&records)?;
                let removed = db.enforce_summary_retention(self.policy.retention)?;
                check_deadline(deadline)?;
                Ok((created, removed))
            })?;

            tracing::info!(
                %date,
                records = records_folded,
                prevent_count = created.prevent_count,
                success = created.prevent_success,
                "daily summary created"
            );
            events.push(Event::SummaryCreated {
                date,
                levels: created.levels,
                prevent_count: created.prevent_count,
                prevent_success: created.prevent_success,
                records_folded,
                at: now,
            });

            purged = removed.into_iter().map(|s| s.date).collect();
            if !purged.is_empty() {
                tracing::info!(count = purged.len(), "old summaries purged");
                events.push(Event::SummariesPurged {
                    dates: purged.clone(),
                    at: now,
                });
            }
            summary = Some(created);
        }

        // The fold is committed by now, so a badge failure is reported
        // alongside the outcome instead of replacing it.
        let (badges, badge_error) = match self.badges.evaluate(&db, now) {
            Ok(report) => {
                events.extend(report.events.iter().cloned());
                (Some(report), None)
            }
            Err(e) => {
                tracing::error!(%date, error = %e, "badge evaluation failed after fold");
                (None, Some(e.to_string()))
            }
        };

        Ok(RolloverOutcome {
            date,
            summary,
            records_folded,
            purged,
            badges,
            badge_error,
            events,
        })
    }

    /// Arm, sleep, fire, repeat until `shutdown` flips to true or its sender
    /// is dropped. Fold failures are logged and the loop carries on with the
    /// next day.
    pub async fn run(
        self: Arc<Self>,
        mut shutdown: watch::Receiver<bool>,
        events: Option<mpsc::UnboundedSender<Event>>,
    ) {
        let emit = |event: Event| {
            if let Some(tx) = &events {
                let _ = tx.send(event);
            }
        };

        loop {
            if *shutdown.borrow() {
                break;
            }

            let armed = self.arm();
            let Event::RolloverArmed { fire_at, .. } = &armed else {
                break;
            };
            let fire_at = *fire_at;
            emit(armed);

            let delay = (fire_at - self.clock.now()).to_std().unwrap_or_default();
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            // Woke early relative to the injected clock; arm again.
            if self.clock.now() < fire_at {
                continue;
            }

            match self.fire() {
                Ok(outcome) => outcome.events.into_iter().for_each(&emit),
                Err(e) if e.is_transient() => {
                    tracing::warn!(error = %e, "daily rollover failed, next day retries")
                }
                Err(e) => tracing::error!(error = %e, "daily rollover failed"),
            }
        }

        tracing::debug!("rollover loop stopped");
    }
}

fn check_deadline(deadline: Option<Instant>) -> Result<(), CoreError> {
    match deadline {
        Some(deadline) if Instant::now() >= deadline => Err(CoreError::DeadlineExceeded {
            operation: "rollover".into(),
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, TokioClock};
    use crate::daily::BadgeKind;
    use crate::gauge::GaugeLevels;
    use crate::storage::Database;
    use chrono::Duration as ChronoDuration;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn day(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn rollover_at(now: DateTime<Utc>) -> (SharedDb, Arc<ManualClock>, DailyRollover) {
        let db = Database::open_memory().unwrap().into_shared();
        let clock = Arc::new(ManualClock::new(now));
        let rollover = DailyRollover::new(db.clone(), clock.clone(), RolloverPolicy::default());
        (db, clock, rollover)
    }

    #[test]
    fn next_fire_is_today_before_fire_time() {
        // 17:00 JST
        let now = utc("2025-06-01T08:00:00Z");
        let next = next_fire_after(now, &RolloverPolicy::default());
        assert_eq!(next, utc("2025-06-01T09:00:00Z"));
    }

    #[test]
    fn next_fire_is_tomorrow_once_passed() {
        let policy = RolloverPolicy::default();
        // 18:30 JST
        let now = utc("2025-06-01T09:30:00Z");
        let next = next_fire_after(now, &policy);
        assert_eq!(next, utc("2025-06-02T09:00:00Z"));
        assert!(next > now);

        // Exactly at fire time is not a valid next fire
        let at_fire = utc("2025-06-01T09:00:00Z");
        assert_eq!(next_fire_after(at_fire, &policy), utc("2025-06-02T09:00:00Z"));
    }

    #[test]
    fn fire_folds_records_into_summary() {
        // 18:00 JST
        let now = utc("2025-06-01T09:00:00Z");
        let (db, _clock, rollover) = rollover_at(now);
        {
            let db = db.lock().unwrap();
            for i in 0..3 {
                db.append_record(now - ChronoDuration::hours(i + 1), 1.0, 0.5).unwrap();
            }
            // Yesterday's record stays
            db.append_record(now - ChronoDuration::days(1), 1.0, 0.5).unwrap();
            for _ in 0..10 {
                db.increment_prevent_tally(day("2025-06-01")).unwrap();
            }
        }

        let outcome = rollover.fire().unwrap();
        let summary = outcome.summary.unwrap();
        assert_eq!(summary.date, day("2025-06-01"));
        assert_eq!(summary.prevent_count, 10);
        assert!(summary.prevent_success);
        assert_eq!(outcome.records_folded, 3);
        assert_eq!(db.lock().unwrap().count_records().unwrap(), 1);
        assert!(matches!(rollover.state(), RolloverState::Idle { next_fire } if next_fire == utc("2025-06-02T09:00:00Z")));
    }

    #[test]
    fn empty_day_creates_no_summary() {
        let now = utc("2025-06-01T09:00:00Z");
        let (db, _clock, rollover) = rollover_at(now);
        let outcome = rollover.fire().unwrap();
        assert!(outcome.summary.is_none());
        assert!(matches!(outcome.events[0], Event::RolloverSkipped { .. }));
        assert!(db.lock().unwrap().query_summaries_desc().unwrap().is_empty());
    }

    #[test]
    fn expired_deadline_leaves_records_untouched() {
        let now = utc("2025-06-01T09:00:00Z");
        let (db, _clock, rollover) = rollover_at(now);
        db.lock()
            .unwrap()
            .append_record(now - ChronoDuration::hours(1), 1.0, 0.5)
            .unwrap();

        let result = rollover.run_now(Some(Instant::now()));
        assert!(matches!(result, Err(CoreError::DeadlineExceeded { .. })));
        let db = db.lock().unwrap();
        assert_eq!(db.count_records().unwrap(), 1);
        assert!(db.query_summaries_desc().unwrap().is_empty());
    }

    #[test]
    fn second_fold_on_same_day_rolls_back() {
        let now = utc("2025-06-01T09:00:00Z");
        let (db, clock, rollover) = rollover_at(now);
        db.lock()
            .unwrap()
            .append_record(now - ChronoDuration::hours(1), 1.0, 0.5)
            .unwrap();
        rollover.run_now(None).unwrap();

        clock.advance(ChronoDuration::minutes(30));
        db.lock()
            .unwrap()
            .append_record(clock.now() - ChronoDuration::minutes(1), 2.0, 1.0)
            .unwrap();
        assert!(rollover.run_now(None).is_err());
        assert_eq!(db.lock().unwrap().count_records().unwrap(), 1);
    }

    #[test]
    fn run_now_does_not_touch_arm_state() {
        let now = utc("2025-06-01T05:00:00Z");
        let (_db, clock, rollover) = rollover_at(now);
        let before = rollover.state();
        clock.advance(ChronoDuration::days(2));
        rollover.run_now(None).unwrap();
        assert_eq!(rollover.state(), before);
    }

    #[test]
    fn retention_keeps_seven_after_eighth_summary() {
        let now = utc("2025-06-08T09:00:00Z");
        let (db, _clock, rollover) = rollover_at(now);
        {
            let db = db.lock().unwrap();
            for d in 1..=7 {
                db.create_summary(&DailySummary {
                    date: day(&format!("2025-05-2{d}")),
                    levels: GaugeLevels::default(),
                    prevent_count: 0,
                    prevent_success: false,
                })
                .unwrap();
            }
            db.append_record(now - ChronoDuration::hours(2), 1.0, 0.0).unwrap();
        }

        let outcome = rollover.fire().unwrap();
        assert_eq!(outcome.purged, vec![day("2025-05-21")]);
        let remaining = db.lock().unwrap().query_summaries_desc().unwrap();
        assert_eq!(remaining.len(), 7);
        assert_eq!(remaining[0].date, day("2025-06-08"));
    }

    #[test]
    fn fold_evaluates_badges() {
        let now = utc("2025-06-03T09:00:00Z");
        let (db, _clock, rollover) = rollover_at(now);
        {
            let db = db.lock().unwrap();
            for d in ["2025-06-01", "2025-06-02"] {
                db.create_summary(&DailySummary {
                    date: day(d),
                    levels: GaugeLevels::default(),
                    prevent_count: 10,
                    prevent_success: true,
                })
                .unwrap();
            }
            db.append_record(now - ChronoDuration::hours(2), 1.0, 0.0).unwrap();
            for _ in 0..10 {
                db.increment_prevent_tally(day("2025-06-03")).unwrap();
            }
        }

        let outcome = rollover.fire().unwrap();
        let badges = outcome.badges.unwrap();
        assert_eq!(badges.streak, 3);
        assert_eq!(badges.held, vec![BadgeKind::Beginner]);
    }

    #[test]
    fn fold_handles_more_records_than_sqlite_binds_per_statement() {
        // 18:00 JST
        let now = utc("2025-06-01T09:00:00Z");
        let (db, _clock, rollover) = rollover_at(now);
        {
            let db = db.lock().unwrap();
            let morning = utc("2025-06-01T01:00:00Z");
            db.with_transaction(|db| {
                for i in 0..40_000 {
                    db.append_record(morning + ChronoDuration::milliseconds(i), 1.0, 0.5)?;
                }
                Ok(())
            })
            .unwrap();
        }

        let outcome = rollover.fire().unwrap();
        assert_eq!(outcome.records_folded, 40_000);
        assert!(outcome.summary.is_some());
        assert_eq!(db.lock().unwrap().count_records().unwrap(), 0);
    }

    #[test]
    fn badge_failure_after_commit_still_reports_the_fold() {
        let now = utc("2025-06-01T09:00:00Z");
        let (db, _clock, rollover) = rollover_at(now);
        {
            let db = db.lock().unwrap();
            db.append_record(now - ChronoDuration::hours(2), 1.0, 0.5).unwrap();
            db.conn().execute_batch("DROP TABLE badges").unwrap();
        }

        let outcome = rollover.run_now(None).unwrap();
        assert!(outcome.summary.is_some());
        assert!(outcome.badges.is_none());
        assert!(outcome.badge_error.is_some());
        let db = db.lock().unwrap();
        assert!(db.summary_for(day("2025-06-01")).unwrap().is_some());
        assert_eq!(db.count_records().unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn loop_fires_at_fire_time_and_stops_on_shutdown() {
        // 17:59 JST
        let base = utc("2025-06-01T08:59:00Z");
        let db = Database::open_memory().unwrap().into_shared();
        db.lock()
            .unwrap()
            .append_record(base - ChronoDuration::hours(1), 1.0, 0.5)
            .unwrap();
        let clock = Arc::new(TokioClock::starting_at(base));
        let rollover = Arc::new(DailyRollover::new(db.clone(), clock, RolloverPolicy::default()));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(rollover.clone().run(shutdown_rx, Some(events_tx)));

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(db
            .lock()
            .unwrap()
            .summary_for(day("2025-06-01"))
            .unwrap()
            .is_some());

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        let mut seen_summary = false;
        while let Ok(event) = events_rx.try_recv() {
            seen_summary |= matches!(event, Event::SummaryCreated { .. });
        }
        assert!(seen_summary);
        assert!(matches!(rollover.state(), RolloverState::Idle { next_fire } if next_fire == utc("2025-06-02T09:00:00Z")));
    }
}
