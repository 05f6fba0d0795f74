//! Integration tests for the daily cycle.
//!
//! Samples go through the ingestion pipeline, the rollover folds each day
//! and badges follow the resulting streak.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use uvhero_core::daily::{DailyRollover, RolloverPolicy};
use uvhero_core::sensor::{Ingestor, PreventionDetector, Sample, WindowAggregator};
use uvhero_core::{ActiveWindow, BadgeKind, Clock, Database, Event, ManualClock, SharedDb};

fn utc(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

fn pipeline(db: &SharedDb, clock: &Arc<ManualClock>) -> Ingestor {
    let tz = chrono_tz::Asia::Tokyo;
    Ingestor::new(
        WindowAggregator::new(ActiveWindow::default(), Duration::from_secs(300)),
        PreventionDetector::new(Duration::from_secs(60), tz),
        10,
        db.clone(),
        clock.clone(),
    )
}

/// Feed one protected sample every two minutes from 10:00 to 12:00 JST on
/// the clock's current day.
fn protected_morning(ingestor: &mut Ingestor, clock: &ManualClock, day: NaiveDate) -> Vec<Event> {
    // 10:00 JST is 01:00 UTC on the same date
    let start = day.and_hms_opt(1, 0, 0).unwrap().and_utc();
    clock.set(start);
    let mut events = Vec::new();
    for _ in 0..60 {
        let sample = Sample::new(clock.now(), 6.0, 0.4);
        events.extend(ingestor.handle(&sample).unwrap());
        clock.advance(ChronoDuration::minutes(2));
    }
    events
}

#[test]
fn test_day_of_samples_folds_into_summary() {
    let db = Database::open_memory().unwrap().into_shared();
    let clock = Arc::new(ManualClock::new(utc("2025-06-01T01:00:00Z")));
    let mut ingestor = pipeline(&db, &clock);
    let day = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();

    let events = protected_morning(&mut ingestor, &clock, day);
    let commits = events
        .iter()
        .filter(|e| matches!(e, Event::RecordCommitted { .. }))
        .count();
    // First sample commits, then every 300s on a 120s cadence: 0, 6, 12 ... minutes
    assert_eq!(commits, 20);
    assert_eq!(db.lock().unwrap().prevent_tally(day).unwrap(), 60);

    // 18:00 JST
    clock.set(utc("2025-06-01T09:00:00Z"));
    let rollover = DailyRollover::new(db.clone(), clock.clone(), RolloverPolicy::default());
    let outcome = rollover.fire().unwrap();

    let summary = outcome.summary.unwrap();
    assert_eq!(summary.date, day);
    assert_eq!(summary.prevent_count, 60);
    assert!(summary.prevent_success);
    assert_eq!(outcome.records_folded, 20);
    assert_eq!(db.lock().unwrap().count_records().unwrap(), 0);
}

#[test]
fn test_prevention_after_rollover_updates_todays_summary() {
    let db = Database::open_memory().unwrap().into_shared();
    let clock = Arc::new(ManualClock::new(utc("2025-06-01T01:00:00Z")));
    let mut ingestor = pipeline(&db, &clock);
    ingestor.handle(&Sample::new(clock.now(), 6.0, 0.4)).unwrap();

    clock.set(utc("2025-06-01T08:59:00Z"));
    let rollover = DailyRollover::new(db.clone(), clock.clone(), RolloverPolicy::default());
    rollover.run_now(None).unwrap();

    // 17:59:30 JST, still inside the window and past the cooldown
    clock.set(utc("2025-06-01T08:59:30Z"));
    ingestor.handle(&Sample::new(clock.now(), 6.0, 0.4)).unwrap();

    let day = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
    let summary = db.lock().unwrap().summary_for(day).unwrap().unwrap();
    assert_eq!(summary.prevent_count, 2);
}

#[test]
fn test_week_of_successful_days_earns_both_badges() {
    let db = Database::open_memory().unwrap().into_shared();
    let clock = Arc::new(ManualClock::new(utc("2025-06-01T01:00:00Z")));
    let mut ingestor = pipeline(&db, &clock);
    let rollover = DailyRollover::new(db.clone(), clock.clone(), RolloverPolicy::default());
    let first = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();

    let mut granted = Vec::new();
    for offset in 0..8 {
        let day = first + ChronoDuration::days(offset);
        protected_morning(&mut ingestor, &clock, day);
        // 18:00 JST
        clock.set(day.and_hms_opt(9, 0, 0).unwrap().and_utc());
        let outcome = rollover.fire().unwrap();
        for event in outcome.events {
            if let Event::BadgeGranted { badge, streak, .. } = event {
                granted.push((badge, streak));
            }
        }
    }

    assert_eq!(
        granted,
        vec![(BadgeKind::Beginner, 3), (BadgeKind::Master, 7)]
    );
    let db = db.lock().unwrap();
    assert_eq!(db.query_badges(None).unwrap().len(), 2);
    // Eight days folded, seven kept
    let summaries = db.query_summaries_desc().unwrap();
    assert_eq!(summaries.len(), 7);
    assert_eq!(summaries[0].date, first + ChronoDuration::days(7));
}

#[test]
fn test_missed_day_revokes_badges() {
    let db = Database::open_memory().unwrap().into_shared();
    let clock = Arc::new(ManualClock::new(utc("2025-06-01T01:00:00Z")));
    let mut ingestor = pipeline(&db, &clock);
    let rollover = DailyRollover::new(db.clone(), clock.clone(), RolloverPolicy::default());
    let first = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();

    for offset in 0..3 {
        let day = first + ChronoDuration::days(offset);
        protected_morning(&mut ingestor, &clock, day);
        clock.set(day.and_hms_opt(9, 0, 0).unwrap().and_utc());
        rollover.fire().unwrap();
    }
    assert_eq!(
        db.lock().unwrap().query_badges(Some(BadgeKind::Beginner)).unwrap().len(),
        1
    );

    // Day 4 has data but no protection
    let day = first + ChronoDuration::days(3);
    clock.set(day.and_hms_opt(1, 0, 0).unwrap().and_utc());
    ingestor.handle(&Sample::new(clock.now(), 0.0, 3.0)).unwrap();
    clock.set(day.and_hms_opt(9, 0, 0).unwrap().and_utc());
    let outcome = rollover.fire().unwrap();

    assert_eq!(outcome.badges.unwrap().streak, 0);
    assert!(outcome
        .events
        .iter()
        .any(|e| matches!(e, Event::BadgeRevoked { badge: BadgeKind::Beginner, .. })));
    assert!(db.lock().unwrap().query_badges(None).unwrap().is_empty());
}
