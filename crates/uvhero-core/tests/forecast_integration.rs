//! Integration tests for fixed forecast values across restarts.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tempfile::TempDir;
use uvhero_core::forecast::{City, MaxSource};
use uvhero_core::{
    ActiveWindow, Database, FetchError, ForecastService, ManualClock, UvReading, UvSource,
};

struct SteadySource(UvReading);

impl UvSource for SteadySource {
    fn fetch(&self, _city: &City) -> impl Future<Output = Result<UvReading, FetchError>> + Send {
        let reading = self.0;
        async move { Ok(reading) }
    }
}

fn utc(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

fn open(dir: &TempDir) -> Database {
    Database::open_at(&dir.path().join("uvhero.db")).unwrap()
}

#[tokio::test]
async fn test_fixed_values_survive_restart_on_same_day() {
    let dir = TempDir::new().unwrap();
    // 09:00 JST
    let morning = utc("2025-06-01T00:00:00Z");

    {
        let service = ForecastService::new(
            SteadySource(UvReading {
                current: 1.0,
                today_max: 7.0,
            }),
            open(&dir).into_shared(),
            Arc::new(ManualClock::new(morning)),
            ActiveWindow::default(),
            9,
            "Tokyo",
        )
        .unwrap();
        let report = service.fix_all_cities().await.unwrap();
        assert_eq!(report.fixed.len(), 8);
    }

    // Restart at 13:00 JST with a source that now reports a different max
    let service = ForecastService::new(
        SteadySource(UvReading {
            current: 5.0,
            today_max: 9.5,
        }),
        open(&dir).into_shared(),
        Arc::new(ManualClock::new(morning + Duration::hours(4))),
        ActiveWindow::default(),
        9,
        "Tokyo",
    )
    .unwrap();
    let outcome = service.refresh_selected().await.unwrap();
    assert_eq!(outcome.display.current, 5.0);
    assert_eq!(outcome.display.today_max, Some(7.0));
    assert_eq!(outcome.display.max_source, MaxSource::Fixed);
}

#[tokio::test]
async fn test_values_from_previous_day_are_dropped_on_restart() {
    let dir = TempDir::new().unwrap();
    let yesterday = utc("2025-06-01T00:00:00Z");

    {
        let service = ForecastService::new(
            SteadySource(UvReading {
                current: 1.0,
                today_max: 7.0,
            }),
            open(&dir).into_shared(),
            Arc::new(ManualClock::new(yesterday)),
            ActiveWindow::default(),
            9,
            "Osaka",
        )
        .unwrap();
        service.fix_all_cities().await.unwrap();
    }

    let db = open(&dir).into_shared();
    let service = ForecastService::new(
        SteadySource(UvReading {
            current: 2.0,
            today_max: 4.0,
        }),
        db.clone(),
        // 20:00 JST the next day, outside the active window
        Arc::new(ManualClock::new(yesterday + Duration::hours(35))),
        ActiveWindow::default(),
        9,
        "Osaka",
    )
    .unwrap();
    let outcome = service.refresh_selected().await.unwrap();
    assert_eq!(outcome.display.max_source, MaxSource::Unavailable);
    assert!(outcome.display.today_max.is_none());
    assert!(db.lock().unwrap().load_fixed_values().unwrap().is_empty());
}
