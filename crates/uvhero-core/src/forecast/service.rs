//! Forecast refresh and the daily fix.
//!
//! Inside the active window the selected city is fetched live. Before the fix
//! hour the live maximum is shown as is; from the fix hour on, the day's fixed
//! value is shown, and the first live fetch of the day fills it in if the
//! scheduled fix has not run yet. Outside the window nothing is fetched and
//! only the fixed value is shown.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

use super::{city, City, FixedValue, FixedValueCache, UvReading, UvSource, CITIES};
use crate::clock::{next_daily_after, same_local_day, Clock};
use crate::error::{CoreError, FetchError, ValidationError};
use crate::events::Event;
use crate::storage::SharedDb;
use crate::window::ActiveWindow;

/// Where the displayed maximum came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaxSource {
    Live,
    Fixed,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastDisplay {
    pub city: String,
    pub current: f64,
    pub today_max: Option<f64>,
    pub max_source: MaxSource,
    /// Whether `current` comes from a fetch made by this call.
    pub fetched: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshOutcome {
    pub display: ForecastDisplay,
    pub events: Vec<Event>,
    /// Fetch failure, if the display fell back to earlier values.
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixFailure {
    pub city: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixReport {
    pub fixed: Vec<FixedValue>,
    pub failed: Vec<FixFailure>,
    pub events: Vec<Event>,
}

pub struct ForecastService<S> {
    source: S,
    db: SharedDb,
    clock: Arc<dyn Clock>,
    window: ActiveWindow,
    fix_time: NaiveTime,
    selected: &'static City,
    cache: Mutex<FixedValueCache>,
    last_live: Mutex<Option<(DateTime<Utc>, UvReading)>>,
}

impl<S: UvSource> ForecastService<S> {
    /// Build the service and load persisted fixed values into the cache.
    pub fn new(
        source: S,
        db: SharedDb,
        clock: Arc<dyn Clock>,
        window: ActiveWindow,
        fix_hour: u32,
        selected_city: &str,
    ) -> Result<Self, CoreError> {
        let selected =
            city(selected_city).ok_or_else(|| FetchError::UnknownCity(selected_city.into()))?;
        let fix_time =
            NaiveTime::from_hms_opt(fix_hour, 0, 0).ok_or_else(|| ValidationError::InvalidValue {
                field: "fix_hour".into(),
                message: format!("{fix_hour} is not an hour of the day"),
            })?;
        let stored = db.lock()?.load_fixed_values()?;
        let cache = FixedValueCache::from_entries(window.tz(), stored);

        Ok(Self {
            source,
            db,
            clock,
            window,
            fix_time,
            selected,
            cache: Mutex::new(cache),
            last_live: Mutex::new(None),
        })
    }

    pub fn selected_city(&self) -> &'static City {
        self.selected
    }

    fn cache(&self) -> MutexGuard<'_, FixedValueCache> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Drop fixed values from earlier days, in memory and in the store.
    fn sweep(&self, now: DateTime<Utc>) -> Result<Option<Event>, CoreError> {
        let mut cache = self.cache();
        let removed = cache.reset_stale_entries(now);
        if removed.is_empty() {
            return Ok(None);
        }

        let db = self.db.lock()?;
        db.with_transaction(|db| {
            for city in &removed {
                db.delete_fixed_value(city)?;
            }
            Ok(())
        })?;
        tracing::info!(cities = ?removed, "stale fixed values reset");
        Ok(Some(Event::FixedValuesReset {
            cities: removed,
            at: now,
        }))
    }

    /// What to show without fetching: today's fixed value, current reads 0.
    fn fixed_display(&self, now: DateTime<Utc>) -> ForecastDisplay {
        let today_max = self.cache().get(self.selected.name, now).map(|v| v.value);
        ForecastDisplay {
            city: self.selected.name.to_string(),
            current: 0.0,
            today_max,
            max_source: if today_max.is_some() {
                MaxSource::Fixed
            } else {
                MaxSource::Unavailable
            },
            fetched: false,
        }
    }

    /// Current display without touching the network.
    pub fn show(&self) -> Result<RefreshOutcome, CoreError> {
        let now = self.clock.now();
        let events = self.sweep(now)?.into_iter().collect();
        Ok(RefreshOutcome {
            display: self.fixed_display(now),
            events,
            error: None,
        })
    }

    /// Fetch the selected city and work out what to display.
    ///
    /// A failed fetch is not an error: the last good reading from today, or
    /// the fixed value, is shown instead and the failure is reported in
    /// [`RefreshOutcome::error`].
    pub async fn refresh_selected(&self) -> Result<RefreshOutcome, CoreError> {
        let now = self.clock.now();
        let mut events: Vec<Event> = self.sweep(now)?.into_iter().collect();

        if !self.window.is_active(now) {
            tracing::debug!("outside active window, serving fixed value");
            return Ok(RefreshOutcome {
                display: self.fixed_display(now),
                events,
                error: None,
            });
        }

        let reading = match self.source.fetch(self.selected).await {
            Ok(reading) => {
                *self.last_live.lock().unwrap_or_else(|e| e.into_inner()) = Some((now, reading));
                reading
            }
            Err(e) => {
                tracing::warn!(city = self.selected.name, error = %e, "live fetch failed, keeping last values");
                return Ok(RefreshOutcome {
                    display: self.last_good_display(now),
                    events,
                    error: Some(e.to_string()),
                });
            }
        };

        let local_time = now.with_timezone(&self.window.tz()).time();
        if local_time < self.fix_time {
            return Ok(RefreshOutcome {
                display: ForecastDisplay {
                    city: self.selected.name.to_string(),
                    current: reading.current,
                    today_max: Some(reading.today_max),
                    max_source: MaxSource::Live,
                    fetched: true,
                },
                events,
                error: None,
            });
        }

        let today_max = {
            let mut cache = self.cache();
            match cache.get(self.selected.name, now) {
                Some(fixed) => fixed.value,
                None => {
                    let fixed = FixedValue::new(self.selected.name, reading.today_max, now);
                    self.db.lock()?.upsert_fixed_value(&fixed)?;
                    cache.set_if_absent(self.selected.name, reading.today_max, now);
                    tracing::info!(city = self.selected.name, value = fixed.value, "fixed value filled from live fetch");
                    events.push(Event::ValueFixed {
                        city: fixed.city,
                        value: fixed.value,
                        authoritative: false,
                        at: now,
                    });
                    reading.today_max
                }
            }
        };

        Ok(RefreshOutcome {
            display: ForecastDisplay {
                city: self.selected.name.to_string(),
                current: reading.current,
                today_max: Some(today_max),
                max_source: MaxSource::Fixed,
                fetched: true,
            },
            events,
            error: None,
        })
    }

    fn last_good_display(&self, now: DateTime<Utc>) -> ForecastDisplay {
        let mut display = self.fixed_display(now);
        let last = *self.last_live.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((at, reading)) = last {
            if same_local_day(at, now, self.window.tz()) {
                display.current = reading.current;
                if display.today_max.is_none() {
                    display.today_max = Some(reading.today_max);
                    display.max_source = MaxSource::Live;
                }
            }
        }
        display
    }

    /// Fetch every known city and overwrite its fixed value. One city's
    /// failure does not stop the others.
    pub async fn fix_all_cities(&self) -> Result<FixReport, CoreError> {
        let now = self.clock.now();
        let mut events: Vec<Event> = self.sweep(now)?.into_iter().collect();
        let mut fixed = Vec::new();
        let mut failed = Vec::new();

        for city in CITIES.iter() {
            let result = match self.source.fetch(city).await {
                Ok(reading) => self.fix_authoritative(city.name, reading.today_max, now),
                Err(e) => Err(e.into()),
            };
            match result {
                Ok(value) => {
                    events.push(Event::ValueFixed {
                        city: value.city.clone(),
                        value: value.value,
                        authoritative: true,
                        at: now,
                    });
                    fixed.push(value);
                }
                Err(e) => {
                    tracing::warn!(city = city.name, error = %e, "could not fix value");
                    failed.push(FixFailure {
                        city: city.name.to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(fixed = fixed.len(), failed = failed.len(), "daily values fixed");
        Ok(FixReport {
            fixed,
            failed,
            events,
        })
    }

    /// Whether every known city already has a value fixed today.
    fn fixed_today(&self, now: DateTime<Utc>) -> bool {
        let cache = self.cache();
        CITIES.iter().all(|c| cache.get(c.name, now).is_some())
    }

    fn fix_authoritative(
        &self,
        city: &str,
        value: f64,
        now: DateTime<Utc>,
    ) -> Result<FixedValue, CoreError> {
        let mut cache = self.cache();
        let fixed = FixedValue::new(city, value, now);
        self.db.lock()?.upsert_fixed_value(&fixed)?;
        cache.set_authoritative(city, value, now);
        Ok(fixed)
    }

    /// Refresh the selected city every `every` until shutdown.
    pub async fn run_refresh_loop(
        self: Arc<Self>,
        every: Duration,
        mut shutdown: watch::Receiver<bool>,
        events: Option<mpsc::UnboundedSender<Event>>,
    ) where
        S: 'static,
    {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            match self.refresh_selected().await {
                Ok(outcome) => {
                    tracing::debug!(
                        city = %outcome.display.city,
                        current = outcome.display.current,
                        max = ?outcome.display.today_max,
                        "forecast refreshed"
                    );
                    forward(&events, outcome.events);
                }
                Err(e) if e.is_transient() => tracing::warn!(error = %e, "forecast refresh failed"),
                Err(e) => tracing::error!(error = %e, "forecast refresh failed"),
            }
        }

        tracing::debug!("forecast refresh loop stopped");
    }

    /// Fix all cities once a day at the fix hour until shutdown. A day on
    /// which every city is already fixed, e.g. by a manual `fix_all_cities`,
    /// is skipped without fetching.
    pub async fn run_fix_loop(
        self: Arc<Self>,
        mut shutdown: watch::Receiver<bool>,
        events: Option<mpsc::UnboundedSender<Event>>,
    ) where
        S: 'static,
    {
        loop {
            if *shutdown.borrow() {
                break;
            }

            let fire_at = next_daily_after(self.clock.now(), self.window.tz(), self.fix_time);
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

            let now = self.clock.now();
            if now < fire_at {
                continue;
            }
            if self.fixed_today(now) {
                tracing::info!("every city already fixed today, skipping scheduled fix");
                continue;
            }

            match self.fix_all_cities().await {
                Ok(report) => forward(&events, report.events),
                Err(e) if e.is_transient() => tracing::warn!(error = %e, "daily fix failed"),
                Err(e) => tracing::error!(error = %e, "daily fix failed"),
            }
        }

        tracing::debug!("forecast fix loop stopped");
    }
}

fn forward(tx: &Option<mpsc::UnboundedSender<Event>>, events: Vec<Event>) {
    if let Some(tx) = tx {
        for event in events {
            let _ = tx.send(event);
        }
    }
}
