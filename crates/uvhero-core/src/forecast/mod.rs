//! UV forecast: per-city fixed daily maxima and the live fetch around them.
//!
//! A fixed value is only valid on the local day it was fixed. After midnight
//! it reads as absent until a new value is written for the new day.

mod client;
mod service;

pub use client::{UvForecastClient, UvReading, UvSource};
pub use service::{
    FixFailure, FixReport, ForecastDisplay, ForecastService, MaxSource, RefreshOutcome,
};

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::clock::same_local_day;

/// A city the forecast can be fetched for.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct City {
    pub name: &'static str,
    pub lat: f64,
    pub lng: f64,
}

pub const CITIES: [City; 8] = [
    City { name: "Tokyo", lat: 35.6895, lng: 139.6917 },
    City { name: "Osaka", lat: 34.6937, lng: 135.5023 },
    City { name: "Nagoya", lat: 35.1815, lng: 136.9066 },
    City { name: "Sapporo", lat: 43.0618, lng: 141.3545 },
    City { name: "Fukuoka", lat: 33.5902, lng: 130.4017 },
    City { name: "Sendai", lat: 38.2682, lng: 140.8694 },
    City { name: "Hiroshima", lat: 34.3853, lng: 132.4553 },
    City { name: "Kobe", lat: 34.6901, lng: 135.1955 },
];

/// Look up a city by name, ignoring ASCII case.
pub fn city(name: &str) -> Option<&'static City> {
    CITIES.iter().find(|c| c.name.eq_ignore_ascii_case(name))
}

/// Today's fixed maximum for one city.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixedValue {
    pub city: String,
    pub value: f64,
    pub fixed_at: DateTime<Utc>,
}

impl FixedValue {
    pub fn new(city: impl Into<String>, value: f64, fixed_at: DateTime<Utc>) -> Self {
        Self {
            city: city.into(),
            value,
            fixed_at,
        }
    }
}

/// Day-scoped fixed values, at most one per city.
#[derive(Debug, Clone)]
pub struct FixedValueCache {
    tz: Tz,
    entries: HashMap<String, FixedValue>,
}

impl FixedValueCache {
    pub fn new(tz: Tz) -> Self {
        Self {
            tz,
            entries: HashMap::new(),
        }
    }

    /// Rebuild from persisted values. Stale ones are kept until the next
    /// sweep; [`get`](Self::get) already ignores them.
    pub fn from_entries(tz: Tz, values: impl IntoIterator<Item = FixedValue>) -> Self {
        Self {
            tz,
            entries: values.into_iter().map(|v| (v.city.clone(), v)).collect(),
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &FixedValue> {
        self.entries.values()
    }

    /// Value fixed for `city` today, if any.
    pub fn get(&self, city: &str, now: DateTime<Utc>) -> Option<&FixedValue> {
        self.entries
            .get(city)
            .filter(|v| same_local_day(v.fixed_at, now, self.tz))
    }

    /// Drop every entry fixed on another day. Returns the cities removed,
    /// sorted.
    pub fn reset_stale_entries(&mut self, now: DateTime<Utc>) -> Vec<String> {
        let tz = self.tz;
        let mut removed: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, v)| !same_local_day(v.fixed_at, now, tz))
            .map(|(city, _)| city.clone())
            .collect();
        for city in &removed {
            self.entries.remove(city);
        }
        removed.sort();
        removed
    }

    /// Fix `value` for `city` unless a value for today already exists.
    /// Returns the written entry, or `None` when today's value was kept.
    pub fn set_if_absent(
        &mut self,
        city: &str,
        value: f64,
        now: DateTime<Utc>,
    ) -> Option<FixedValue> {
        if self.get(city, now).is_some() {
            return None;
        }
        Some(self.set_authoritative(city, value, now))
    }

    /// Overwrite `city`'s value unconditionally.
    pub fn set_authoritative(&mut self, city: &str, value: f64, now: DateTime<Utc>) -> FixedValue {
        let fixed = FixedValue::new(city, value, now);
        self.entries.insert(city.to_string(), fixed.clone());
        fixed
    }
}
