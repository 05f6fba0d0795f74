//! Sensor samples, bucketed records and the ingestion pipeline.
//!
//! The wearable notifies plain-text payloads such as
//! `UVindex_out=3.2,UVindex_in=0.4,ts=1717200000`. Only the two channel keys
//! are read; anything else is ignored so newer firmware keeps working.

mod aggregator;
mod ingest;
mod prevention;

pub use aggregator::{IngestOutcome, WindowAggregator, DEFAULT_COMMIT_INTERVAL_SECS};
pub use ingest::{run_ingest, Ingestor};
pub use prevention::{
    adjusted_inner, adjusted_outer, PreventionDetector, DEFAULT_PREVENTION_COOLDOWN_SECS,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const OUTER_KEY: &str = "UVindex_out";
const INNER_KEY: &str = "UVindex_in";

/// One decoded reading. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub outer_value: f64,
    pub inner_value: f64,
}

impl Sample {
    pub fn new(timestamp: DateTime<Utc>, outer_value: f64, inner_value: f64) -> Self {
        Self {
            timestamp,
            outer_value,
            inner_value,
        }
    }

    /// Decode a `key=value,key=value` payload received at `at`.
    ///
    /// Returns `None` when neither channel is present. A missing channel reads
    /// as 0.0; malformed pairs and unknown keys are skipped.
    pub fn decode(payload: &str, at: DateTime<Utc>) -> Option<Self> {
        let mut outer = None;
        let mut inner = None;

        for component in payload.split(',') {
            let Some((key, value)) = component.split_once('=') else {
                continue;
            };
            let Ok(value) = value.trim().parse::<f64>() else {
                continue;
            };
            if !value.is_finite() {
                continue;
            }
            match key.trim() {
                OUTER_KEY => outer = Some(value),
                INNER_KEY => inner = Some(value),
                _ => {}
            }
        }

        if outer.is_none() && inner.is_none() {
            return None;
        }

        Some(Self::new(at, outer.unwrap_or(0.0), inner.unwrap_or(0.0)))
    }
}

/// A committed bucket: the per-channel maxima observed since the previous commit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AggregatedRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub max_outer: f64,
    pub max_inner: f64,
}
