//! Windowed maximum aggregation.
//!
//! The aggregator keeps the running maximum of each channel and writes it out
//! as one [`AggregatedRecord`] once the commit interval has elapsed since the
//! previous commit. The very first accepted sample commits immediately so a
//! fresh session shows up in the history right away.
//!
//! ## State Transitions
//!
//! ```text
//! Empty -(accepted sample)-> commit -> Accumulating -(interval elapsed + sample)-> commit
//! ```
//!
//! Commits happen only when a sample arrives; the interval is a lower bound.

use std::time::Duration;

use chrono::{DateTime, Utc};

use super::{AggregatedRecord, Sample};
use crate::error::DatabaseError;
use crate::events::Event;
use crate::storage::Database;
use crate::window::ActiveWindow;

pub const DEFAULT_COMMIT_INTERVAL_SECS: u64 = 300;

/// What `ingest` did with a sample.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// Outside the active window. Nothing changed.
    Discarded,
    /// Folded into the running maxima.
    Accumulated,
    /// Folded and the bucket was written out.
    Committed(AggregatedRecord),
}

impl IngestOutcome {
    pub fn event(&self) -> Option<Event> {
        match self {
            IngestOutcome::Committed(record) => Some(Event::RecordCommitted {
                record_id: record.id,
                max_outer: record.max_outer,
                max_inner: record.max_inner,
                at: record.timestamp,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WindowAggregator {
    window: ActiveWindow,
    commit_interval: Duration,
    max_outer: f64,
    max_inner: f64,
    last_commit: Option<DateTime<Utc>>,
}

impl WindowAggregator {
    pub fn new(window: ActiveWindow, commit_interval: Duration) -> Self {
        Self {
            window,
            commit_interval,
            max_outer: 0.0,
            max_inner: 0.0,
            last_commit: None,
        }
    }

    pub fn window(&self) -> &ActiveWindow {
        &self.window
    }

    pub fn max_outer(&self) -> f64 {
        self.max_outer
    }

    pub fn max_inner(&self) -> f64 {
        self.max_inner
    }

    pub fn last_commit(&self) -> Option<DateTime<Utc>> {
        self.last_commit
    }

    /// Whether a sample accepted at `now` closes the current bucket.
    pub fn commit_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_commit {
            None => true,
            Some(last) => (now - last)
                .to_std()
                .map(|elapsed| elapsed >= self.commit_interval)
                .unwrap_or(false),
        }
    }

    /// Feed one sample received at `now`.
    ///
    /// On a failed write the maxima and `last_commit` are left as they were,
    /// so the next sample retries the commit without losing the peak.
    pub fn ingest(
        &mut self,
        sample: &Sample,
        now: DateTime<Utc>,
        store: &Database,
    ) -> Result<IngestOutcome, DatabaseError> {
        if !self.window.is_active(now) {
            return Ok(IngestOutcome::Discarded);
        }

        self.max_outer = self.max_outer.max(sample.outer_value);
        self.max_inner = self.max_inner.max(sample.inner_value);

        if !self.commit_due(now) {
            return Ok(IngestOutcome::Accumulated);
        }

        let record = store.append_record(now, self.max_outer, self.max_inner)?;
        tracing::info!(
            record_id = record.id,
            max_outer = record.max_outer,
            max_inner = record.max_inner,
            "bucket committed"
        );

        self.last_commit = Some(now);
        self.max_outer = 0.0;
        self.max_inner = 0.0;
        Ok(IngestOutcome::Committed(record))
    }
}
