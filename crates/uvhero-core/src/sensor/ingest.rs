//! Ingestion pipeline.
//!
//! The sensor link pushes decoded samples into a channel; a single consumer
//! drains it and feeds the aggregator and the prevention detector while
//! holding the store lock, so a rollover fold can never observe half of an
//! ingestion step.

use std::sync::Arc;

use tokio::sync::mpsc;

use super::{IngestOutcome, PreventionDetector, Sample, WindowAggregator};
use crate::clock::Clock;
use crate::error::CoreError;
use crate::events::Event;
use crate::storage::SharedDb;

pub struct Ingestor {
    aggregator: WindowAggregator,
    detector: PreventionDetector,
    success_threshold: u32,
    db: SharedDb,
    clock: Arc<dyn Clock>,
}

impl Ingestor {
    pub fn new(
        aggregator: WindowAggregator,
        detector: PreventionDetector,
        success_threshold: u32,
        db: SharedDb,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            aggregator,
            detector,
            success_threshold,
            db,
            clock,
        }
    }

    pub fn aggregator(&self) -> &WindowAggregator {
        &self.aggregator
    }

    /// Process one sample at the clock's current instant.
    pub fn handle(&mut self, sample: &Sample) -> Result<Vec<Event>, CoreError> {
        let now = self.clock.now();
        let db = self.db.lock()?;

        let outcome = self.aggregator.ingest(sample, now, &db)?;
        if outcome == IngestOutcome::Discarded {
            return Ok(Vec::new());
        }

        let mut events: Vec<Event> = outcome.event().into_iter().collect();
        if let Some(event) = self
            .detector
            .observe(sample, now, &db, self.success_threshold)?
        {
            events.push(event);
        }
        Ok(events)
    }
}

/// Drain `rx` until every sender is dropped.
///
/// Store failures are logged and the loop moves on to the next sample; the
/// aggregator keeps its maxima so the next commit still carries them.
/// Returns the number of samples consumed.
pub async fn run_ingest(
    mut ingestor: Ingestor,
    mut rx: mpsc::Receiver<Sample>,
    events: Option<mpsc::UnboundedSender<Event>>,
) -> usize {
    let mut consumed = 0;
    while let Some(sample) = rx.recv().await {
        consumed += 1;
        match ingestor.handle(&sample) {
            Ok(produced) => {
                if let Some(tx) = &events {
                    for event in produced {
                        let _ = tx.send(event);
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to ingest sample"),
        }
    }
    tracing::info!(consumed, "sensor feed closed");
    consumed
}
