//! Feed sensor payloads from stdin into the ingestion pipeline.

use std::sync::Arc;

use chrono::Utc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use uvhero_core::sensor::{run_ingest, Ingestor, PreventionDetector, Sample, WindowAggregator};
use uvhero_core::{Config, Event, SharedDb, SystemClock};

use super::{open_db, print_json_line, runtime, CliResult};

const CHANNEL_CAPACITY: usize = 256;

pub fn build_ingestor(config: &Config, db: SharedDb) -> Result<Ingestor, Box<dyn std::error::Error>> {
    Ok(Ingestor::new(
        WindowAggregator::new(config.active_window()?, config.commit_interval()),
        PreventionDetector::new(config.prevention_cooldown(), config.tz()?),
        config.rollover.success_threshold,
        db,
        Arc::new(SystemClock),
    ))
}

/// Read payload lines until EOF, decoding each at its arrival time.
/// Undecodable lines are skipped with a warning.
pub async fn pump_stdin(tx: mpsc::Sender<Sample>) -> std::io::Result<usize> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut sent = 0;
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match Sample::decode(line, Utc::now()) {
            Some(sample) => {
                if tx.send(sample).await.is_err() {
                    break;
                }
                sent += 1;
            }
            None => tracing::warn!(payload = line, "ignoring payload without UV channels"),
        }
    }
    Ok(sent)
}

/// Print events as JSON lines until every sender is gone.
pub async fn print_events(mut rx: mpsc::UnboundedReceiver<Event>) {
    while let Some(event) = rx.recv().await {
        if let Err(e) = print_json_line(&event) {
            tracing::warn!(error = %e, "failed to print event");
        }
    }
}

pub fn run() -> CliResult {
    let config = Config::load()?;
    let ingestor = build_ingestor(&config, open_db()?)?;

    runtime()?.block_on(async move {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let consumer = tokio::spawn(run_ingest(ingestor, rx, Some(event_tx)));
        let printer = tokio::spawn(print_events(event_rx));

        let sent = pump_stdin(tx).await?;
        let consumed = consumer.await?;
        printer.await?;
        tracing::debug!(sent, consumed, "ingest finished");
        Ok::<_, Box<dyn std::error::Error>>(())
    })?;
    Ok(())
}
