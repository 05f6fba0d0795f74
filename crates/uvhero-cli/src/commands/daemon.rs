//! Long-running mode: stdin sensor feed, daily rollover and forecast loops
//! on one runtime until Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use tokio::sync::{mpsc, watch};
use uvhero_core::daily::DailyRollover;
use uvhero_core::sensor::run_ingest;
use uvhero_core::{Config, SystemClock};

use super::ingest::{build_ingestor, print_events, pump_stdin};
use super::{forecast_service, open_db, runtime, CliResult};

const CHANNEL_CAPACITY: usize = 256;

#[derive(Args)]
pub struct DaemonArgs {
    /// Skip the forecast refresh and daily fix loops
    #[arg(long)]
    pub no_forecast: bool,
}

pub fn run(args: DaemonArgs) -> CliResult {
    let config = Config::load()?;
    let db = open_db()?;
    let ingestor = build_ingestor(&config, db.clone())?;
    let rollover = Arc::new(DailyRollover::new(
        db.clone(),
        Arc::new(SystemClock),
        config.rollover_policy()?,
    ));
    let forecast = if args.no_forecast {
        None
    } else {
        Some(Arc::new(forecast_service(&config, db, None)?))
    };
    let refresh_every = Duration::from_secs(config.forecast.refresh_interval_secs);

    let rt = runtime()?;
    let result = rt.block_on(async move {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (sample_tx, sample_rx) = mpsc::channel(CHANNEL_CAPACITY);

        let printer = tokio::spawn(print_events(event_rx));
        let feed = tokio::spawn(pump_stdin(sample_tx));

        let mut tasks = vec![
            tokio::spawn({
                let events = event_tx.clone();
                async move {
                    run_ingest(ingestor, sample_rx, Some(events)).await;
                }
            }),
            tokio::spawn(rollover.run(shutdown_rx.clone(), Some(event_tx.clone()))),
        ];
        if let Some(forecast) = forecast {
            tasks.push(tokio::spawn(forecast.clone().run_refresh_loop(
                refresh_every,
                shutdown_rx.clone(),
                Some(event_tx.clone()),
            )));
            tasks.push(tokio::spawn(
                forecast.run_fix_loop(shutdown_rx.clone(), Some(event_tx.clone())),
            ));
        }
        drop(event_tx);
        tracing::info!("daemon started");

        tokio::signal::ctrl_c().await?;
        tracing::info!("shutting down");
        shutdown_tx.send(true)?;
        // Dropping the feed closes the sample channel and ends ingestion
        feed.abort();

        for task in tasks {
            task.await?;
        }
        printer.await?;
        Ok::<_, Box<dyn std::error::Error>>(())
    });

    // stdin is read on a blocking thread that never returns on its own
    rt.shutdown_timeout(Duration::from_secs(1));
    result
}
