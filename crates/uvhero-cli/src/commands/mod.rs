pub mod badge;
pub mod config;
pub mod daemon;
pub mod forecast;
pub mod gauge;
pub mod ingest;
pub mod prevent;
pub mod rollover;
pub mod summary;

use std::sync::Arc;

use serde::Serialize;
use uvhero_core::forecast::{ForecastService, UvForecastClient};
use uvhero_core::{Config, Database, SharedDb, SystemClock};

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

pub fn open_db() -> Result<SharedDb, Box<dyn std::error::Error>> {
    Ok(Database::open()?.into_shared())
}

pub fn print_json<T: Serialize>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// One compact JSON object per line, for streams of events.
pub fn print_json_line<T: Serialize>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

pub fn runtime() -> Result<tokio::runtime::Runtime, Box<dyn std::error::Error>> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?)
}

/// Forecast service backed by the OpenUV client, for `city` or the
/// configured one.
pub fn forecast_service(
    config: &Config,
    db: SharedDb,
    city: Option<&str>,
) -> Result<ForecastService<UvForecastClient>, Box<dyn std::error::Error>> {
    let client = UvForecastClient::new(
        &config.forecast.endpoint,
        config.api_key(),
        std::time::Duration::from_secs(config.forecast.request_timeout_secs),
    )?;
    let service = ForecastService::new(
        client,
        db,
        Arc::new(SystemClock),
        config.active_window()?,
        config.forecast.fix_hour,
        city.unwrap_or(&config.forecast.selected_city),
    )?;
    Ok(service)
}
