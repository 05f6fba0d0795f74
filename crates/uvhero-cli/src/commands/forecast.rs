use clap::Subcommand;
use uvhero_core::forecast::CITIES;
use uvhero_core::Config;

use super::{forecast_service, open_db, print_json, runtime, CliResult};

#[derive(Subcommand)]
pub enum ForecastAction {
    /// Fetch the UV index for a city and show what the display would
    Refresh {
        /// City name; defaults to the configured one
        #[arg(long)]
        city: Option<String>,
    },
    /// Fetch and fix today's maximum for every known city
    FixAll,
    /// Show the fixed value without fetching
    Show {
        #[arg(long)]
        city: Option<String>,
    },
    /// Known cities and their coordinates
    Cities,
}

pub fn run(action: ForecastAction) -> CliResult {
    match action {
        ForecastAction::Refresh { city } => {
            let config = Config::load()?;
            let service = forecast_service(&config, open_db()?, city.as_deref())?;
            let outcome = runtime()?.block_on(service.refresh_selected())?;
            print_json(&outcome)?;
        }
        ForecastAction::FixAll => {
            let config = Config::load()?;
            let service = forecast_service(&config, open_db()?, None)?;
            let report = runtime()?.block_on(service.fix_all_cities())?;
            print_json(&report)?;
        }
        ForecastAction::Show { city } => {
            let config = Config::load()?;
            let service = forecast_service(&config, open_db()?, city.as_deref())?;
            print_json(&service.show()?)?;
        }
        ForecastAction::Cities => {
            print_json(&CITIES)?;
        }
    }
    Ok(())
}
