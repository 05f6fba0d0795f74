use clap::Subcommand;
use uvhero_core::Config;

use super::{print_json, CliResult};

const API_KEY: &str = "forecast.api_key";
const MASK: &str = "********";

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Get a config value
    Get {
        /// Dot path, e.g. "timezone", "window.start_hour", "rollover.fire_hour",
        /// "forecast.selected_city"
        key: String,
    },
    /// Set a config value; hours, timezone and endpoint are validated first
    Set {
        /// Dot path, e.g. "rollover.retention_days"
        key: String,
        /// New value
        value: String,
    },
    /// List all config values (the API key is masked)
    List,
    /// Reset config to defaults
    Reset {
        /// Keep the stored forecast API key
        #[arg(long)]
        keep_api_key: bool,
    },
    /// Print the location of config.toml
    Path,
}

pub fn run(action: ConfigAction) -> CliResult {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            match config.get(&key) {
                Some(value) if key == API_KEY && !value.is_empty() => println!("{MASK}"),
                Some(value) => println!("{value}"),
                None => return Err(format!("unknown key: {key}").into()),
            }
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            tracing::info!(key = %key, "config updated");
            println!("ok");
        }
        ConfigAction::List => {
            let mut config = Config::load()?;
            if !config.forecast.api_key.is_empty() {
                config.forecast.api_key = MASK.to_string();
            }
            print_json(&config)?;
        }
        ConfigAction::Reset { keep_api_key } => {
            let mut config = Config::default();
            if keep_api_key {
                config.forecast.api_key = Config::load()?.forecast.api_key;
            }
            config.save()?;
            println!("config reset to defaults");
        }
        ConfigAction::Path => {
            println!("{}", Config::path()?.display());
        }
    }
    Ok(())
}
