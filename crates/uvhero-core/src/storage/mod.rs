mod config;
pub mod database;

pub use config::{AggregationConfig, Config, ForecastConfig, RolloverSettings, WindowConfig};
pub use database::{Database, PreventTally, SharedDb};

use std::path::PathBuf;

/// Returns `~/.config/uvhero[-dev]/` based on UVHERO_ENV.
///
/// Set UVHERO_ENV=dev to use the development data directory. UVHERO_DATA_DIR
/// overrides the location entirely.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> std::io::Result<PathBuf> {
    if let Ok(dir) = std::env::var("UVHERO_DATA_DIR") {
        let dir = PathBuf::from(dir);
        std::fs::create_dir_all(&dir)?;
        return Ok(dir);
    }

    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("UVHERO_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("uvhero-dev")
    } else {
        base_dir.join("uvhero")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
