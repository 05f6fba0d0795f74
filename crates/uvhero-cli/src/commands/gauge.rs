use chrono::Utc;
use clap::Subcommand;
use serde::Serialize;
use uvhero_core::daily::{display_levels, DisplayLevels};
use uvhero_core::gauge::{self, Advice};
use uvhero_core::Config;

use super::{open_db, print_json, CliResult};

#[derive(Subcommand)]
pub enum GaugeAction {
    /// Levels to display right now, with advice
    Show,
}

#[derive(Serialize)]
struct GaugeView {
    #[serde(flatten)]
    shown: DisplayLevels,
    /// Only given while the active window is open
    advice: Option<&'static str>,
    remark: &'static str,
}

pub fn run(action: GaugeAction) -> CliResult {
    match action {
        GaugeAction::Show => {
            let config = Config::load()?;
            let policy = config.rollover_policy()?;
            let window = config.active_window()?;
            let db = open_db()?;
            let db = db.lock().map_err(|_| "database handle poisoned")?;
            let now = Utc::now();

            let shown = display_levels(&db, now, &policy)?;
            let advice = window
                .is_active(now)
                .then(|| Advice::for_levels(&shown.levels).message());
            print_json(&GaugeView {
                remark: gauge::praise(shown.prevent_count),
                advice,
                shown,
            })?;
        }
    }
    Ok(())
}
