use chrono::Utc;
use clap::Subcommand;
use uvhero_core::clock::local_day;
use uvhero_core::{Config, Event};

use super::{open_db, print_json, CliResult};

#[derive(Subcommand)]
pub enum PreventAction {
    /// Today's prevention count
    Show,
    /// Count one prevention for today by hand
    Add,
}

pub fn run(action: PreventAction) -> CliResult {
    let config = Config::load()?;
    let tz = config.tz()?;
    let threshold = config.rollover.success_threshold;
    let db = open_db()?;
    let db = db.lock().map_err(|_| "database handle poisoned")?;
    let now = Utc::now();
    let day = local_day(now, tz);

    match action {
        PreventAction::Show => {
            let count = db.prevent_tally(day)?;
            print_json(&serde_json::json!({
                "day": day,
                "count": count,
                "success": count >= threshold,
            }))?;
        }
        PreventAction::Add => {
            let count = db.with_transaction(|db| {
                let count = db.increment_prevent_tally(day)?;
                db.update_summary_prevention(day, count, count >= threshold)?;
                Ok(count)
            })?;
            print_json(&Event::PreventionCounted {
                day,
                count,
                at: now,
            })?;
        }
    }
    Ok(())
}
