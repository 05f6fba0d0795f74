use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::Subcommand;
use uvhero_core::daily::{next_fire_after, DailyRollover};
use uvhero_core::{Config, SystemClock};

use super::{open_db, print_json, runtime, CliResult};

#[derive(Subcommand)]
pub enum RolloverAction {
    /// Fold today's records into a summary immediately
    RunNow {
        /// Give up without writing anything after this many seconds
        #[arg(long)]
        deadline_secs: Option<u64>,
    },
    /// When the scheduled rollover fires next
    Next,
}

pub fn run(action: RolloverAction) -> CliResult {
    let config = Config::load()?;
    let policy = config.rollover_policy()?;

    match action {
        RolloverAction::RunNow { deadline_secs } => {
            let budget = deadline_secs
                .map(Duration::from_secs)
                .unwrap_or_else(|| config.run_now_deadline());
            let rollover = Arc::new(DailyRollover::new(open_db()?, Arc::new(SystemClock), policy));
            let outcome = runtime()?.block_on(rollover.run_now_within(budget))?;
            print_json(&outcome)?;
        }
        RolloverAction::Next => {
            let now = Utc::now();
            let fire_at = next_fire_after(now, &policy);
            print_json(&serde_json::json!({
                "fire_at": fire_at,
                "local": fire_at.with_timezone(&policy.tz).to_rfc3339(),
                "delay_secs": (fire_at - now).num_seconds(),
            }))?;
        }
    }
    Ok(())
}
