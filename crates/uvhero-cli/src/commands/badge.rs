use chrono::Utc;
use clap::Subcommand;
use uvhero_core::daily::{self, BadgeEvaluator};

use super::{open_db, print_json, CliResult};

#[derive(Subcommand)]
pub enum BadgeAction {
    /// Badges currently held
    List,
    /// Recompute the streak and grant or revoke badges
    Evaluate,
    /// Current streak of successful days
    Streak,
}

pub fn run(action: BadgeAction) -> CliResult {
    let db = open_db()?;
    let db = db.lock().map_err(|_| "database handle poisoned")?;

    match action {
        BadgeAction::List => {
            print_json(&db.query_badges(None)?)?;
        }
        BadgeAction::Evaluate => {
            let report = BadgeEvaluator::new().evaluate(&db, Utc::now())?;
            print_json(&report)?;
        }
        BadgeAction::Streak => {
            let streak = daily::compute_streak(&daily::history(&db)?);
            println!("{streak}");
        }
    }
    Ok(())
}
