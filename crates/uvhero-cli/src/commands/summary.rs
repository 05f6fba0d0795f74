use clap::Subcommand;
use serde::Serialize;
use uvhero_core::daily::{self, DailySummary};
use uvhero_core::gauge;

use super::{open_db, print_json, CliResult};

#[derive(Subcommand)]
pub enum SummaryAction {
    /// Kept daily summaries, newest first
    List,
    /// Most recent summary with its end-of-day remark
    Latest,
}

#[derive(Serialize)]
struct SummaryView {
    #[serde(flatten)]
    summary: DailySummary,
    remark: &'static str,
}

impl From<DailySummary> for SummaryView {
    fn from(summary: DailySummary) -> Self {
        Self {
            remark: gauge::praise(summary.prevent_count),
            summary,
        }
    }
}

pub fn run(action: SummaryAction) -> CliResult {
    let db = open_db()?;
    let db = db.lock().map_err(|_| "database handle poisoned")?;

    match action {
        SummaryAction::List => {
            let views: Vec<SummaryView> = daily::history(&db)?
                .into_iter()
                .map(SummaryView::from)
                .collect();
            print_json(&views)?;
        }
        SummaryAction::Latest => match daily::history(&db)?.into_iter().next() {
            Some(summary) => print_json(&SummaryView::from(summary))?,
            None => println!("null"),
        },
    }
    Ok(())
}
