use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser)]
#[command(name = "uvhero", version, about = "UVHero CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read sensor payloads from stdin and record them
    Ingest,
    /// Current gauge levels
    Gauge {
        #[command(subcommand)]
        action: commands::gauge::GaugeAction,
    },
    /// Daily rollover control
    Rollover {
        #[command(subcommand)]
        action: commands::rollover::RolloverAction,
    },
    /// Run ingestion, rollover and forecast loops until interrupted
    Daemon(commands::daemon::DaemonArgs),
    /// Daily summaries
    Summary {
        #[command(subcommand)]
        action: commands::summary::SummaryAction,
    },
    /// Streak badges
    Badge {
        #[command(subcommand)]
        action: commands::badge::BadgeAction,
    },
    /// Today's prevention count
    Prevent {
        #[command(subcommand)]
        action: commands::prevent::PreventAction,
    },
    /// UV forecast and fixed daily values
    Forecast {
        #[command(subcommand)]
        action: commands::forecast::ForecastAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

/// Logs go to stderr so stdout stays machine-readable. `UVHERO_LOG` takes
/// the usual filter syntax, e.g. `UVHERO_LOG=uvhero_core=debug`.
fn init_logging() {
    let filter = EnvFilter::try_from_env("UVHERO_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn main() {
    init_logging();
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Ingest => commands::ingest::run(),
        Commands::Gauge { action } => commands::gauge::run(action),
        Commands::Rollover { action } => commands::rollover::run(action),
        Commands::Daemon(args) => commands::daemon::run(args),
        Commands::Summary { action } => commands::summary::run(action),
        Commands::Badge { action } => commands::badge::run(action),
        Commands::Prevent { action } => commands::prevent::run(action),
        Commands::Forecast { action } => commands::forecast::run(action),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
