use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use ratebot::core::log::init_logging;
use std::path::PathBuf;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl From<Commands> for ratebot::AppCommand {
    fn from(cmd: Commands) -> ratebot::AppCommand {
        match cmd {
            Commands::InitDb => ratebot::AppCommand::InitDb,
            Commands::Bot => ratebot::AppCommand::Bot,
            Commands::Backfill { start, end } => ratebot::AppCommand::Backfill { start, end },
            Commands::Latest => ratebot::AppCommand::Latest,
            Commands::Series { currency, from } => ratebot::AppCommand::Series { currency, from },
            Commands::Plot {
                currency,
                from,
                out,
            } => ratebot::AppCommand::Plot {
                currency,
                from,
                out,
            },
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Create the database tables if they are missing
    InitDb,
    /// Run the Telegram bot
    Bot,
    /// Load rates for every day from START to END (YYYY-MM-DD)
    Backfill { start: String, end: String },
    /// Load the latest rates
    Latest,
    /// Print the stored rates of a currency
    Series {
        currency: String,
        /// First date to include (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,
    },
    /// Write a PNG chart of a currency's stored rates
    Plot {
        currency: String,
        /// First date to include (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,
        /// Output file
        #[arg(short, long, default_value = "chart.png")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // A missing .env is fine; real deployments set the environment directly.
    dotenvy::dotenv().ok();
    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => ratebot::cli::setup::setup(),
        Some(cmd) => ratebot::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
