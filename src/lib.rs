pub mod bot;
pub mod chart;
pub mod cli;
pub mod core;
pub mod providers;
pub mod store;

use anyhow::Result;
use std::path::PathBuf;
use tracing::{debug, info};

pub enum AppCommand {
    InitDb,
    Bot,
    Backfill {
        start: String,
        end: String,
    },
    Latest,
    Series {
        currency: String,
        from: Option<String>,
    },
    Plot {
        currency: String,
        from: Option<String>,
        out: PathBuf,
    },
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    let config = crate::core::config::AppConfig::load(config_path)?;
    debug!("Loaded config: {config:#?}");

    match command {
        AppCommand::InitDb => {
            store::open(&config).await?;
            info!("Database initialised");
            Ok(())
        }
        AppCommand::Bot => bot::run(&config).await,
        AppCommand::Backfill { start, end } => {
            cli::backfill::run_with_config(&config, &start, &end).await
        }
        AppCommand::Latest => cli::backfill::latest_with_config(&config).await,
        AppCommand::Series { currency, from } => {
            cli::series::run_with_config(&config, &currency, from.as_deref()).await
        }
        AppCommand::Plot {
            currency,
            from,
            out,
        } => cli::series::plot_with_config(&config, &currency, from.as_deref(), &out).await,
    }
}
