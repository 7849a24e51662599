use super::ui;
use crate::core::config::AppConfig;
use crate::core::ingest::{IngestObserver, IngestReport, IngestionRequest, Ingestor};
use crate::core::progress::{self, IngestionProgress};
use crate::core::rates::{RateSource, SourceError};
use crate::core::store::RateStore;
use crate::providers::OpenExchangeRatesProvider;
use crate::store;
use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use indicatif::ProgressBar;

/// Terminal counterpart of the chat status message: one progress bar,
/// failures printed above it.
#[derive(Default)]
pub struct TerminalProgress {
    pb: Option<ProgressBar>,
}

#[async_trait]
impl IngestObserver for TerminalProgress {
    async fn started(&mut self, request: &IngestionRequest) {
        let pb = ui::new_progress_bar(u64::from(request.total_days()));
        pb.set_message(format!("{} — {}", request.start(), request.end()));
        self.pb = Some(pb);
    }

    async fn day_stored(&mut self, progress: &IngestionProgress) {
        if let Some(pb) = &self.pb {
            pb.set_message(format!(
                "{} {}",
                progress::frame(progress.processed_days),
                progress.current_date
            ));
            // Skipped days leave the bar where it is.
            pb.set_position(u64::from(progress.processed_days));
        }
    }

    async fn day_failed(&mut self, date: NaiveDate, error: &SourceError) {
        if let Some(pb) = &self.pb {
            let line = progress::render_day_failed(date, &error.to_string());
            pb.println(ui::style_text(&line, ui::StyleType::Error));
        }
    }

    async fn completed(&mut self, request: &IngestionRequest, report: &IngestReport) {
        if let Some(pb) = self.pb.take() {
            pb.finish_and_clear();
        }
        println!(
            "{}",
            ui::style_text(
                &progress::render_completed(request.start(), request.end()),
                ui::StyleType::Success
            )
        );
        println!(
            "{}",
            ui::style_text(
                &format!(
                    "{} of {} days stored, {} rows written",
                    report.processed_days, report.total_days, report.rows_written
                ),
                ui::StyleType::Subtle
            )
        );
        if !report.skipped_days.is_empty() {
            let skipped: Vec<String> = report.skipped_days.iter().map(|d| d.to_string()).collect();
            println!(
                "{}",
                ui::style_text(
                    &format!("Skipped: {}", skipped.join(", ")),
                    ui::StyleType::Error
                )
            );
        }
    }
}

/// Runs a backfill with progress drawn in the terminal.
pub async fn run(
    request: &IngestionRequest,
    source: &dyn RateSource,
    store: &dyn RateStore,
) -> Result<IngestReport> {
    let mut observer = TerminalProgress::default();
    let report = Ingestor::new(source, store).run(request, &mut observer).await?;
    Ok(report)
}

pub async fn run_with_config(config: &AppConfig, start: &str, end: &str) -> Result<()> {
    // Arguments are checked before touching the network or the database.
    let request = IngestionRequest::parse(&[start, end])?;
    let source = OpenExchangeRatesProvider::new(
        &config.providers.openexchangerates.base_url,
        config.secrets.require_api_key()?,
    );
    let db = store::open(config).await?;
    run(&request, &source, &db).await?;
    Ok(())
}

/// `latest`: store today's snapshot.
pub async fn latest_with_config(config: &AppConfig) -> Result<()> {
    let source = OpenExchangeRatesProvider::new(
        &config.providers.openexchangerates.base_url,
        config.secrets.require_api_key()?,
    );
    let db = store::open(config).await?;
    let (date, written) = Ingestor::new(&source, &db).ingest_latest().await?;
    println!(
        "{}",
        ui::style_text(
            &format!("Exchange rates for {written} currencies stored for {date}"),
            ui::StyleType::Success
        )
    );
    Ok(())
}
