//! Historical rate ingestion.
//!
//! A run walks an inclusive date range one day at a time: fetch the day from
//! the [`RateSource`], upsert it into the [`RateStore`], then tell the
//! [`IngestObserver`] so it can update its single status view. A day the
//! source cannot serve is reported and skipped. A store failure ends the run.

use crate::core::progress::IngestionProgress;
use crate::core::rates::{RateDay, RateSnapshot, RateSource, SourceError};
use crate::core::store::{RateStore, StoreError};
use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const USAGE: &str = "Usage: /get_historical_rates YYYY-MM-DD YYYY-MM-DD";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgumentError {
    #[error("Usage: /get_historical_rates YYYY-MM-DD YYYY-MM-DD")]
    Usage,
    #[error("invalid date `{0}`, expected YYYY-MM-DD")]
    MalformedDate(String),
    #[error("start date {start} is after end date {end}")]
    ReversedRange { start: NaiveDate, end: NaiveDate },
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Argument(#[from] ArgumentError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A validated inclusive date range, `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestionRequest {
    start: NaiveDate,
    end: NaiveDate,
}

impl IngestionRequest {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ArgumentError> {
        if start > end {
            return Err(ArgumentError::ReversedRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Parses two positional `YYYY-MM-DD` arguments.
    pub fn parse<S: AsRef<str>>(args: &[S]) -> Result<Self, ArgumentError> {
        let [start, end] = args else {
            return Err(ArgumentError::Usage);
        };
        Self::new(parse_date(start.as_ref())?, parse_date(end.as_ref())?)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn total_days(&self) -> u32 {
        ((self.end - self.start).num_days() + 1) as u32
    }

    /// Every date of the range, ascending.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + use<> {
        let end = self.end;
        self.start.iter_days().take_while(move |day| *day <= end)
    }
}

pub fn parse_date(value: &str) -> Result<NaiveDate, ArgumentError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|_| ArgumentError::MalformedDate(value.to_string()))
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub total_days: u32,
    pub processed_days: u32,
    pub skipped_days: Vec<NaiveDate>,
    pub rows_written: u64,
}

/// Receives progress of one run, in order.
#[async_trait]
pub trait IngestObserver: Send {
    async fn started(&mut self, request: &IngestionRequest);
    async fn day_stored(&mut self, progress: &IngestionProgress);
    async fn day_failed(&mut self, date: NaiveDate, error: &SourceError);
    async fn completed(&mut self, request: &IngestionRequest, report: &IngestReport);
}

/// Date a snapshot is stored under.
///
/// A dated request is stored under the requested day even when the source
/// reports another canonical date, so a backfill never silently skips a day.
/// `latest` has no requested day and uses the source's own date.
pub fn storage_date(day: RateDay, snapshot: &RateSnapshot) -> NaiveDate {
    let reported = snapshot.reported_date();
    match day {
        RateDay::On(requested) => {
            if requested != reported {
                warn!(%requested, %reported, "Source reported a different date; storing under the requested one");
            }
            requested
        }
        RateDay::Latest => reported,
    }
}

pub struct Ingestor<'a> {
    source: &'a dyn RateSource,
    store: &'a dyn RateStore,
}

impl<'a> Ingestor<'a> {
    pub fn new(source: &'a dyn RateSource, store: &'a dyn RateStore) -> Self {
        Self { source, store }
    }

    /// Validates the range, then runs it. A reversed range does no I/O.
    pub async fn run_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        observer: &mut dyn IngestObserver,
    ) -> Result<IngestReport, IngestError> {
        let request = IngestionRequest::new(start, end)?;
        Ok(self.run(&request, observer).await?)
    }

    #[instrument(
        name = "HistoricalIngest",
        skip(self, observer),
        fields(start = %request.start(), end = %request.end())
    )]
    pub async fn run(
        &self,
        request: &IngestionRequest,
        observer: &mut dyn IngestObserver,
    ) -> Result<IngestReport, StoreError> {
        let total_days = request.total_days();
        let mut progress = IngestionProgress::new(total_days, request.start());
        let mut report = IngestReport {
            total_days,
            ..IngestReport::default()
        };

        observer.started(request).await;

        for date in request.days() {
            let day = RateDay::On(date);
            let snapshot = match self.source.fetch(day).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!(%date, error = %e, "Skipping day");
                    report.skipped_days.push(date);
                    observer.day_failed(date, &e).await;
                    continue;
                }
            };

            let stored_on = storage_date(day, &snapshot);
            let written = self
                .store
                .upsert_day(&snapshot.base_currency, stored_on, &snapshot.rates)
                .await?;
            debug!(%date, %stored_on, written, "Stored rates");

            report.rows_written += written;
            progress.processed_days += 1;
            progress.current_date = date;
            observer.day_stored(&progress).await;
        }

        report.processed_days = progress.processed_days;
        observer.completed(request, &report).await;
        info!(
            processed = report.processed_days,
            skipped = report.skipped_days.len(),
            rows = report.rows_written,
            "Ingestion finished"
        );
        Ok(report)
    }

    /// Fetches the latest snapshot and stores it under the source's date.
    #[instrument(name = "LatestIngest", skip(self))]
    pub async fn ingest_latest(&self) -> Result<(NaiveDate, u64), IngestError> {
        let snapshot = self.source.fetch(RateDay::Latest).await?;
        let date = storage_date(RateDay::Latest, &snapshot);
        let written = self
            .store
            .upsert_day(&snapshot.base_currency, date, &snapshot.rates)
            .await?;
        info!(%date, written, "Stored latest rates");
        Ok((date, written))
    }
}
