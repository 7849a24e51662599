//! Exchange-rate abstractions and core types

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use thiserror::Error;

/// Which snapshot to ask the rate source for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateDay {
    Latest,
    On(NaiveDate),
}

impl Display for RateDay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RateDay::Latest => write!(f, "latest"),
            RateDay::On(date) => write!(f, "{}", date.format("%Y-%m-%d")),
        }
    }
}

/// One snapshot of all rates quoted against `base_currency`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateSnapshot {
    pub base_currency: String,
    pub as_of: DateTime<Utc>,
    pub rates: BTreeMap<String, f64>,
}

impl RateSnapshot {
    /// Calendar date (UTC) the source says this snapshot belongs to.
    pub fn reported_date(&self) -> NaiveDate {
        self.as_of.date_naive()
    }
}

/// A persisted rate row. `(base_currency, date, currency)` is unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateRecord {
    pub base_currency: String,
    pub date: NaiveDate,
    pub currency: String,
    pub rate: f64,
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("rate source returned HTTP {status} for {day}")]
    Unavailable { day: RateDay, status: u16 },
    #[error("request for {day} failed: {source}")]
    Transport {
        day: RateDay,
        #[source]
        source: reqwest::Error,
    },
    #[error("could not decode rates for {day}: {reason}")]
    Malformed { day: RateDay, reason: String },
}

impl SourceError {
    /// HTTP status when the source answered with a non-success response.
    pub fn status(&self) -> Option<u16> {
        match self {
            SourceError::Unavailable { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[async_trait]
pub trait RateSource: Send + Sync {
    async fn fetch(&self, day: RateDay) -> Result<RateSnapshot, SourceError>;
}
