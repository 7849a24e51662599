//! Persistence abstractions for rates and the chat message log

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),
}

/// Rate time series keyed by `(base_currency, date, currency)`.
#[async_trait]
pub trait RateStore: Send + Sync {
    /// Writes or overwrites one row per entry of `rates`, all or nothing.
    async fn upsert_day(
        &self,
        base_currency: &str,
        date: NaiveDate,
        rates: &BTreeMap<String, f64>,
    ) -> Result<u64, StoreError>;

    /// Rows for `currency` on or after `from`, ascending by date.
    async fn query_series(
        &self,
        currency: &str,
        from: NaiveDate,
    ) -> Result<Vec<(NaiveDate, f64)>, StoreError>;
}

/// An incoming chat message as it gets logged.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggedMessage {
    pub text: String,
    pub user_id: i64,
    pub username: Option<String>,
    pub is_bot: bool,
    pub message_id: i64,
    pub sent_at: DateTime<Utc>,
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn log_message(&self, message: &LoggedMessage) -> Result<(), StoreError>;

    async fn messages_by_user(&self, username: &str) -> Result<Vec<String>, StoreError>;

    /// Returns the number of deleted messages.
    async fn delete_by_user(&self, username: &str) -> Result<u64, StoreError>;

    /// Appends `suffix` to every stored text of `username`.
    async fn append_by_user(&self, username: &str, suffix: &str) -> Result<u64, StoreError>;
}
