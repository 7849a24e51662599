use crate::core::rates::RateRecord;
use crate::core::store::{LoggedMessage, MessageStore, RateStore, StoreError};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

type RateKey = (String, NaiveDate, String);

/// In-memory rate store with the same upsert semantics as the database table
#[derive(Clone, Default)]
pub struct MemoryRateStore {
    inner: Arc<Mutex<BTreeMap<RateKey, f64>>>,
}

impl MemoryRateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }

    /// All rows ordered by `(base_currency, date, currency)`.
    pub async fn records(&self) -> Vec<RateRecord> {
        let rows = self.inner.lock().await;
        rows.iter()
            .map(|((base_currency, date, currency), rate)| RateRecord {
                base_currency: base_currency.clone(),
                date: *date,
                currency: currency.clone(),
                rate: *rate,
            })
            .collect()
    }
}

#[async_trait]
impl RateStore for MemoryRateStore {
    async fn upsert_day(
        &self,
        base_currency: &str,
        date: NaiveDate,
        rates: &BTreeMap<String, f64>,
    ) -> Result<u64, StoreError> {
        // One lock for the whole day keeps the write all-or-nothing.
        let mut rows = self.inner.lock().await;
        for (currency, rate) in rates {
            rows.insert((base_currency.to_string(), date, currency.clone()), *rate);
        }
        debug!(%date, count = rates.len(), "Memory UPSERT");
        Ok(rates.len() as u64)
    }

    async fn query_series(
        &self,
        currency: &str,
        from: NaiveDate,
    ) -> Result<Vec<(NaiveDate, f64)>, StoreError> {
        let rows = self.inner.lock().await;
        let mut series: Vec<(NaiveDate, f64)> = rows
            .iter()
            .filter(|((_, date, cur), _)| cur == currency && *date >= from)
            .map(|((_, date, _), rate)| (*date, *rate))
            .collect();
        series.sort_by_key(|(date, _)| *date);
        Ok(series)
    }
}

#[derive(Clone, Default)]
pub struct MemoryMessageStore {
    inner: Arc<Mutex<Vec<LoggedMessage>>>,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<LoggedMessage> {
        self.inner.lock().await.clone()
    }
}

fn sent_by(message: &LoggedMessage, username: &str) -> bool {
    message.username.as_deref() == Some(username)
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn log_message(&self, message: &LoggedMessage) -> Result<(), StoreError> {
        self.inner.lock().await.push(message.clone());
        Ok(())
    }

    async fn messages_by_user(&self, username: &str) -> Result<Vec<String>, StoreError> {
        let messages = self.inner.lock().await;
        Ok(messages
            .iter()
            .filter(|m| sent_by(m, username))
            .map(|m| m.text.clone())
            .collect())
    }

    async fn delete_by_user(&self, username: &str) -> Result<u64, StoreError> {
        let mut messages = self.inner.lock().await;
        let before = messages.len();
        messages.retain(|m| !sent_by(m, username));
        Ok((before - messages.len()) as u64)
    }

    async fn append_by_user(&self, username: &str, suffix: &str) -> Result<u64, StoreError> {
        let mut messages = self.inner.lock().await;
        let mut updated = 0;
        for message in messages.iter_mut().filter(|m| sent_by(m, username)) {
            message.text.push_str(suffix);
            updated += 1;
        }
        Ok(updated)
    }
}
