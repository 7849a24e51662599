//! PostgreSQL-backed rate store and message log.

use crate::core::store::{LoggedMessage, MessageStore, RateStore, StoreError};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, instrument};

const CREATE_MESSAGES: &str = r"
    CREATE TABLE IF NOT EXISTS messages (
        id SERIAL PRIMARY KEY,
        text TEXT,
        username TEXT
    )";

const CREATE_MESSAGE_UPDATES: &str = r"
    CREATE TABLE IF NOT EXISTS message_updates (
        id SERIAL PRIMARY KEY,
        message_text TEXT,
        user_id BIGINT,
        user_name TEXT,
        is_bot BOOLEAN,
        message_id BIGINT,
        date TIMESTAMP
    )";

const CREATE_RATES: &str = r"
    CREATE TABLE IF NOT EXISTS rates (
        base_currency TEXT,
        date DATE,
        currency TEXT,
        rate DOUBLE PRECISION,
        PRIMARY KEY (base_currency, date, currency)
    )";

/// Rate and message tables behind one connection pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Opens a pool against `database_url`.
    ///
    /// # Errors
    /// Returns an error if no connection can be established.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the tables if they are missing. Safe to run on every start.
    ///
    /// # Errors
    /// Returns an error if any statement fails.
    pub async fn init_schema(&self) -> Result<(), StoreError> {
        for statement in [CREATE_MESSAGES, CREATE_MESSAGE_UPDATES, CREATE_RATES] {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!("Database schema ready");
        Ok(())
    }
}

#[async_trait]
impl RateStore for PgStore {
    #[instrument(name = "RatesUpsert", skip(self, rates), fields(count = rates.len()))]
    async fn upsert_day(
        &self,
        base_currency: &str,
        date: NaiveDate,
        rates: &BTreeMap<String, f64>,
    ) -> Result<u64, StoreError> {
        // Dropping the transaction on an early return rolls it back.
        let mut tx = self.pool.begin().await?;
        let mut written = 0;

        for (currency, rate) in rates {
            let result = sqlx::query(
                r"
                INSERT INTO rates (base_currency, date, currency, rate)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (base_currency, date, currency) DO UPDATE
                SET rate = EXCLUDED.rate
                ",
            )
            .bind(base_currency)
            .bind(date)
            .bind(currency)
            .bind(*rate)
            .execute(&mut *tx)
            .await?;
            written += result.rows_affected();
        }

        tx.commit().await?;
        debug!(written, "Committed day");
        Ok(written)
    }

    async fn query_series(
        &self,
        currency: &str,
        from: NaiveDate,
    ) -> Result<Vec<(NaiveDate, f64)>, StoreError> {
        let rows = sqlx::query_as::<_, (NaiveDate, f64)>(
            r"
            SELECT date, rate::float8
            FROM rates
            WHERE currency = $1 AND date >= $2
            ORDER BY date ASC
            ",
        )
        .bind(currency)
        .bind(from)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

#[async_trait]
impl MessageStore for PgStore {
    async fn log_message(&self, message: &LoggedMessage) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO messages (text, username) VALUES ($1, $2)")
            .bind(&message.text)
            .bind(&message.username)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r"
            INSERT INTO message_updates
                (message_text, user_id, user_name, is_bot, message_id, date)
            VALUES ($1, $2, $3, $4, $5, $6)
            ",
        )
        .bind(&message.text)
        .bind(message.user_id)
        .bind(&message.username)
        .bind(message.is_bot)
        .bind(message.message_id)
        .bind(message.sent_at.naive_utc())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn messages_by_user(&self, username: &str) -> Result<Vec<String>, StoreError> {
        let texts = sqlx::query_scalar::<_, String>(
            "SELECT COALESCE(text, '') FROM messages WHERE username = $1 ORDER BY id",
        )
        .bind(username)
        .fetch_all(&self.pool)
        .await?;
        Ok(texts)
    }

    async fn delete_by_user(&self, username: &str) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM messages WHERE username = $1")
            .bind(username)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn append_by_user(&self, username: &str, suffix: &str) -> Result<u64, StoreError> {
        let result = sqlx::query("UPDATE messages SET text = text || $2 WHERE username = $1")
            .bind(username)
            .bind(suffix)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
