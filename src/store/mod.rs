pub mod memory;
pub mod postgres;

pub use memory::{MemoryMessageStore, MemoryRateStore};
pub use postgres::PgStore;

use crate::core::config::AppConfig;
use anyhow::{Context, Result};

/// Connects to the configured database and makes sure the schema exists.
pub async fn open(config: &AppConfig) -> Result<PgStore> {
    let url = config.secrets.require_database_url()?;
    let store = PgStore::connect(url, config.database.max_connections)
        .await
        .context("Failed to connect to the database")?;
    store
        .init_schema()
        .await
        .context("Failed to initialise the database schema")?;
    Ok(store)
}
