use anyhow::{Context, Result, anyhow};
use chrono::{NaiveDate, TimeDelta};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};
use tracing::debug;

pub const ENV_BOT_TOKEN: &str = "BOT_TOKEN";
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
pub const ENV_API_KEY: &str = "API_KEY";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct OpenExchangeRatesConfig {
    pub base_url: String,
}

impl Default for OpenExchangeRatesConfig {
    fn default() -> Self {
        Self {
            base_url: "https://openexchangerates.org/api".to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize, Clone)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub openexchangerates: OpenExchangeRatesConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct TelegramConfig {
    pub base_url: String,
    /// Long-poll timeout for `getUpdates`.
    pub poll_timeout_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.telegram.org".to_string(),
            poll_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { max_connections: 5 }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ChartConfig {
    /// How far back `/plot` looks when no start date is given.
    pub since_days: i64,
    pub width: u32,
    pub height: u32,
    /// Base currency named in chart captions.
    pub base_currency: String,
}

impl ChartConfig {
    /// Start of the default chart window ending on `today`.
    pub fn default_since(&self, today: NaiveDate) -> Result<NaiveDate> {
        TimeDelta::try_days(self.since_days)
            .and_then(|window| today.checked_sub_signed(window))
            .ok_or_else(|| anyhow!("chart.since_days = {} is out of range", self.since_days))
    }
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            since_days: 90,
            width: 1400,
            height: 800,
            base_currency: "USD".to_string(),
        }
    }
}

/// Credentials. Environment variables override the config file.
#[derive(Default, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct Secrets {
    pub bot_token: Option<String>,
    pub database_url: Option<String>,
    pub api_key: Option<String>,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn redact(value: &Option<String>) -> &'static str {
            if value.is_some() { "<set>" } else { "<unset>" }
        }
        f.debug_struct("Secrets")
            .field("bot_token", &redact(&self.bot_token))
            .field("database_url", &redact(&self.database_url))
            .field("api_key", &redact(&self.api_key))
            .finish()
    }
}

fn require<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| anyhow!("{name} is not set"))
}

impl Secrets {
    pub fn require_bot_token(&self) -> Result<&str> {
        require(&self.bot_token, ENV_BOT_TOKEN)
    }

    pub fn require_database_url(&self) -> Result<&str> {
        require(&self.database_url, ENV_DATABASE_URL)
    }

    pub fn require_api_key(&self) -> Result<&str> {
        require(&self.api_key, ENV_API_KEY)
    }

    /// Names of the environment variables still needed.
    pub fn missing(&self) -> Vec<&'static str> {
        [
            (ENV_BOT_TOKEN, &self.bot_token),
            (ENV_DATABASE_URL, &self.database_url),
            (ENV_API_KEY, &self.api_key),
        ]
        .into_iter()
        .filter(|(_, value)| value.as_deref().is_none_or(str::is_empty))
        .map(|(name, _)| name)
        .collect()
    }
}

#[derive(Debug, Default, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub chart: ChartConfig,
    #[serde(default)]
    pub secrets: Secrets,
}

impl AppConfig {
    /// Loads the config file (explicit path, else the default location if
    /// present, else built-in defaults) and applies environment overrides.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut config = match config_path {
            Some(path) => Self::load_from_path(path)?,
            None => {
                let path = Self::default_config_path()?;
                if path.exists() {
                    Self::load_from_path(&path)?
                } else {
                    debug!("No config file at {}, using defaults", path.display());
                    Self::default()
                }
            }
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("dev", "ratebot", "ratebot")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    /// Replaces secrets with values found by `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let secrets = &mut self.secrets;
        for (key, slot) in [
            (ENV_BOT_TOKEN, &mut secrets.bot_token),
            (ENV_DATABASE_URL, &mut secrets.database_url),
            (ENV_API_KEY, &mut secrets.api_key),
        ] {
            if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
                *slot = Some(value);
            }
        }
    }
}
