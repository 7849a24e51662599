use crate::core::rates::{RateDay, RateSnapshot, RateSource, SourceError};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, error, instrument};

#[derive(Debug, Deserialize)]
struct OxrResponse {
    base: String,
    timestamp: i64,
    #[serde(default)]
    rates: BTreeMap<String, f64>,
}

/// Client for the Open Exchange Rates `latest` and `historical` endpoints.
///
/// Always asks for the full, unfiltered rate set. One request per call and no
/// retries; callers decide what a failed day means.
pub struct OpenExchangeRatesProvider {
    base_url: String,
    app_id: String,
    client: reqwest::Client,
}

impl OpenExchangeRatesProvider {
    pub fn new(base_url: &str, app_id: &str) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("ratebot/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            app_id: app_id.to_string(),
            client,
        }
    }

    fn endpoint(&self, day: RateDay) -> String {
        match day {
            RateDay::Latest => format!("{}/latest.json", self.base_url),
            RateDay::On(date) => format!(
                "{}/historical/{}.json",
                self.base_url,
                date.format("%Y-%m-%d")
            ),
        }
    }
}

#[async_trait]
impl RateSource for OpenExchangeRatesProvider {
    #[instrument(name = "OxrFetch", skip(self), fields(day = %day))]
    async fn fetch(&self, day: RateDay) -> Result<RateSnapshot, SourceError> {
        let endpoint = self.endpoint(day);
        let url = reqwest::Url::parse_with_params(&endpoint, &[("app_id", self.app_id.as_str())])
            .map_err(|e| SourceError::Malformed {
                day,
                reason: format!("invalid URL {endpoint}: {e}"),
            })?;
        debug!("Requesting rates from {}", endpoint);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| SourceError::Transport { day, source })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Unavailable {
                day,
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|source| SourceError::Transport { day, source })?;

        let data: OxrResponse = match serde_json::from_str(&body) {
            Ok(data) => data,
            Err(e) => {
                error!(error = ?e, response = %body, "Failed to parse rates response");
                return Err(SourceError::Malformed {
                    day,
                    reason: e.to_string(),
                });
            }
        };

        let as_of = Utc
            .timestamp_opt(data.timestamp, 0)
            .single()
            .ok_or_else(|| SourceError::Malformed {
                day,
                reason: format!("timestamp {} out of range", data.timestamp),
            })?;

        debug!(base = %data.base, %as_of, count = data.rates.len(), "Received rates");
        Ok(RateSnapshot {
            base_currency: data.base,
            as_of,
            rates: data.rates,
        })
    }
}
