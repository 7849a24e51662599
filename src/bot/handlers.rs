//! Command handlers. Each one holds only the collaborators it uses.

use super::status::ChatProgress;
use super::telegram::{MAX_MESSAGE_CHARS, split_text};
use crate::chart;
use crate::core::chat::{ChatClient, IncomingMessage};
use crate::core::config::ChartConfig;
use crate::core::ingest::{ArgumentError, IngestionRequest, Ingestor, parse_date};
use crate::core::rates::RateSource;
use crate::core::store::{MessageStore, RateStore};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

pub const PLOT_USAGE: &str = "Usage: /plot CURRENCY [YYYY-MM-DD]";
const NO_USERNAME: &str = "This command needs a Telegram username.";

/// What a handler gets to see of an incoming command.
pub struct Request<'a> {
    pub message: &'a IncomingMessage,
    pub args: &'a [String],
}

impl Request<'_> {
    pub fn chat_id(&self) -> i64 {
        self.message.chat_id
    }
}

#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// One line for `/help`.
    fn description(&self) -> &'static str;

    async fn handle(&self, chat: &dyn ChatClient, request: &Request<'_>) -> Result<()>;
}

pub struct StartHandler;

#[async_trait]
impl CommandHandler for StartHandler {
    fn description(&self) -> &'static str {
        "Say hello"
    }

    async fn handle(&self, chat: &dyn ChatClient, request: &Request<'_>) -> Result<()> {
        chat.send_text(
            request.chat_id(),
            "Hi! I track currency exchange rates. Send /help to see what I can do.",
        )
        .await?;
        Ok(())
    }
}

pub struct HelpHandler {
    text: String,
}

impl HelpHandler {
    pub fn new<'a>(commands: impl IntoIterator<Item = (&'a str, &'static str)>) -> Self {
        let mut lines: Vec<String> = commands
            .into_iter()
            .map(|(name, description)| format!("/{name} - {description}"))
            .collect();
        lines.sort();
        lines.push("/help - Show this list".to_string());
        Self {
            text: lines.join("\n"),
        }
    }
}

#[async_trait]
impl CommandHandler for HelpHandler {
    fn description(&self) -> &'static str {
        "Show this list"
    }

    async fn handle(&self, chat: &dyn ChatClient, request: &Request<'_>) -> Result<()> {
        chat.send_text(request.chat_id(), &self.text).await?;
        Ok(())
    }
}

/// Plain text: echo it back and log it.
pub struct EchoHandler {
    messages: Arc<dyn MessageStore>,
}

impl EchoHandler {
    pub fn new(messages: Arc<dyn MessageStore>) -> Self {
        Self { messages }
    }
}

#[async_trait]
impl CommandHandler for EchoHandler {
    fn description(&self) -> &'static str {
        "Echo and remember plain text"
    }

    async fn handle(&self, chat: &dyn ChatClient, request: &Request<'_>) -> Result<()> {
        let message = request.message;
        if message.text.is_empty() {
            return Ok(());
        }

        chat.send_text(message.chat_id, &message.text).await?;
        if let Some(username) = message.username() {
            chat.send_text(message.chat_id, username).await?;
        }

        self.messages
            .log_message(&message.to_logged())
            .await
            .context("Failed to store message")?;
        debug!(message_id = message.message_id, "Logged message");
        Ok(())
    }
}

pub struct ReturnMessagesHandler {
    messages: Arc<dyn MessageStore>,
}

impl ReturnMessagesHandler {
    pub fn new(messages: Arc<dyn MessageStore>) -> Self {
        Self { messages }
    }
}

#[async_trait]
impl CommandHandler for ReturnMessagesHandler {
    fn description(&self) -> &'static str {
        "Show your stored messages"
    }

    async fn handle(&self, chat: &dyn ChatClient, request: &Request<'_>) -> Result<()> {
        let Some(username) = request.message.username() else {
            chat.send_text(request.chat_id(), NO_USERNAME).await?;
            return Ok(());
        };
        let texts = self.messages.messages_by_user(username).await?;
        if texts.is_empty() {
            chat.send_text(request.chat_id(), "No stored messages.").await?;
            return Ok(());
        }
        for chunk in split_text(&texts.join("\n"), MAX_MESSAGE_CHARS) {
            chat.send_text(request.chat_id(), &chunk).await?;
        }
        Ok(())
    }
}

pub struct DeleteMessagesHandler {
    messages: Arc<dyn MessageStore>,
}

impl DeleteMessagesHandler {
    pub fn new(messages: Arc<dyn MessageStore>) -> Self {
        Self { messages }
    }
}

#[async_trait]
impl CommandHandler for DeleteMessagesHandler {
    fn description(&self) -> &'static str {
        "Delete your stored messages"
    }

    async fn handle(&self, chat: &dyn ChatClient, request: &Request<'_>) -> Result<()> {
        let Some(username) = request.message.username() else {
            chat.send_text(request.chat_id(), NO_USERNAME).await?;
            return Ok(());
        };
        let deleted = self.messages.delete_by_user(username).await?;
        chat.send_text(request.chat_id(), &format!("Deleted {deleted} messages."))
            .await?;
        Ok(())
    }
}

pub struct UpdateMessagesHandler {
    messages: Arc<dyn MessageStore>,
}

impl UpdateMessagesHandler {
    pub fn new(messages: Arc<dyn MessageStore>) -> Self {
        Self { messages }
    }
}

#[async_trait]
impl CommandHandler for UpdateMessagesHandler {
    fn description(&self) -> &'static str {
        "Add a smile to your stored messages"
    }

    async fn handle(&self, chat: &dyn ChatClient, request: &Request<'_>) -> Result<()> {
        let Some(username) = request.message.username() else {
            chat.send_text(request.chat_id(), NO_USERNAME).await?;
            return Ok(());
        };
        let updated = self.messages.append_by_user(username, ")").await?;
        chat.send_text(request.chat_id(), &format!("Updated {updated} messages."))
            .await?;
        Ok(())
    }
}

/// `/get_rates`: store today's snapshot.
pub struct LatestRatesHandler {
    source: Arc<dyn RateSource>,
    store: Arc<dyn RateStore>,
}

impl LatestRatesHandler {
    pub fn new(source: Arc<dyn RateSource>, store: Arc<dyn RateStore>) -> Self {
        Self { source, store }
    }
}

#[async_trait]
impl CommandHandler for LatestRatesHandler {
    fn description(&self) -> &'static str {
        "Load the latest exchange rates"
    }

    async fn handle(&self, chat: &dyn ChatClient, request: &Request<'_>) -> Result<()> {
        let (date, written) = Ingestor::new(self.source.as_ref(), self.store.as_ref())
            .ingest_latest()
            .await?;
        chat.send_text(
            request.chat_id(),
            &format!("Exchange rates for {written} currencies stored for {date}."),
        )
        .await?;
        Ok(())
    }
}

/// `/get_historical_rates START END`: backfill a date range.
pub struct HistoricalRatesHandler {
    source: Arc<dyn RateSource>,
    store: Arc<dyn RateStore>,
}

impl HistoricalRatesHandler {
    pub fn new(source: Arc<dyn RateSource>, store: Arc<dyn RateStore>) -> Self {
        Self { source, store }
    }
}

fn argument_reply(error: &ArgumentError) -> String {
    match error {
        ArgumentError::Usage => error.to_string(),
        ArgumentError::MalformedDate(_) => {
            format!("{error}.\n{}", crate::core::ingest::USAGE)
        }
        ArgumentError::ReversedRange { .. } => {
            format!("The start date must not be after the end date ({error}).")
        }
    }
}

#[async_trait]
impl CommandHandler for HistoricalRatesHandler {
    fn description(&self) -> &'static str {
        "Load rates for every day from START to END (YYYY-MM-DD)"
    }

    async fn handle(&self, chat: &dyn ChatClient, request: &Request<'_>) -> Result<()> {
        let range = match IngestionRequest::parse(request.args) {
            Ok(range) => range,
            Err(e) => {
                info!(error = %e, "Rejected backfill request");
                chat.send_text(request.chat_id(), &argument_reply(&e)).await?;
                return Ok(());
            }
        };

        let mut observer = ChatProgress::new(chat, request.chat_id());
        Ingestor::new(self.source.as_ref(), self.store.as_ref())
            .run(&range, &mut observer)
            .await?;
        Ok(())
    }
}

/// `/plot CURRENCY [SINCE]`: chart stored rates.
pub struct PlotHandler {
    store: Arc<dyn RateStore>,
    config: ChartConfig,
}

impl PlotHandler {
    pub fn new(store: Arc<dyn RateStore>, config: ChartConfig) -> Self {
        Self { store, config }
    }
}

#[async_trait]
impl CommandHandler for PlotHandler {
    fn description(&self) -> &'static str {
        "Chart a currency's stored rates"
    }

    async fn handle(&self, chat: &dyn ChatClient, request: &Request<'_>) -> Result<()> {
        let (currency, since) = match request.args {
            [currency] => (
                currency,
                self.config.default_since(Utc::now().date_naive())?,
            ),
            [currency, since] => match parse_date(since) {
                Ok(since) => (currency, since),
                Err(e) => {
                    chat.send_text(request.chat_id(), &format!("{e}.\n{PLOT_USAGE}"))
                        .await?;
                    return Ok(());
                }
            },
            _ => {
                chat.send_text(request.chat_id(), PLOT_USAGE).await?;
                return Ok(());
            }
        };
        let currency = currency.to_uppercase();

        let series = self.store.query_series(&currency, since).await?;
        if series.is_empty() {
            chat.send_text(
                request.chat_id(),
                &format!("No rates stored for {currency} since {since}."),
            )
            .await?;
            return Ok(());
        }

        let caption = chart::caption(&self.config.base_currency, &currency, &series);
        let (width, height) = (self.config.width, self.config.height);
        let png = tokio::task::spawn_blocking(move || chart::render_png(&series, width, height))
            .await
            .context("Chart rendering panicked")??;

        chat.send_photo(request.chat_id(), png, &caption).await?;
        Ok(())
    }
}
