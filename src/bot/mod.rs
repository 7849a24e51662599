//! Telegram front end: a command table plus a long-polling loop.

pub mod handlers;
pub mod status;
pub mod telegram;

use crate::core::chat::{ChatClient, IncomingMessage};
use crate::core::config::{AppConfig, ChartConfig};
use crate::core::rates::RateSource;
use crate::core::store::{MessageStore, RateStore};
use crate::providers::OpenExchangeRatesProvider;
use crate::store;
use anyhow::{Context, Result};
use handlers::{
    CommandHandler, DeleteMessagesHandler, EchoHandler, HelpHandler, HistoricalRatesHandler,
    LatestRatesHandler, PlotHandler, Request, ReturnMessagesHandler, StartHandler,
    UpdateMessagesHandler,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use telegram::TelegramClient;
use tracing::{debug, error, info, warn};

const RETRY_DELAY: Duration = Duration::from_secs(5);

/// A `/name@bot arg1 arg2` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    /// Lowercased command name without the slash.
    pub name: String,
    /// Bot named after `@`, if any.
    pub addressee: Option<String>,
    pub args: Vec<String>,
}

impl ParsedCommand {
    /// True unless the command names some other bot.
    pub fn is_for(&self, bot_username: Option<&str>) -> bool {
        match (&self.addressee, bot_username) {
            (Some(addressee), Some(me)) => addressee.eq_ignore_ascii_case(me),
            _ => true,
        }
    }
}

/// Parses a command; plain text gives `None`.
pub fn parse_command(text: &str) -> Option<ParsedCommand> {
    let mut parts = text.split_whitespace();
    let head = parts.next()?.strip_prefix('/')?;
    let (name, addressee) = match head.split_once('@') {
        Some((name, bot)) => (name, Some(bot.to_string())),
        None => (head, None),
    };
    if name.is_empty() {
        return None;
    }
    Some(ParsedCommand {
        name: name.to_lowercase(),
        addressee,
        args: parts.map(str::to_string).collect(),
    })
}

/// Maps command names to handlers; anything that is not a command goes to
/// the fallback.
pub struct Dispatcher {
    commands: HashMap<String, Arc<dyn CommandHandler>>,
    fallback: Arc<dyn CommandHandler>,
    bot_username: Option<String>,
}

impl Dispatcher {
    pub fn new(fallback: Arc<dyn CommandHandler>) -> Self {
        Self {
            commands: HashMap::new(),
            fallback,
            bot_username: None,
        }
    }

    /// Commands addressed to any other `@bot` are ignored once this is set.
    pub fn set_bot_username(&mut self, username: &str) -> &mut Self {
        self.bot_username = Some(username.to_string());
        self
    }

    pub fn register(&mut self, name: &str, handler: Arc<dyn CommandHandler>) -> &mut Self {
        self.commands.insert(name.to_string(), handler);
        self
    }

    pub fn command_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.commands.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Runs the matching handler. Failures are logged and reported to the chat.
    pub async fn dispatch(&self, chat: &dyn ChatClient, message: &IncomingMessage) {
        let (name, handler, args) = match parse_command(&message.text) {
            Some(command) if !command.is_for(self.bot_username.as_deref()) => {
                debug!(command = %command.name, addressee = ?command.addressee, "Ignoring command for another bot");
                return;
            }
            Some(ParsedCommand { name, args, .. }) => match self.commands.get(&name) {
                Some(handler) => (name, Arc::clone(handler), args),
                None => {
                    let reply = format!("Unknown command /{name}. Try /help.");
                    if let Err(e) = chat.send_text(message.chat_id, &reply).await {
                        warn!(error = %e, "Failed to reply to unknown command");
                    }
                    return;
                }
            },
            None => ("text".to_string(), Arc::clone(&self.fallback), Vec::new()),
        };

        info!(command = %name, chat_id = message.chat_id, "Handling message");
        let request = Request {
            message,
            args: &args,
        };
        if let Err(e) = handler.handle(chat, &request).await {
            error!(command = %name, error = ?e, "Command failed");
            let reply = format!("⚠️ /{name} failed: {e}");
            if let Err(e) = chat.send_text(message.chat_id, &reply).await {
                warn!(error = %e, "Failed to report command failure");
            }
        }
    }
}

/// Wires every command to its collaborators.
pub fn build_dispatcher(
    source: Arc<dyn RateSource>,
    rates: Arc<dyn RateStore>,
    messages: Arc<dyn MessageStore>,
    chart: ChartConfig,
) -> Dispatcher {
    let mut dispatcher = Dispatcher::new(Arc::new(EchoHandler::new(Arc::clone(&messages))));
    dispatcher
        .register("start", Arc::new(StartHandler))
        .register(
            "return_all_messages",
            Arc::new(ReturnMessagesHandler::new(Arc::clone(&messages))),
        )
        .register(
            "delete_all_messages",
            Arc::new(DeleteMessagesHandler::new(Arc::clone(&messages))),
        )
        .register(
            "update_all_messages",
            Arc::new(UpdateMessagesHandler::new(messages)),
        )
        .register(
            "get_rates",
            Arc::new(LatestRatesHandler::new(Arc::clone(&source), Arc::clone(&rates))),
        )
        .register(
            "get_historical_rates",
            Arc::new(HistoricalRatesHandler::new(source, Arc::clone(&rates))),
        )
        .register("plot", Arc::new(PlotHandler::new(rates, chart)));

    let help = HelpHandler::new(
        dispatcher
            .commands
            .iter()
            .map(|(name, handler)| (name.as_str(), handler.description())),
    );
    dispatcher.register("help", Arc::new(help));
    dispatcher
}

/// Serves the bot until Ctrl-C.
pub async fn run(config: &AppConfig) -> Result<()> {
    let token = config.secrets.require_bot_token()?;
    let api_key = config.secrets.require_api_key()?;
    let db = Arc::new(store::open(config).await?);

    let telegram = Arc::new(TelegramClient::new(&config.telegram.base_url, token));
    let me = telegram
        .get_me()
        .await
        .context("Failed to look up the bot account")?;
    let source = Arc::new(OpenExchangeRatesProvider::new(
        &config.providers.openexchangerates.base_url,
        api_key,
    ));
    let mut dispatcher = build_dispatcher(source, db.clone(), db, config.chart.clone());
    if let Some(username) = &me.username {
        dispatcher.set_bot_username(username);
    }
    let dispatcher = Arc::new(dispatcher);
    info!(username = ?me.username, commands = ?dispatcher.command_names(), "Bot started");

    let mut offset = 0;
    loop {
        let updates = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                return Ok(());
            }
            updates = telegram.get_updates(offset, config.telegram.poll_timeout_secs) => updates,
        };

        let updates = match updates {
            Ok(updates) => updates,
            Err(e) => {
                warn!(error = %e, "Polling failed, retrying in {:?}", RETRY_DELAY);
                tokio::time::sleep(RETRY_DELAY).await;
                continue;
            }
        };

        for update in updates {
            offset = offset.max(update.update_id + 1);
            let Some(message) = update.message else {
                continue;
            };
            let message = IncomingMessage::from(message);
            let dispatcher = Arc::clone(&dispatcher);
            let telegram = Arc::clone(&telegram);
            // Updates are handled independently so a long backfill does not
            // block other chats.
            tokio::spawn(async move {
                dispatcher.dispatch(telegram.as_ref(), &message).await;
            });
        }
    }
}
