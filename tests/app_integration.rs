use chrono::{NaiveDate, TimeZone, Utc};
use ratebot::bot::{Dispatcher, build_dispatcher};
use ratebot::core::config::ChartConfig;
use ratebot::core::{IncomingMessage, RateStore, Sender};
use ratebot::providers::OpenExchangeRatesProvider;
use ratebot::store::{MemoryMessageStore, MemoryRateStore};
use std::sync::Arc;
use test_utils::{ChatEvent, RecordingChat};

const API_KEY: &str = "test-key";
const CHAT_ID: i64 = 4242;

// Shared doubles for driving the bot without Telegram
mod test_utils {
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use ratebot::core::{ChatClient, MessageRef, RateStore, StoreError};
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Debug, Clone, PartialEq)]
    pub enum ChatEvent {
        Sent { message_id: i64, text: String },
        Edited { message_id: i64, text: String },
        Photo { caption: String, bytes: usize },
    }

    /// Chat client that keeps everything the bot says.
    #[derive(Default)]
    pub struct RecordingChat {
        events: Mutex<Vec<ChatEvent>>,
    }

    impl RecordingChat {
        pub fn events(&self) -> Vec<ChatEvent> {
            self.events.lock().unwrap().clone()
        }

        pub fn sent_texts(&self) -> Vec<String> {
            self.events()
                .into_iter()
                .filter_map(|e| match e {
                    ChatEvent::Sent { text, .. } => Some(text),
                    _ => None,
                })
                .collect()
        }

        pub fn edits(&self) -> Vec<(i64, String)> {
            self.events()
                .into_iter()
                .filter_map(|e| match e {
                    ChatEvent::Edited { message_id, text } => Some((message_id, text)),
                    _ => None,
                })
                .collect()
        }

        fn record(&self, event: ChatEvent) -> i64 {
            let mut events = self.events.lock().unwrap();
            events.push(event);
            events.len() as i64
        }
    }

    #[async_trait]
    impl ChatClient for RecordingChat {
        async fn send_text(&self, chat_id: i64, text: &str) -> Result<MessageRef> {
            let mut events = self.events.lock().unwrap();
            let message_id = events.len() as i64 + 1;
            events.push(ChatEvent::Sent {
                message_id,
                text: text.to_string(),
            });
            Ok(MessageRef {
                chat_id,
                message_id,
            })
        }

        async fn edit_text(&self, message: MessageRef, text: &str) -> Result<()> {
            self.record(ChatEvent::Edited {
                message_id: message.message_id,
                text: text.to_string(),
            });
            Ok(())
        }

        async fn send_photo(&self, chat_id: i64, png: Vec<u8>, caption: &str) -> Result<MessageRef> {
            let message_id = self.record(ChatEvent::Photo {
                caption: caption.to_string(),
                bytes: png.len(),
            });
            Ok(MessageRef {
                chat_id,
                message_id,
            })
        }
    }

    pub fn rates_body(date: NaiveDate, eur: f64, gbp: f64) -> String {
        let timestamp = date.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp();
        format!(
            r#"{{"timestamp": {timestamp}, "base": "USD", "rates": {{"EUR": {eur}, "GBP": {gbp}}}}}"#
        )
    }

    pub async fn mount_day(server: &MockServer, date: NaiveDate, response: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path(format!("/historical/{}.json", date.format("%Y-%m-%d"))))
            .and(query_param("app_id", super::API_KEY))
            .respond_with(response)
            .mount(server)
            .await;
    }

    /// Rate store whose database is always down.
    pub struct DownStore;

    #[async_trait]
    impl RateStore for DownStore {
        async fn upsert_day(
            &self,
            _base_currency: &str,
            _date: NaiveDate,
            _rates: &BTreeMap<String, f64>,
        ) -> Result<u64, StoreError> {
            Err(StoreError::Unavailable(sqlx::Error::PoolTimedOut))
        }

        async fn query_series(
            &self,
            _currency: &str,
            _from: NaiveDate,
        ) -> Result<Vec<(NaiveDate, f64)>, StoreError> {
            Err(StoreError::Unavailable(sqlx::Error::PoolTimedOut))
        }
    }

    pub async fn mount_latest(server: &MockServer, body: String) {
        Mock::given(method("GET"))
            .and(path("/latest.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(server)
            .await;
    }
}

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn message(text: &str) -> IncomingMessage {
    IncomingMessage {
        chat_id: CHAT_ID,
        message_id: 1,
        text: text.to_string(),
        sender: Some(Sender {
            id: 7,
            username: Some("alice".to_string()),
            is_bot: false,
        }),
        sent_at: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
    }
}

struct Harness {
    server: wiremock::MockServer,
    rates: Arc<MemoryRateStore>,
    messages: Arc<MemoryMessageStore>,
    chat: RecordingChat,
    dispatcher: Dispatcher,
}

impl Harness {
    async fn new() -> Self {
        Self::with_store(None).await
    }

    /// Uses `store` for rates instead of the in-memory one when given.
    async fn with_store(store: Option<Arc<dyn RateStore>>) -> Self {
        let chart = ChartConfig {
            width: 200,
            height: 120,
            ..ChartConfig::default()
        };
        Self::build(store, chart).await
    }

    async fn build(store: Option<Arc<dyn RateStore>>, chart: ChartConfig) -> Self {
        let server = wiremock::MockServer::start().await;
        let rates = Arc::new(MemoryRateStore::new());
        let messages = Arc::new(MemoryMessageStore::new());
        let source = Arc::new(OpenExchangeRatesProvider::new(&server.uri(), API_KEY));
        let rate_store: Arc<dyn RateStore> =
            store.unwrap_or_else(|| rates.clone() as Arc<dyn RateStore>);
        let dispatcher = build_dispatcher(source, rate_store, messages.clone(), chart);
        Self {
            server,
            rates,
            messages,
            chat: RecordingChat::default(),
            dispatcher,
        }
    }

    async fn send(&self, text: &str) {
        self.dispatcher.dispatch(&self.chat, &message(text)).await;
    }
}

#[test_log::test(tokio::test)]
async fn test_single_day_backfill_end_to_end() {
    let h = Harness::new().await;
    let day = date("2024-01-01");
    test_utils::mount_day(
        &h.server,
        day,
        wiremock::ResponseTemplate::new(200).set_body_string(test_utils::rates_body(day, 0.91, 0.78)),
    )
    .await;

    h.send("/get_historical_rates 2024-01-01 2024-01-01").await;

    let records = h.rates.records().await;
    assert_eq!(records.len(), 2);
    assert_eq!(
        (records[0].base_currency.as_str(), records[0].date, records[0].currency.as_str(), records[0].rate),
        ("USD", day, "EUR", 0.91)
    );
    assert_eq!(
        (records[1].base_currency.as_str(), records[1].date, records[1].currency.as_str(), records[1].rate),
        ("USD", day, "GBP", 0.78)
    );

    // One status message, edited in place, ending with the completion notice.
    let sent = h.chat.sent_texts();
    assert_eq!(sent.len(), 1);
    let edits = h.chat.edits();
    assert!(edits.iter().all(|(id, _)| *id == 1));
    assert!(edits[0].1.contains("100%"));
    assert!(edits.last().unwrap().1.contains("2024-01-01 — 2024-01-01"));
}

#[test_log::test(tokio::test)]
async fn test_failed_day_is_reported_and_skipped() {
    let h = Harness::new().await;
    for (day, eur) in [("2024-01-01", 0.91), ("2024-01-03", 0.93)] {
        test_utils::mount_day(
            &h.server,
            date(day),
            wiremock::ResponseTemplate::new(200)
                .set_body_string(test_utils::rates_body(date(day), eur, 0.78)),
        )
        .await;
    }
    test_utils::mount_day(&h.server, date("2024-01-02"), wiremock::ResponseTemplate::new(500)).await;

    h.send("/get_historical_rates 2024-01-01 2024-01-03").await;

    let series = h.rates.query_series("EUR", date("2024-01-01")).await.unwrap();
    assert_eq!(
        series,
        vec![(date("2024-01-01"), 0.91), (date("2024-01-03"), 0.93)]
    );

    let sent = h.chat.sent_texts();
    assert_eq!(sent.len(), 2);
    assert!(sent[1].contains("2024-01-02"));
    assert!(sent[1].contains("HTTP 500"));

    let edits = h.chat.edits();
    // Two stored days plus the completion notice.
    assert_eq!(edits.len(), 3);
    assert!(edits[1].1.contains("66%"));
    assert!(edits[1].1.contains("Days left: 1"));
    assert!(edits[2].1.contains("2024-01-01 — 2024-01-03"));
}

#[test_log::test(tokio::test)]
async fn test_reversed_range_is_rejected_before_any_io() {
    let h = Harness::new().await;

    h.send("/get_historical_rates 2024-03-10 2024-03-01").await;

    assert!(h.server.received_requests().await.unwrap().is_empty());
    assert!(h.rates.is_empty().await);
    let sent = h.chat.sent_texts();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].contains("must not be after"));
    assert!(h.chat.edits().is_empty());
}

#[test_log::test(tokio::test)]
async fn test_malformed_arguments_get_usage() {
    let h = Harness::new().await;

    h.send("/get_historical_rates 2024-01-01").await;
    h.send("/get_historical_rates yesterday today").await;

    assert!(h.server.received_requests().await.unwrap().is_empty());
    let sent = h.chat.sent_texts();
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|text| text.contains("YYYY-MM-DD YYYY-MM-DD")));
    assert!(sent[1].contains("yesterday"));
}

#[test_log::test(tokio::test)]
async fn test_repeated_backfill_is_idempotent() {
    let h = Harness::new().await;
    for day in ["2024-02-01", "2024-02-02"] {
        test_utils::mount_day(
            &h.server,
            date(day),
            wiremock::ResponseTemplate::new(200)
                .set_body_string(test_utils::rates_body(date(day), 0.9, 0.8)),
        )
        .await;
    }

    h.send("/get_historical_rates 2024-02-01 2024-02-02").await;
    let first = h.rates.records().await;
    h.send("/get_historical_rates 2024-02-01 2024-02-02").await;

    assert_eq!(first.len(), 4);
    assert_eq!(h.rates.records().await, first);
}

#[test_log::test(tokio::test)]
async fn test_store_failure_aborts_run() {
    let h = Harness::with_store(Some(Arc::new(test_utils::DownStore))).await;
    for day in ["2024-01-01", "2024-01-02"] {
        test_utils::mount_day(
            &h.server,
            date(day),
            wiremock::ResponseTemplate::new(200)
                .set_body_string(test_utils::rates_body(date(day), 0.9, 0.8)),
        )
        .await;
    }

    h.send("/get_historical_rates 2024-01-01 2024-01-02").await;

    // The first day fails to persist; the second is never fetched.
    assert_eq!(h.server.received_requests().await.unwrap().len(), 1);
    let sent = h.chat.sent_texts();
    assert_eq!(sent.len(), 2);
    assert!(sent[1].starts_with("⚠️ /get_historical_rates failed"));
    assert!(sent[1].contains("database unavailable"));
    assert!(h.chat.edits().is_empty());
}

#[test_log::test(tokio::test)]
async fn test_get_rates_stores_latest_snapshot() {
    let h = Harness::new().await;
    test_utils::mount_latest(&h.server, test_utils::rates_body(date("2024-05-05"), 0.92, 0.79)).await;

    h.send("/get_rates").await;

    assert_eq!(h.rates.len().await, 2);
    let sent = h.chat.sent_texts();
    assert_eq!(sent, vec!["Exchange rates for 2 currencies stored for 2024-05-05."]);
}

#[test_log::test(tokio::test)]
async fn test_plot_sends_chart() {
    let h = Harness::new().await;
    for (day, eur) in [("2024-12-01", 0.94), ("2024-12-02", 0.95), ("2024-12-03", 0.93)] {
        h.rates
            .upsert_day(
                "USD",
                date(day),
                &[("EUR".to_string(), eur)].into_iter().collect(),
            )
            .await
            .unwrap();
    }

    h.send("/plot eur 2024-12-01").await;
    h.send("/plot JPY 2024-12-01").await;

    let events = h.chat.events();
    assert_eq!(events.len(), 2);
    match &events[0] {
        ChatEvent::Photo { caption, bytes } => {
            assert!(caption.starts_with("USD → EUR"));
            assert!(*bytes > 0);
        }
        other => panic!("Expected a chart, got {other:?}"),
    }
    assert!(matches!(&events[1], ChatEvent::Sent { text, .. } if text.contains("No rates stored for JPY")));
}

#[test_log::test(tokio::test)]
async fn test_message_log_commands() {
    let h = Harness::new().await;

    h.send("hello").await;
    h.send("world").await;
    assert_eq!(h.messages.all().await.len(), 2);
    assert_eq!(h.messages.all().await[0].username.as_deref(), Some("alice"));

    h.send("/update_all_messages").await;
    h.send("/return_all_messages").await;
    h.send("/delete_all_messages").await;

    let sent = h.chat.sent_texts();
    // Echo of text and username for both messages.
    assert_eq!(&sent[..4], ["hello", "alice", "world", "alice"]);
    assert_eq!(sent[4], "Updated 2 messages.");
    assert_eq!(sent[5], "hello)\nworld)");
    assert_eq!(sent[6], "Deleted 2 messages.");
    assert!(h.messages.all().await.is_empty());
}

#[test_log::test(tokio::test)]
async fn test_help_and_unknown_commands() {
    let h = Harness::new().await;

    h.send("/help").await;
    h.send("/frobnicate").await;

    let sent = h.chat.sent_texts();
    assert!(sent[0].contains("/get_historical_rates"));
    assert!(sent[0].contains("/plot"));
    assert!(sent[0].contains("/help"));
    assert!(sent[1].contains("Unknown command /frobnicate"));
}

#[test_log::test(tokio::test)]
async fn test_long_message_log_is_split() {
    let h = Harness::new().await;
    let line = "x".repeat(1000);
    for _ in 0..9 {
        h.send(&line).await;
    }

    h.send("/return_all_messages").await;

    // Nine echoes, nine usernames, then the log itself.
    let replies = &h.chat.sent_texts()[18..];
    assert!(replies.len() > 1);
    assert!(replies.iter().all(|r| r.chars().count() <= 4096));
    assert_eq!(replies.join("\n"), vec![line; 9].join("\n"));
}

#[test_log::test(tokio::test)]
async fn test_plot_window_out_of_range_is_reported() {
    let chart = ChartConfig {
        since_days: i64::MAX,
        ..ChartConfig::default()
    };
    let h = Harness::build(None, chart).await;

    h.send("/plot EUR").await;

    let sent = h.chat.sent_texts();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].starts_with("⚠️ /plot failed"));
    assert!(sent[0].contains("out of range"));
}

#[test_log::test(tokio::test)]
async fn test_commands_for_other_bots_are_ignored() {
    let mut h = Harness::new().await;
    h.dispatcher.set_bot_username("rate_bot");

    h.send("/help@other_bot").await;
    h.send("/get_historical_rates@other_bot 2024-03-10 2024-03-01").await;
    assert!(h.chat.events().is_empty());
    assert!(h.messages.all().await.is_empty());

    h.send("/help@Rate_Bot").await;
    h.send("/help").await;
    let sent = h.chat.sent_texts();
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|text| text.contains("/plot")));
}
