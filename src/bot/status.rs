use crate::core::chat::{ChatClient, MessageRef};
use crate::core::ingest::{IngestObserver, IngestReport, IngestionRequest};
use crate::core::progress::{self, IngestionProgress};
use crate::core::rates::SourceError;
use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::warn;

/// Reports an ingestion run through one chat message that is edited in place.
///
/// Per-day failures go out as separate notices so they stay visible after
/// the status message moves on. Chat errors are logged and never abort the
/// run.
pub struct ChatProgress<'a> {
    chat: &'a dyn ChatClient,
    chat_id: i64,
    status: Option<MessageRef>,
}

impl<'a> ChatProgress<'a> {
    pub fn new(chat: &'a dyn ChatClient, chat_id: i64) -> Self {
        Self {
            chat,
            chat_id,
            status: None,
        }
    }

    async fn edit_status(&self, text: &str) {
        let Some(status) = self.status else {
            warn!("No status message to edit");
            return;
        };
        if let Err(e) = self.chat.edit_text(status, text).await {
            warn!(error = %e, "Failed to edit status message");
        }
    }
}

fn failure_reason(error: &SourceError) -> String {
    match error.status() {
        Some(status) => format!("HTTP {status}"),
        None => error.to_string(),
    }
}

#[async_trait]
impl IngestObserver for ChatProgress<'_> {
    async fn started(&mut self, request: &IngestionRequest) {
        let text = progress::render_started(request.start(), request.end(), request.total_days());
        match self.chat.send_text(self.chat_id, &text).await {
            Ok(sent) => self.status = Some(sent),
            Err(e) => warn!(error = %e, "Failed to send status message"),
        }
    }

    async fn day_stored(&mut self, progress: &IngestionProgress) {
        self.edit_status(&progress.render()).await;
    }

    async fn day_failed(&mut self, date: NaiveDate, error: &SourceError) {
        let text = progress::render_day_failed(date, &failure_reason(error));
        if let Err(e) = self.chat.send_text(self.chat_id, &text).await {
            warn!(error = %e, "Failed to send failure notice");
        }
    }

    async fn completed(&mut self, request: &IngestionRequest, _report: &IngestReport) {
        self.edit_status(&progress::render_completed(request.start(), request.end()))
            .await;
    }
}
