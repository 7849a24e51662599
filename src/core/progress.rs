//! Text rendering for ingestion progress.
//!
//! Nothing here performs I/O; the ingestion loop decides where the rendered
//! text goes (an edited chat message, a log line).

use chrono::NaiveDate;

pub const BAR_SEGMENTS: u32 = 10;
pub const FILLED_SEGMENT: &str = "🟩";
pub const EMPTY_SEGMENT: &str = "⬜";
pub const FRAMES: [&str; 8] = ["🌑", "🌒", "🌓", "🌔", "🌕", "🌖", "🌗", "🌘"];

const FIREWORKS: &str = "🎆✨🎇";

/// Progress of one ingestion run. Lives only as long as the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestionProgress {
    pub total_days: u32,
    pub processed_days: u32,
    pub current_date: NaiveDate,
}

impl IngestionProgress {
    pub fn new(total_days: u32, start: NaiveDate) -> Self {
        Self {
            total_days,
            processed_days: 0,
            current_date: start,
        }
    }

    /// Integer percentage, floored and capped at 100.
    pub fn percent(&self) -> u32 {
        percent(self.processed_days, self.total_days)
    }

    pub fn remaining_days(&self) -> u32 {
        self.total_days.saturating_sub(self.processed_days)
    }

    pub fn render(&self) -> String {
        render_progress(self.processed_days, self.total_days, self.current_date)
    }
}

pub fn percent(processed_days: u32, total_days: u32) -> u32 {
    if total_days == 0 {
        return 0;
    }
    let pct = u64::from(processed_days) * 100 / u64::from(total_days);
    pct.min(100) as u32
}

/// `[🟩🟩⬜...] 20%` with exactly [`BAR_SEGMENTS`] segments.
pub fn render_bar(percent: u32) -> String {
    let filled = (percent.min(100) / 10).min(BAR_SEGMENTS);
    format!(
        "[{}{}] {}%",
        FILLED_SEGMENT.repeat(filled as usize),
        EMPTY_SEGMENT.repeat((BAR_SEGMENTS - filled) as usize),
        percent.min(100)
    )
}

pub fn frame(processed_days: u32) -> &'static str {
    FRAMES[processed_days as usize % FRAMES.len()]
}

pub fn render_progress(processed_days: u32, total_days: u32, current_date: NaiveDate) -> String {
    let progress = IngestionProgress {
        total_days,
        processed_days,
        current_date,
    };
    let pct = progress.percent();
    format!(
        "⏳ Loading rates...\n{}\n{} Processed {}\n📅 Days left: {}",
        render_bar(pct),
        frame(processed_days),
        current_date.format("%Y-%m-%d"),
        progress.remaining_days()
    )
}

pub fn render_started(start: NaiveDate, end: NaiveDate, total_days: u32) -> String {
    format!("⏳ Loading rates for {start} — {end} ({total_days} days)...")
}

pub fn render_day_failed(date: NaiveDate, reason: &str) -> String {
    format!("⚠️ Could not load rates for {date}: {reason}")
}

pub fn render_completed(start: NaiveDate, end: NaiveDate) -> String {
    format!("✅ {FIREWORKS} All rates for {start} — {end} loaded! {FIREWORKS}\nThanks for using the bot!")
}
