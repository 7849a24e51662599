pub mod backfill;
pub mod series;
pub mod setup;
pub mod ui;
