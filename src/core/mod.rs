//! Core business logic abstractions

pub mod chat;
pub mod config;
pub mod ingest;
pub mod log;
pub mod progress;
pub mod rates;
pub mod store;

// Re-export main types for cleaner imports
pub use chat::{ChatClient, IncomingMessage, MessageRef, Sender};
pub use ingest::{IngestError, IngestObserver, IngestReport, IngestionRequest, Ingestor};
pub use rates::{RateDay, RateRecord, RateSnapshot, RateSource, SourceError};
pub use store::{LoggedMessage, MessageStore, RateStore, StoreError};
