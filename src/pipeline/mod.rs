//! Ingestion Pipeline Module
//!
//! ```text
//! NewReading ─► validate ─► Reading Store (append)
//!                                │
//!                     last 50 readings of the stream
//!                                │
//!                     Feature Builder ─► Anomaly Scorer
//!                                               │
//!                          Reading Store (annotate) ◄┘
//! ```
//!
//! Forecasting is not part of this path; it runs on demand over the store.

pub mod ingest;

pub use ingest::{validate_payload, IngestError, IngestOutcome, IngestStats, IngestionOrchestrator};
