//! Market Data Service
//!
//! Everything between a recorded feed and the matching core: normalized
//! CSV ingestion, the TAQ quote/trade writer, an aggregated level view
//! for sampling, and the replayer that drives a book from feed events at
//! a fixed quote cadence with optional real-time pacing.

pub mod ingest;
pub mod level_view;
pub mod replay;
pub mod taq;

pub use ingest::{load_normalized_csv, NormEvent, NormKind};
pub use replay::{ReplayOptions, ReplayStats, Replayer};
pub use taq::TaqWriter;
