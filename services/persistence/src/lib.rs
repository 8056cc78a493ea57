//! Persistence & Recovery
//!
//! Append-only operation log with per-record checksums, binary book
//! snapshots, recovery (snapshot + log-tail replay), and a JSONL event
//! sink. All formats are deterministic: writing the same state twice
//! yields identical bytes.
//!
//! The engine core knows nothing about any of this; everything here works
//! through the engine's public operations and the `EventLogger` sink.

pub mod event_log;
pub mod jsonl;
pub mod recovery;
pub mod snapshot;
