//! Matching Engine
//!
//! Deterministic in-memory limit order book for a single symbol,
//! matching with strict price-time (FIFO) priority under a
//! single-threaded event loop.
//!
//! **Performance targets:**
//! - Sub-microsecond per-event latency on one logical core
//! - O(1) amortized best-of-book maintenance
//! - O(1) id lookup for cancel/modify
//!
//! **Key invariants:**
//! - Books never cross at rest
//! - Level totals equal the sum of their resting quantities
//! - The id index and the resting nodes are a bijection
//! - Conservation: filled + remaining equals the submitted quantity

pub mod book;
pub mod engine;
pub mod events;

pub use book::ladder::{ContigLadder, PriceBand, PriceLadder, SparseLadder};
pub use engine::{BookCore, RestingOrder};
