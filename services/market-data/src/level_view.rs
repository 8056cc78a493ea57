//! Aggregated level view
//!
//! Per-side map of (price, total size) used for quote sampling during
//! replay. Prices are keyed by their value quantized to 1e-8 so that
//! equal feed prices land on the same level regardless of floating-point
//! representation.

use std::collections::BTreeMap;

use types::prelude::Side;

/// Quantize a feed price to a stable integer key (1e-8 resolution).
pub fn quantize(px: f64) -> i64 {
    (px * 1e8).round() as i64
}

#[derive(Debug, Clone, Copy)]
struct SizedLevel {
    px: f64,
    sz: f64,
}

/// Aggregated (price, size) view of both sides.
#[derive(Debug, Default)]
pub struct LevelView {
    bids: BTreeMap<i64, SizedLevel>,
    asks: BTreeMap<i64, SizedLevel>,
}

impl LevelView {
    pub fn new() -> Self {
        Self::default()
    }

    fn side_map(&self, side: Side) -> &BTreeMap<i64, SizedLevel> {
        match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        }
    }

    /// Set the total size at a price; non-positive sizes remove the level.
    pub fn set_level(&mut self, side: Side, px: f64, total_sz: f64) {
        let map = match side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        };
        let key = quantize(px);
        if total_sz <= 0.0 {
            map.remove(&key);
        } else {
            map.insert(key, SizedLevel { px, sz: total_sz });
        }
    }

    /// Best price on a side, NaN when empty.
    pub fn best_px(&self, side: Side) -> f64 {
        let map = self.side_map(side);
        let entry = match side {
            Side::Bid => map.iter().next_back(),
            Side::Ask => map.iter().next(),
        };
        entry.map(|(_, l)| l.px).unwrap_or(f64::NAN)
    }

    /// Size at the best price, 0 when empty.
    pub fn best_sz(&self, side: Side) -> f64 {
        let map = self.side_map(side);
        let entry = match side {
            Side::Bid => map.iter().next_back(),
            Side::Ask => map.iter().next(),
        };
        entry.map(|(_, l)| l.sz).unwrap_or(0.0)
    }

    pub fn depth(&self, side: Side) -> usize {
        self.side_map(side).len()
    }

    pub fn clear(&mut self) {
        self.bids.clear();
        self.asks.clear();
    }
}
