//! Side tag and message shapes
//!
//! The engine consumes `NewOrder` and `ModifyOrder` messages and returns an
//! `ExecResult` from every submit/modify. Sequence numbers and timestamps
//! are pass-through; the matcher does not impose its own clock.

use serde::{Deserialize, Serialize};

use crate::flags::Flags;
use crate::ids::{OrderId, Quantity, SeqNo, Tick, TsNanos, UserId};

/// Order side (buyer or seller).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Side {
    /// Buy order (bid)
    Bid = 0,
    /// Sell order (ask)
    Ask = 1,
}

impl Side {
    /// Get the opposite side.
    pub fn opposite(self) -> Side {
        match self {
            Side::Bid => Side::Ask,
            Side::Ask => Side::Bid,
        }
    }

    /// Sentinel best price meaning "this side is empty".
    ///
    /// The minimum representable tick is reserved for an empty bid side,
    /// the maximum for an empty ask side; any non-sentinel best must
    /// correspond to a non-empty level.
    pub const fn empty_sentinel(self) -> Tick {
        match self {
            Side::Bid => Tick::MIN,
            Side::Ask => Tick::MAX,
        }
    }

    /// Price bound used when this side submits a market order: the most
    /// permissive bound, so only book emptiness stops the sweep.
    pub const fn market_bound(self) -> Tick {
        match self {
            Side::Bid => Tick::MAX,
            Side::Ask => Tick::MIN,
        }
    }

    /// Crossing check for a taker on this side against the opposite best.
    /// Equality is a cross: the resting order always wins price.
    pub fn crosses(self, best_opposite: Tick, bound: Tick) -> bool {
        match self {
            Side::Bid => best_opposite <= bound,
            Side::Ask => best_opposite >= bound,
        }
    }

    /// True if `px` is strictly more aggressive than `best` on this side.
    /// Equality never improves the cached best.
    pub fn improves(self, px: Tick, best: Tick) -> bool {
        match self {
            Side::Bid => px > best,
            Side::Ask => px < best,
        }
    }
}

/// A new limit or market order message.
///
/// `price` is ignored when the message is dispatched as a market order.
/// `qty` must be positive to have any effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub seq: SeqNo,
    pub ts: TsNanos,
    pub id: OrderId,
    pub user: UserId,
    pub side: Side,
    pub price: Tick,
    pub qty: Quantity,
    pub flags: Flags,
}

/// A modify message for an existing resting order.
///
/// The side is taken from the engine's indexed record, never from the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifyOrder {
    pub seq: SeqNo,
    pub ts: TsNanos,
    pub id: OrderId,
    pub new_price: Tick,
    pub new_qty: Quantity,
    pub flags: Flags,
}

/// Outcome of a submit or modify.
///
/// For a resting limit, `remaining` is the quantity now on the book. For a
/// market or IOC submission, `remaining` is the unfilled discard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExecResult {
    pub filled: Quantity,
    pub remaining: Quantity,
}

impl ExecResult {
    pub const fn new(filled: Quantity, remaining: Quantity) -> Self {
        Self { filled, remaining }
    }

    /// True if nothing was filled and nothing remains.
    pub const fn is_zero(self) -> bool {
        self.filled == 0 && self.remaining == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::Bid.opposite(), Side::Ask);
        assert_eq!(Side::Ask.opposite(), Side::Bid);
    }

    #[test]
    fn test_side_sentinels() {
        assert_eq!(Side::Bid.empty_sentinel(), Tick::MIN);
        assert_eq!(Side::Ask.empty_sentinel(), Tick::MAX);
        assert_eq!(Side::Bid.market_bound(), Tick::MAX);
        assert_eq!(Side::Ask.market_bound(), Tick::MIN);
    }

    #[test]
    fn test_crossing_includes_equality() {
        // Buyer bound 105 against best ask
        assert!(Side::Bid.crosses(104, 105));
        assert!(Side::Bid.crosses(105, 105));
        assert!(!Side::Bid.crosses(106, 105));
        // Seller bound 105 against best bid
        assert!(Side::Ask.crosses(106, 105));
        assert!(Side::Ask.crosses(105, 105));
        assert!(!Side::Ask.crosses(104, 105));
    }

    #[test]
    fn test_improvement_is_strict() {
        assert!(Side::Bid.improves(106, 105));
        assert!(!Side::Bid.improves(105, 105));
        assert!(!Side::Bid.improves(104, 105));
        assert!(Side::Ask.improves(104, 105));
        assert!(!Side::Ask.improves(105, 105));
        // Any real price improves on the empty sentinel
        assert!(Side::Bid.improves(0, Side::Bid.empty_sentinel()));
        assert!(Side::Ask.improves(0, Side::Ask.empty_sentinel()));
    }

    #[test]
    fn test_exec_result_default_is_zero() {
        assert!(ExecResult::default().is_zero());
        assert!(!ExecResult::new(1, 0).is_zero());
    }

    #[test]
    fn test_new_order_serde_roundtrip() {
        let o = NewOrder {
            seq: 7,
            ts: 1_700_000_000_000_000_000,
            id: 42,
            user: 9001,
            side: Side::Bid,
            price: 105,
            qty: 5,
            flags: Flags::IOC,
        };
        let json = serde_json::to_string(&o).unwrap();
        let back: NewOrder = serde_json::from_str(&json).unwrap();
        assert_eq!(o, back);
    }
}
