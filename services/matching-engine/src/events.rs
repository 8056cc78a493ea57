//! Engine events and the logger sink
//!
//! The matcher reports accepted orders, executed trades, cancels, and
//! modifications to an injected [`EventLogger`]. The logger is a pure
//! sink: it must be O(1)-cheap or hand off elsewhere, and it must not
//! re-enter the matcher.

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use types::prelude::{Flags, OrderId, Quantity, SeqNo, Side, Tick, TsNanos, UserId};

/// How an accepted order was dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderKind {
    Limit,
    Market,
}

/// An order passed validation and entered matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAccepted {
    pub seq: SeqNo,
    pub ts: TsNanos,
    pub id: OrderId,
    pub user: UserId,
    pub side: Side,
    /// Limit price; carried through unchanged for market orders.
    pub price: Tick,
    pub qty: Quantity,
    pub flags: Flags,
    pub kind: OrderKind,
}

/// One fill between the incoming taker and a resting maker.
///
/// `price` is the maker's level price; `ts` and `seq` are the taker's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeExecuted {
    pub seq: SeqNo,
    pub ts: TsNanos,
    pub taker_id: OrderId,
    pub maker_id: OrderId,
    pub taker_user: UserId,
    pub maker_user: UserId,
    /// Taker side.
    pub side: Side,
    pub price: Tick,
    pub qty: Quantity,
}

/// A resting order left the book without trading (explicit cancel,
/// modify-to-zero, or self-trade prevention).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCanceled {
    pub id: OrderId,
    pub side: Side,
    pub price: Tick,
    /// Remaining quantity removed from the book.
    pub qty: Quantity,
    pub ts: TsNanos,
}

/// A resting order was altered. In-place size changes keep time priority;
/// a price change requeues at the tail of the new level (`requeued`), and
/// the resubmission reports its own accept/trade events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderModified {
    pub id: OrderId,
    pub side: Side,
    pub price: Tick,
    pub qty: Quantity,
    pub prev_price: Tick,
    pub prev_qty: Quantity,
    pub requeued: bool,
    pub ts: TsNanos,
}

/// Tagged union of everything the matcher reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookEvent {
    Accepted(OrderAccepted),
    Trade(TradeExecuted),
    Canceled(OrderCanceled),
    Modified(OrderModified),
}

/// Sink for engine events. Implementations must not call back into the
/// engine from any of these hooks.
pub trait EventLogger {
    fn on_accept(&mut self, ev: &OrderAccepted);
    fn on_trade(&mut self, ev: &TradeExecuted);
    fn on_cancel(&mut self, ev: &OrderCanceled);
    fn on_modify(&mut self, ev: &OrderModified);
}

/// In-memory logger with a shared buffer, for tests and tooling.
///
/// Clones share the same buffer, so a test can hand one clone to the
/// engine and keep another to inspect what was emitted.
#[derive(Debug, Clone, Default)]
pub struct RecordingLogger {
    events: Rc<RefCell<Vec<BookEvent>>>,
}

impl RecordingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn events(&self) -> Vec<BookEvent> {
        self.events.borrow().clone()
    }

    /// Recorded trades only, in emission order.
    pub fn trades(&self) -> Vec<TradeExecuted> {
        self.events
            .borrow()
            .iter()
            .filter_map(|ev| match ev {
                BookEvent::Trade(t) => Some(*t),
                _ => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }
}

impl EventLogger for RecordingLogger {
    fn on_accept(&mut self, ev: &OrderAccepted) {
        self.events.borrow_mut().push(BookEvent::Accepted(*ev));
    }

    fn on_trade(&mut self, ev: &TradeExecuted) {
        self.events.borrow_mut().push(BookEvent::Trade(*ev));
    }

    fn on_cancel(&mut self, ev: &OrderCanceled) {
        self.events.borrow_mut().push(BookEvent::Canceled(*ev));
    }

    fn on_modify(&mut self, ev: &OrderModified) {
        self.events.borrow_mut().push(BookEvent::Modified(*ev));
    }
}
