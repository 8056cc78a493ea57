//! Matching engine core
//!
//! `BookCore` owns the two price ladders, the node arena, and the id
//! index, and implements the submit/cancel/modify state machine with
//! strict price-time priority. Operations are applied one at a time on a
//! single thread; the engine is not reentrant and imposes no clock of its
//! own.
//!
//! Ordinary outcomes are encoded in [`ExecResult`] and `bool`. Rejected
//! messages (non-positive quantity, out-of-band price, duplicate id,
//! POST_ONLY that would cross, FOK shortfall) return the zero result and
//! leave the book untouched.

use std::collections::HashMap;

use types::prelude::{
    ExecResult, Flags, ModifyOrder, NewOrder, OrderId, Quantity, SeqNo, Side, Tick, TsNanos,
    UserId,
};

use crate::book::ladder::PriceLadder;
use crate::book::level::{NodeArena, NodeHandle, OrderNode};
use crate::events::{
    EventLogger, OrderAccepted, OrderCanceled, OrderKind, OrderModified, TradeExecuted,
};

/// Index payload: where a resting order lives.
#[derive(Debug, Clone, Copy)]
struct IdEntry {
    side: Side,
    px: Tick,
    handle: NodeHandle,
}

/// Snapshot view of one resting order, used by persistence and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestingOrder {
    pub id: OrderId,
    pub user: UserId,
    pub qty: Quantity,
    pub ts: TsNanos,
    pub flags: Flags,
}

/// Taker context threaded through one sweep.
#[derive(Clone, Copy)]
struct Taker {
    side: Side,
    user: UserId,
    flags: Flags,
    seq: SeqNo,
    ts: TsNanos,
    id: OrderId,
}

/// Single-symbol matching engine over two price ladders.
///
/// Each instance owns all of its state; multiple engines may coexist in
/// one process.
pub struct BookCore<L: PriceLadder> {
    bids: L,
    asks: L,
    arena: NodeArena,
    ids: HashMap<OrderId, IdEntry>,
    logger: Option<Box<dyn EventLogger>>,
}

impl<L: PriceLadder> BookCore<L> {
    /// Build an engine from one ladder per side.
    ///
    /// # Panics
    /// Panics if the ladders are not a bid/ask pair.
    pub fn new(bids: L, asks: L) -> Self {
        Self::build(bids, asks, None)
    }

    /// Build an engine with an event logger attached.
    pub fn with_logger(bids: L, asks: L, logger: Box<dyn EventLogger>) -> Self {
        Self::build(bids, asks, Some(logger))
    }

    fn build(bids: L, asks: L, logger: Option<Box<dyn EventLogger>>) -> Self {
        assert!(
            bids.side() == Side::Bid && asks.side() == Side::Ask,
            "ladder sides are swapped"
        );
        Self {
            bids,
            asks,
            arena: NodeArena::new(),
            ids: HashMap::new(),
            logger,
        }
    }

    // ── Public operations ───────────────────────────────────────────

    /// Trade as much of `o.qty` as crosses `o.price` against the opposite
    /// side, then rest any remainder at `o.price`.
    ///
    /// Flag handling: IOC discards the leftover instead of resting it
    /// (`remaining` reports the discard); FOK fills in full or does
    /// nothing; POST_ONLY rejects the order if it would trade on arrival.
    pub fn submit_limit(&mut self, o: NewOrder) -> ExecResult {
        if o.qty <= 0 {
            return ExecResult::default();
        }
        if !self.same_ladder(o.side).contains(o.price) {
            return ExecResult::default();
        }
        if self.ids.contains_key(&o.id) {
            return ExecResult::default();
        }
        if o.flags.contains(Flags::POST_ONLY) && self.would_cross(o.side, o.price) {
            return ExecResult::default();
        }
        if o.flags.contains(Flags::FOK)
            && self.crossable_qty(o.side, o.user, o.flags, o.price, o.qty) < o.qty
        {
            return ExecResult::default();
        }

        self.log_accept(&o, OrderKind::Limit);

        let taker = Taker {
            side: o.side,
            user: o.user,
            flags: o.flags,
            seq: o.seq,
            ts: o.ts,
            id: o.id,
        };
        let filled = {
            let Self {
                bids,
                asks,
                arena,
                ids,
                logger,
            } = self;
            let opp = match o.side {
                Side::Bid => asks,
                Side::Ask => bids,
            };
            Self::sweep(opp, arena, ids, logger, taker, o.qty, o.price)
        };

        let leftover = o.qty - filled;
        if leftover > 0 && !o.flags.contains(Flags::IOC) {
            self.rest(&o, leftover);
        }
        ExecResult::new(filled, leftover)
    }

    /// Trade against the opposite side with no price bound; never rest.
    /// The leftover is discarded. POST_ONLY is meaningless here and is
    /// ignored; FOK is honored via a pre-scan.
    pub fn submit_market(&mut self, o: NewOrder) -> ExecResult {
        if o.qty <= 0 {
            return ExecResult::default();
        }
        let bound = o.side.market_bound();
        if o.flags.contains(Flags::FOK)
            && self.crossable_qty(o.side, o.user, o.flags, bound, o.qty) < o.qty
        {
            return ExecResult::default();
        }

        self.log_accept(&o, OrderKind::Market);

        let taker = Taker {
            side: o.side,
            user: o.user,
            flags: o.flags,
            seq: o.seq,
            ts: o.ts,
            id: o.id,
        };
        let filled = {
            let Self {
                bids,
                asks,
                arena,
                ids,
                logger,
            } = self;
            let opp = match o.side {
                Side::Bid => asks,
                Side::Ask => bids,
            };
            Self::sweep(opp, arena, ids, logger, taker, o.qty, bound)
        };
        ExecResult::new(filled, o.qty - filled)
    }

    /// Remove a resting order by id. Returns false if the id is unknown.
    pub fn cancel(&mut self, id: OrderId) -> bool {
        let entry = match self.ids.get(&id) {
            Some(e) => *e,
            None => return false,
        };
        let node = self.remove_entry(entry);
        if let Some(lg) = self.logger.as_mut() {
            lg.on_cancel(&OrderCanceled {
                id,
                side: entry.side,
                price: entry.px,
                qty: node.qty,
                ts: node.ts,
            });
        }
        true
    }

    /// Alter the price and/or quantity of a resting order.
    ///
    /// Same price: size is adjusted in place (time priority preserved);
    /// `new_qty <= 0` behaves exactly like [`cancel`](Self::cancel).
    /// Different price: the order is cancelled and resubmitted as a fresh
    /// limit carrying the original id, user, and side; the resubmission
    /// may trade, rest, or both, and its result is returned. Time
    /// priority is lost at the new price.
    pub fn modify(&mut self, m: ModifyOrder) -> ExecResult {
        let entry = match self.ids.get(&m.id) {
            Some(e) => *e,
            None => return ExecResult::default(),
        };

        if m.new_price == entry.px {
            if m.new_qty <= 0 {
                let node = self.remove_entry(entry);
                if let Some(lg) = self.logger.as_mut() {
                    lg.on_cancel(&OrderCanceled {
                        id: m.id,
                        side: entry.side,
                        price: entry.px,
                        qty: node.qty,
                        ts: m.ts,
                    });
                }
                return ExecResult::default();
            }

            let prev_qty = {
                let Self {
                    bids, asks, arena, ..
                } = self;
                let same = match entry.side {
                    Side::Bid => bids,
                    Side::Ask => asks,
                };
                let node = &mut arena[entry.handle];
                let prev_qty = node.qty;
                node.qty = m.new_qty;
                node.ts = m.ts;
                node.flags = m.flags;
                same.level_mut(entry.px).add_total(m.new_qty - prev_qty);
                prev_qty
            };
            if let Some(lg) = self.logger.as_mut() {
                lg.on_modify(&OrderModified {
                    id: m.id,
                    side: entry.side,
                    price: entry.px,
                    qty: m.new_qty,
                    prev_price: entry.px,
                    prev_qty,
                    requeued: false,
                    ts: m.ts,
                });
            }
            return ExecResult::default();
        }

        // Price changed: cancel-and-resubmit with fresh priority.
        let node = self.remove_entry(entry);
        if let Some(lg) = self.logger.as_mut() {
            lg.on_modify(&OrderModified {
                id: m.id,
                side: entry.side,
                price: m.new_price,
                qty: m.new_qty,
                prev_price: entry.px,
                prev_qty: node.qty,
                requeued: true,
                ts: m.ts,
            });
        }
        self.submit_limit(NewOrder {
            seq: m.seq,
            ts: m.ts,
            id: m.id,
            user: node.user,
            side: entry.side,
            price: m.new_price,
            qty: m.new_qty,
            flags: m.flags,
        })
    }

    /// True if no order rests on `side`. Relies on the best-cache
    /// consistency invariant, which holds after every public operation.
    pub fn is_side_empty(&self, side: Side) -> bool {
        self.same_ladder(side).best() == side.empty_sentinel()
    }

    // ── Read access ─────────────────────────────────────────────────

    /// Cached best price on `side`, or the side's sentinel when empty.
    pub fn best(&self, side: Side) -> Tick {
        self.same_ladder(side).best()
    }

    /// Total resting quantity at one price, 0 if no such level.
    pub fn total_at(&self, side: Side, px: Tick) -> Quantity {
        self.same_ladder(side)
            .level(px)
            .map(|l| l.total_qty())
            .unwrap_or(0)
    }

    /// Look up a resting order by id.
    pub fn order(&self, id: OrderId) -> Option<(Side, Tick, RestingOrder)> {
        let e = self.ids.get(&id)?;
        let node = &self.arena[e.handle];
        Some((e.side, e.px, Self::view(node)))
    }

    /// Orders at one level in FIFO order.
    pub fn level_orders(&self, side: Side, px: Tick) -> Vec<RestingOrder> {
        match self.same_ladder(side).level(px) {
            Some(level) => level.iter(&self.arena).map(|h| Self::view(&self.arena[h])).collect(),
            None => Vec::new(),
        }
    }

    /// Every non-empty level on `side`, most aggressive first, with its
    /// orders in FIFO order. Cold path: snapshots and audits.
    pub fn side_levels(&self, side: Side) -> Vec<(Tick, Vec<RestingOrder>)> {
        let ladder = self.same_ladder(side);
        ladder
            .nonempty_prices()
            .into_iter()
            .map(|px| (px, self.level_orders(side, px)))
            .collect()
    }

    /// Number of resting orders across both sides.
    pub fn resting_count(&self) -> usize {
        self.ids.len()
    }

    // ── Snapshot support ────────────────────────────────────────────

    /// Append a resting order directly onto a level, bypassing matching.
    /// Used when reloading book state from a snapshot; the id index is
    /// left untouched, so a [`rebuild_index_from_books`]
    /// (Self::rebuild_index_from_books) call must follow before normal
    /// operation resumes.
    pub fn restore_resting(&mut self, side: Side, px: Tick, order: RestingOrder) {
        let Self {
            bids, asks, arena, ..
        } = self;
        let same = match side {
            Side::Bid => bids,
            Side::Ask => asks,
        };
        let handle = arena.insert(OrderNode::new(
            order.id,
            order.user,
            order.qty,
            order.ts,
            order.flags,
        ));
        same.level_mut(px).push_back(arena, handle);
        if side.improves(px, same.best()) {
            same.set_best(px);
        }
    }

    /// Repopulate the id index from the resting books, e.g. after a
    /// snapshot load.
    pub fn rebuild_index_from_books(&mut self) {
        self.ids.clear();
        for side in [Side::Bid, Side::Ask] {
            let Self {
                bids,
                asks,
                arena,
                ids,
                ..
            } = self;
            let ladder = match side {
                Side::Bid => &*bids,
                Side::Ask => &*asks,
            };
            for px in ladder.nonempty_prices() {
                if let Some(level) = ladder.level(px) {
                    for handle in level.iter(arena) {
                        ids.insert(arena[handle].id, IdEntry { side, px, handle });
                    }
                }
            }
        }
    }

    // ── Invariant validator ─────────────────────────────────────────

    /// Walk the whole structure and panic on any violated invariant.
    /// Structures failing this check are not recoverable; callers should
    /// reload from a snapshot. Cold path, intended for tests and audits.
    pub fn check_invariants(&self) {
        let mut indexed_nodes = 0usize;
        for (id, e) in &self.ids {
            let node = self
                .arena
                .get(e.handle)
                .unwrap_or_else(|| panic!("index entry {} points at a freed node", id));
            assert_eq!(node.id, *id, "index id mismatch");
            assert!(node.qty > 0, "resting order {} has non-positive qty", id);
            let level = self
                .same_ladder(e.side)
                .level(e.px)
                .unwrap_or_else(|| panic!("indexed level missing for order {}", id));
            assert!(
                level.iter(&self.arena).any(|h| h == e.handle),
                "order {} not chained at its indexed level",
                id
            );
            indexed_nodes += 1;
        }

        let mut resting_nodes = 0usize;
        for side in [Side::Bid, Side::Ask] {
            let ladder = self.same_ladder(side);
            for px in ladder.nonempty_prices() {
                let level = ladder.level(px).expect("non-empty price without level");
                let mut sum = 0;
                for h in level.iter(&self.arena) {
                    let node = &self.arena[h];
                    assert!(node.qty > 0, "chained node with non-positive qty");
                    assert!(
                        self.ids.contains_key(&node.id),
                        "resting order {} missing from index",
                        node.id
                    );
                    sum += node.qty;
                    resting_nodes += 1;
                }
                assert_eq!(sum, level.total_qty(), "level total mismatch at {}", px);
            }

            let best = ladder.best();
            let prices = ladder.nonempty_prices();
            if prices.is_empty() {
                assert_eq!(best, side.empty_sentinel(), "stale best on empty side");
            } else {
                assert_eq!(best, prices[0], "best cache is not the most aggressive");
            }
        }
        assert_eq!(
            indexed_nodes, resting_nodes,
            "index and resting nodes are not a bijection"
        );

        let bid_best = self.bids.best();
        let ask_best = self.asks.best();
        if bid_best != Side::Bid.empty_sentinel() && ask_best != Side::Ask.empty_sentinel() {
            assert!(bid_best < ask_best, "book crossed at rest");
        }
    }

    // ── Internals ───────────────────────────────────────────────────

    fn same_ladder(&self, side: Side) -> &L {
        match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        }
    }

    fn opp_ladder(&self, taker_side: Side) -> &L {
        match taker_side {
            Side::Bid => &self.asks,
            Side::Ask => &self.bids,
        }
    }

    fn view(node: &OrderNode) -> RestingOrder {
        RestingOrder {
            id: node.id,
            user: node.user,
            qty: node.qty,
            ts: node.ts,
            flags: node.flags,
        }
    }

    fn log_accept(&mut self, o: &NewOrder, kind: OrderKind) {
        if let Some(lg) = self.logger.as_mut() {
            lg.on_accept(&OrderAccepted {
                seq: o.seq,
                ts: o.ts,
                id: o.id,
                user: o.user,
                side: o.side,
                price: o.price,
                qty: o.qty,
                flags: o.flags,
                kind,
            });
        }
    }

    /// True if a limit at `bound` on `taker_side` would trade on arrival.
    fn would_cross(&self, taker_side: Side, bound: Tick) -> bool {
        let opp = self.opp_ladder(taker_side);
        let best = opp.best();
        best != taker_side.opposite().empty_sentinel() && taker_side.crosses(best, bound)
    }

    /// Quantity available to a taker within `bound`, stopping early once
    /// `want` is reachable. With STP set, same-user resting quantity is
    /// excluded since it would be cancelled rather than traded.
    fn crossable_qty(
        &self,
        taker_side: Side,
        taker_user: UserId,
        flags: Flags,
        bound: Tick,
        want: Quantity,
    ) -> Quantity {
        let opp = self.opp_ladder(taker_side);
        let stp = flags.contains(Flags::STP);
        let mut avail = 0;
        for px in opp.nonempty_prices() {
            if !taker_side.crosses(px, bound) {
                break;
            }
            let level = match opp.level(px) {
                Some(l) => l,
                None => continue,
            };
            if stp {
                for h in level.iter(&self.arena) {
                    let node = &self.arena[h];
                    if node.user != taker_user {
                        avail += node.qty;
                    }
                }
            } else {
                avail += level.total_qty();
            }
            if avail >= want {
                break;
            }
        }
        avail
    }

    /// Consume from the opposite side while the bound crosses, strictly
    /// most-aggressive-first and FIFO within each level.
    fn sweep(
        opp: &mut L,
        arena: &mut NodeArena,
        ids: &mut HashMap<OrderId, IdEntry>,
        logger: &mut Option<Box<dyn EventLogger>>,
        taker: Taker,
        mut want: Quantity,
        bound: Tick,
    ) -> Quantity {
        let mut filled = 0;
        let empty = taker.side.opposite().empty_sentinel();
        let stp = taker.flags.contains(Flags::STP);

        while want > 0 {
            let best_px = opp.best();
            if best_px == empty {
                break;
            }
            if !taker.side.crosses(best_px, bound) {
                break;
            }

            let head = opp.level_mut(best_px).head();
            let h = match head {
                Some(h) => h,
                None => {
                    // Stale cache (e.g. after a level-ending cancel):
                    // advance to the next non-empty level.
                    let nxt = opp.next_best_after(best_px);
                    opp.set_best(nxt);
                    continue;
                }
            };

            if stp && arena[h].user == taker.user {
                // Cancel the resting same-user order; no trade, and the
                // taker's wanted quantity is untouched.
                opp.level_mut(best_px).unlink(arena, h);
                let node = arena.remove(h);
                ids.remove(&node.id);
                if !opp.has_nonempty_level(best_px) {
                    let nxt = opp.next_best_after(best_px);
                    opp.set_best(nxt);
                }
                if let Some(lg) = logger.as_mut() {
                    lg.on_cancel(&OrderCanceled {
                        id: node.id,
                        side: taker.side.opposite(),
                        price: best_px,
                        qty: node.qty,
                        ts: taker.ts,
                    });
                }
                continue;
            }

            let trade = want.min(arena[h].qty);
            arena[h].qty -= trade;
            opp.level_mut(best_px).add_total(-trade);
            filled += trade;
            want -= trade;

            if let Some(lg) = logger.as_mut() {
                lg.on_trade(&TradeExecuted {
                    seq: taker.seq,
                    ts: taker.ts,
                    taker_id: taker.id,
                    maker_id: arena[h].id,
                    taker_user: taker.user,
                    maker_user: arena[h].user,
                    side: taker.side,
                    price: best_px,
                    qty: trade,
                });
            }

            if arena[h].qty == 0 {
                opp.level_mut(best_px).unlink(arena, h);
                let node = arena.remove(h);
                ids.remove(&node.id);
                if !opp.has_nonempty_level(best_px) {
                    let nxt = opp.next_best_after(best_px);
                    opp.set_best(nxt);
                }
            }
        }

        filled
    }

    /// Rest the leftover of an accepted limit at its price.
    fn rest(&mut self, o: &NewOrder, leftover: Quantity) {
        let Self {
            bids,
            asks,
            arena,
            ids,
            ..
        } = self;
        let same = match o.side {
            Side::Bid => bids,
            Side::Ask => asks,
        };
        let handle = arena.insert(OrderNode::new(o.id, o.user, leftover, o.ts, o.flags));
        same.level_mut(o.price).push_back(arena, handle);
        if o.side.improves(o.price, same.best()) {
            same.set_best(o.price);
        }
        ids.insert(
            o.id,
            IdEntry {
                side: o.side,
                px: o.price,
                handle,
            },
        );
    }

    /// Unlink and free an indexed node, maintaining the best cache.
    fn remove_entry(&mut self, e: IdEntry) -> OrderNode {
        let node = {
            let Self {
                bids, asks, arena, ..
            } = self;
            let same = match e.side {
                Side::Bid => bids,
                Side::Ask => asks,
            };
            let was_best = same.best() == e.px;
            same.level_mut(e.px).unlink(arena, e.handle);
            let node = arena.remove(e.handle);
            if was_best && !same.has_nonempty_level(e.px) {
                let nxt = same.next_best_after(e.px);
                same.set_best(nxt);
            }
            node
        };
        self.ids.remove(&node.id);
        node
    }
}
