//! Price level with an intrusive FIFO queue
//!
//! A level chains the resting orders at one price in arrival order to
//! enforce time priority. Nodes are stored in a slab arena owned by the
//! engine and linked through handles rather than pointers; a node is never
//! moved after insertion, only linked, unlinked, and disposed. All level
//! operations are O(1).

use slab::Slab;
use types::prelude::{Flags, OrderId, Quantity, TsNanos, UserId};

/// Stable handle to an `OrderNode` inside the engine's arena.
pub type NodeHandle = usize;

/// Arena holding every resting order node of one engine.
pub type NodeArena = Slab<OrderNode>;

/// A resting order, embedded in its level's FIFO chain.
#[derive(Debug, Clone)]
pub struct OrderNode {
    pub id: OrderId,
    pub user: UserId,
    /// Remaining quantity; always positive while resting.
    pub qty: Quantity,
    pub ts: TsNanos,
    pub flags: Flags,
    pub(crate) prev: Option<NodeHandle>,
    pub(crate) next: Option<NodeHandle>,
}

impl OrderNode {
    pub fn new(id: OrderId, user: UserId, qty: Quantity, ts: TsNanos, flags: Flags) -> Self {
        Self {
            id,
            user,
            qty,
            ts,
            flags,
            prev: None,
            next: None,
        }
    }
}

/// FIFO of resting orders at a single price.
///
/// Maintains head, tail, and a cached total of the chained quantities.
/// The level container persists even while empty; emptiness is
/// `head == None`.
#[derive(Debug, Default)]
pub struct LevelFifo {
    head: Option<NodeHandle>,
    tail: Option<NodeHandle>,
    total_qty: Quantity,
}

impl LevelFifo {
    pub fn head(&self) -> Option<NodeHandle> {
        self.head
    }

    pub fn tail(&self) -> Option<NodeHandle> {
        self.tail
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Cached sum of the remaining quantities chained from head to tail.
    pub fn total_qty(&self) -> Quantity {
        self.total_qty
    }

    /// Append a node at the tail (time priority) and grow the total.
    ///
    /// The node must already be in the arena with its quantity set.
    pub fn push_back(&mut self, arena: &mut NodeArena, handle: NodeHandle) {
        let prev_tail = self.tail;
        {
            let node = &mut arena[handle];
            node.prev = prev_tail;
            node.next = None;
        }
        match prev_tail {
            Some(t) => arena[t].next = Some(handle),
            None => self.head = Some(handle),
        }
        self.tail = Some(handle);
        self.total_qty += arena[handle].qty;
    }

    /// Unlink a node and shrink the total. Does not free the node; the
    /// caller disposes it through the arena (or re-links it elsewhere).
    pub fn unlink(&mut self, arena: &mut NodeArena, handle: NodeHandle) {
        let (prev, next, qty) = {
            let node = &arena[handle];
            (node.prev, node.next, node.qty)
        };
        match prev {
            Some(p) => arena[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => arena[n].prev = prev,
            None => self.tail = prev,
        }
        {
            let node = &mut arena[handle];
            node.prev = None;
            node.next = None;
        }
        self.total_qty -= qty;
    }

    /// Adjust the cached total after an in-place quantity change on a
    /// chained node.
    pub(crate) fn add_total(&mut self, delta: Quantity) {
        self.total_qty += delta;
    }

    /// Iterate handles from head to tail.
    pub fn iter<'a>(&self, arena: &'a NodeArena) -> LevelIter<'a> {
        LevelIter {
            arena,
            cur: self.head,
        }
    }
}

/// FIFO-order iterator over the handles of a level.
pub struct LevelIter<'a> {
    arena: &'a NodeArena,
    cur: Option<NodeHandle>,
}

impl<'a> Iterator for LevelIter<'a> {
    type Item = NodeHandle;

    fn next(&mut self) -> Option<NodeHandle> {
        let handle = self.cur?;
        self.cur = self.arena[handle].next;
        Some(handle)
    }
}
