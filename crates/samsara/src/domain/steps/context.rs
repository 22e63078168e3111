//! Contexts - Completed Steps On The Timeline
//!
//! A completed step persists as a context: the recipe to recompute its value
//! (body + inputs), the tick range it covered, and the accounting the
//! eviction policy feeds on (exclusive time, last access, resident bytes).
//!
//! # The Ownership Triangle
//!
//! ```text
//!   Pool ──owns──▶ Phantom ──weak──▶ FullContext
//!     ▲                                   │
//!     └────────── pool_index ─────────────┘
//! ```
//!
//! The pool owns phantoms; a phantom references its context weakly so heap
//! residue never extends a context's lifetime; the context's `pool_index`
//! back-reference is repaired by the pool's index-change callback on every
//! move (law M-002). A dead weak reference ranks as [`EVICT_NOW`] and is
//! dropped silently when popped.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::domain::clock::Time;
use crate::domain::cost::{reclaim_cost, CostGroup, CostPolicy, EVICT_NOW};
use crate::domain::pool::PoolEntry;
use crate::domain::timeline::Tock;

use super::handle::{Handle, ValueCell};
use super::record::BindFn;

/// The implicit outermost context at tick 0.
///
/// Holds top-level values minted outside any bind. Never evictable, never
/// replayed.
#[derive(Default)]
pub struct RootContext {
    values: RefCell<std::collections::BTreeMap<Tock, Rc<ValueCell>>>,
}

impl RootContext {
    /// Create an empty root context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adopt a top-level value.
    pub fn adopt(&self, cell: Rc<ValueCell>) {
        self.values.borrow_mut().insert(cell.tock(), cell);
    }

    /// The top-level value minted at `t`, if any.
    pub fn find(&self, t: Tock) -> Option<Rc<ValueCell>> {
        self.values.borrow().get(&t).cloned()
    }

    /// Number of adopted top-level values.
    pub fn count(&self) -> usize {
        self.values.borrow().len()
    }
}

/// A completed bind: replayable recipe plus eviction accounting.
pub struct FullContext {
    /// Body to re-execute on replay. After a tailcall chain this is the
    /// final body, which reproduces the chain's final value.
    pub(crate) f: BindFn,

    /// Inputs the body is replayed against.
    pub(crate) inputs: Vec<Handle>,

    /// Start tick; also the timeline key and the output handle's identity.
    pub(crate) start: Tock,

    /// One past the last tick this step covered.
    pub(crate) end: Cell<Tock>,

    /// Accumulated exclusive execution time, original run plus replays.
    pub(crate) time_taken: Cell<Time>,

    /// Clock reading of the most recent completion or dereference.
    pub(crate) last_accessed: Cell<Time>,

    /// The output payload shell.
    pub(crate) cell: Rc<ValueCell>,

    /// Resident payload bytes; zero while evicted.
    pub(crate) space: Cell<usize>,

    /// Back-reference into the pool; `None` while not in the heap.
    pub(crate) pool_index: Cell<Option<usize>>,

    /// Rebuild-cost group this context currently belongs to.
    pub(crate) deps: RefCell<CostGroup>,
}

impl FullContext {
    /// Start tick.
    pub fn start(&self) -> Tock {
        self.start
    }

    /// One past the last covered tick.
    pub fn end(&self) -> Tock {
        self.end.get()
    }

    /// Whether `t` falls in this step's covered range.
    pub fn covers(&self, t: Tock) -> bool {
        self.start <= t && t < self.end.get()
    }

    /// Whether the output payload is resident.
    pub fn resident(&self) -> bool {
        self.cell.resident()
    }

    /// Accumulated exclusive execution time.
    pub fn time_taken(&self) -> Time {
        self.time_taken.get()
    }

    /// Resident payload bytes.
    pub fn space(&self) -> usize {
        self.space.get()
    }

    /// Current heap slot, if in the pool.
    pub fn pool_index(&self) -> Option<usize> {
        self.pool_index.get()
    }

    /// Total rebuild time of this context's cost group.
    pub fn rebuild_cost(&self) -> Time {
        self.deps.borrow().value()
    }

    /// Note a dereference at clock reading `now`.
    pub(crate) fn accessed(&self, now: Time) {
        self.last_accessed.set(now);
    }

    /// Drop the payload, returning the bytes freed.
    pub(crate) fn drop_payload(&self) -> usize {
        let freed = self.cell.clear();
        self.space.set(0);
        freed
    }
}

impl fmt::Debug for FullContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FullContext")
            .field("start", &self.start)
            .field("end", &self.end.get())
            .field("resident", &self.resident())
            .field("space", &self.space.get())
            .field("time_taken", &self.time_taken.get())
            .field("pool_index", &self.pool_index.get())
            .finish()
    }
}

/// A completed step persisted on the timeline.
#[derive(Debug)]
pub enum ContextNode {
    /// The outermost context; non-evictable.
    Root(RootContext),
    /// A completed bind.
    Full(FullContext),
}

/// Shared handle to a persisted step.
pub type Context = Rc<ContextNode>;

impl ContextNode {
    /// Whether this context may enter the eviction pool.
    pub fn evictable(&self) -> bool {
        matches!(self, ContextNode::Full(_))
    }

    /// This context as a completed bind, if it is one.
    pub fn as_full(&self) -> Option<&FullContext> {
        match self {
            ContextNode::Full(full) => Some(full),
            ContextNode::Root(_) => None,
        }
    }

    /// This context as the root, if it is the root.
    pub fn as_root(&self) -> Option<&RootContext> {
        match self {
            ContextNode::Root(root) => Some(root),
            ContextNode::Full(_) => None,
        }
    }
}

impl fmt::Debug for RootContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootContext")
            .field("values", &self.count())
            .finish()
    }
}

/// Entry placed in the eviction pool on a context's behalf.
pub enum Phantom {
    /// "Recompute this later": weakly tracks a full context so the reaper
    /// can find it without keeping it alive.
    RecomputeLater {
        /// The tracked context.
        context: Weak<ContextNode>,
    },
}

impl Phantom {
    /// Phantom tracking `ctx`.
    pub fn recompute_later(ctx: &Context) -> Self {
        Phantom::RecomputeLater {
            context: Rc::downgrade(ctx),
        }
    }

    /// The tracked context, if it still exists.
    pub fn context(&self) -> Option<Context> {
        match self {
            Phantom::RecomputeLater { context } => context.upgrade(),
        }
    }

    /// Greedy-Dual rank of this entry at clock reading `now`.
    pub fn cost(&self, now: Time, policy: CostPolicy) -> f64 {
        let Some(ctx) = self.context() else {
            return EVICT_NOW;
        };
        let Some(full) = ctx.as_full() else {
            return EVICT_NOW;
        };
        if !full.resident() {
            // Already hollow; the entry is residue.
            return EVICT_NOW;
        }
        let staleness = now.saturating_sub(full.last_accessed.get());
        reclaim_cost(policy, full.rebuild_cost(), staleness, full.space.get())
    }
}

impl PoolEntry for Phantom {
    fn notify_index_changed(&self, idx: usize) {
        if let Some(ctx) = self.context() {
            if let Some(full) = ctx.as_full() {
                full.pool_index.set(Some(idx));
            }
        }
    }

    fn notify_removed(&self) {
        if let Some(ctx) = self.context() {
            if let Some(full) = ctx.as_full() {
                full.pool_index.set(None);
            }
        }
    }
}

impl fmt::Debug for Phantom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phantom::RecomputeLater { context } => f
                .debug_struct("RecomputeLater")
                .field("alive", &(context.strong_count() > 0))
                .finish(),
        }
    }
}
