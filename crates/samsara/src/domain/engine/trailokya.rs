//! Trailokya - The Engine Singleton
//!
//! # Ownership
//!
//! One instance owns everything the components share:
//!
//! ```text
//! Trailokya
//!   ├─ current_tock      the logical counter
//!   ├─ akasha            Timeline<Context>, keyed by start tick
//!   ├─ book              Pool<Phantom>, the eviction heap
//!   ├─ records           the stack of steps in flight (Root at the bottom)
//!   ├─ replay            the forward-capture scratchpad
//!   ├─ raw + clock       wall time and nesting-aware measurement
//!   ├─ dependents        reverse index: input tick → dependent start ticks
//!   └─ config, accounting, step hook
//! ```
//!
//! # Singleton Realization
//!
//! The engine is single-threaded by contract, so the process-wide instance
//! is a thread-local cell reached through [`Trailokya::with`]. Borrows are
//! never held across user code: step bodies, hooks, and replays run between
//! short interior borrows, which is what makes recursive binds and
//! hook-driven eviction safe.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::domain::clock::{NestedClock, RawClock, Time};
use crate::domain::cost::{reclaim_cost, CostGroup};
use crate::domain::pool::Pool;
use crate::domain::steps::{
    BindFn, Context, ContextNode, FullContext, Handle, HeadRecord, HeadState, Phantom, Record,
    RootContext, ValueCell, ValueRecord,
};
use crate::domain::timeline::{Timeline, Tock};

use super::config::EngineConfig;

/// Forward-capture scratchpad driving one replay.
///
/// While a context replays, the executing tick races `forward_at`; the bind
/// that starts exactly there writes its value cell into `forward_to`, and
/// execution past that point is short-circuited for the rest of the subtree.
#[derive(Default)]
pub struct Replay {
    /// Tick whose value the current replay is after; `None` outside replay.
    pub(crate) forward_at: Option<Tock>,

    /// Captured value cell, once the race is won.
    pub(crate) forward_to: Option<Rc<ValueCell>>,
}

impl Replay {
    /// Whether a replay is in progress.
    pub fn active(&self) -> bool {
        self.forward_at.is_some()
    }
}

/// Read-only snapshot of one completed step, for inspection and tests.
#[derive(Debug, Clone)]
pub struct StepStat {
    /// Start tick.
    pub start: Tock,
    /// One past the last covered tick.
    pub end: Tock,
    /// Whether the output payload is resident.
    pub resident: bool,
    /// Resident payload bytes.
    pub space_bytes: usize,
    /// Accumulated exclusive execution time.
    pub time_taken: Time,
    /// Clock reading of the most recent completion or dereference.
    pub last_accessed: Time,
    /// Total rebuild time of the step's cost group.
    pub rebuild_cost: Time,
    /// Heap slot, while in the pool.
    pub pool_index: Option<usize>,
}

thread_local! {
    static TRAILOKYA: RefCell<Trailokya> = RefCell::new(Trailokya::new(EngineConfig::default()));
}

/// The engine: every component of the memoization machinery, wired together.
pub struct Trailokya {
    pub(crate) current_tock: Tock,
    pub(crate) akasha: Timeline<Context>,
    pub(crate) book: Pool<Phantom>,
    pub(crate) records: Vec<Record>,
    pub(crate) replay: Replay,
    pub(crate) raw: RawClock,
    pub(crate) clock: NestedClock,
    pub(crate) config: EngineConfig,
    pub(crate) resident_bytes: usize,
    pub(crate) dependents: HashMap<Tock, Vec<Tock>>,
    pub(crate) step_hook: Option<Box<dyn FnMut()>>,
}

impl Trailokya {
    pub(crate) fn new(config: EngineConfig) -> Self {
        let mut akasha: Timeline<Context> = Timeline::new();
        akasha.insert(Tock::ROOT, Rc::new(ContextNode::Root(RootContext::new())));
        let raw = RawClock::new();
        let mut clock = NestedClock::new();
        // Root frame; alive as long as the engine so frame pops never
        // underflow.
        clock.push_frame(&raw);
        Self {
            current_tock: Tock(1),
            akasha,
            book: Pool::new(),
            records: vec![Record::Root],
            replay: Replay::default(),
            raw,
            clock,
            config,
            resident_bytes: 0,
            dependents: HashMap::new(),
            step_hook: None,
        }
    }

    /// Run `f` against the engine instance of this thread.
    ///
    /// `f` must not re-enter engine operations (`bind`, `dereference`, ...);
    /// it holds the only borrow while it runs.
    pub fn with<R>(f: impl FnOnce(&mut Trailokya) -> R) -> R {
        TRAILOKYA.with(|cell| f(&mut cell.borrow_mut()))
    }

    /// Replace this thread's engine with a fresh one. Test support: every
    /// prior handle becomes meaningless.
    pub fn reset(config: EngineConfig) {
        TRAILOKYA.with(|cell| *cell.borrow_mut() = Trailokya::new(config));
    }

    // ------------------------------------------------------------------
    // Small shared helpers
    // ------------------------------------------------------------------

    /// Consume and return the next tick.
    pub(crate) fn take_tock(&mut self) -> Tock {
        let t = self.current_tock;
        self.current_tock = t.next();
        t
    }

    pub(crate) fn frame_push(&mut self) {
        self.clock.push_frame(&self.raw);
    }

    pub(crate) fn frame_pop(&mut self) -> Time {
        self.clock.pop_frame(&self.raw)
    }

    /// The root context's cell minted at `t`, if `t` names a top-level value.
    pub(crate) fn root_find(&self, t: Tock) -> Option<Rc<ValueCell>> {
        self.akasha
            .get(Tock::ROOT)
            .and_then(|ctx| ctx.as_root())
            .and_then(|root| root.find(t))
    }

    /// The context whose covered range contains `t` (law M-001).
    ///
    /// Walks from the nearest predecessor outwards: a predecessor that has
    /// already ended does not cover `t`, but an enclosing step still can.
    /// Falls through to the root, which covers everything.
    pub(crate) fn owning_context(&self, t: Tock) -> Option<Context> {
        for (_, ctx) in self.akasha.walk_le(t) {
            match &**ctx {
                ContextNode::Root(_) => return Some(Rc::clone(ctx)),
                ContextNode::Full(full) => {
                    if full.covers(t) {
                        return Some(Rc::clone(ctx));
                    }
                }
            }
        }
        None
    }

    /// Start tick of the context owning `t`.
    pub(crate) fn owning_start(&self, t: Tock) -> Tock {
        match self.owning_context(t) {
            Some(ctx) => ctx.as_full().map_or(Tock::ROOT, FullContext::start),
            None => Tock::ROOT,
        }
    }

    /// Whether reading the value minted at `t` would require a replay.
    pub(crate) fn needs_replay(&self, t: Tock) -> bool {
        if self.root_find(t).is_some() {
            return false;
        }
        match self.owning_context(t) {
            Some(ctx) => match ctx.as_full() {
                Some(full) => !(full.start() == t && full.resident()),
                None => false,
            },
            None => false,
        }
    }

    /// Note a dereference of the value minted at `t`.
    pub(crate) fn touch(&self, t: Tock) {
        if self.root_find(t).is_some() {
            return;
        }
        if let Some(ctx) = self.owning_context(t) {
            if let Some(full) = ctx.as_full() {
                if full.start() == t {
                    full.accessed(self.raw.now());
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Record stack transitions
    // ------------------------------------------------------------------

    /// Suspend the current top and push a head record for a starting step.
    pub(crate) fn open_head(&mut self, f: BindFn, inputs: Vec<Handle>, s: Tock, played: bool) {
        self.records
            .last_mut()
            .expect("record stack empty")
            .on_suspended();
        self.records.push(Record::Head(HeadRecord {
            f,
            inputs,
            t: s,
            started: self.raw.now(),
            played,
            state: HeadState::Running,
        }));
        self.frame_push();
        trace!(start = s.0, played, depth = self.records.len(), "step opened");
    }

    /// Replace the running head's body and inputs in place.
    pub(crate) fn apply_tailcall(&mut self, f: BindFn, inputs: Vec<Handle>) {
        let top = self.records.last_mut().expect("record stack empty");
        top.tailcall(f, inputs);
        trace!(start = top.tock().0, "tailcall continued in place");
    }

    /// Pop and resolve a value record pushed by the replay reuse path.
    pub(crate) fn complete_value(&mut self) -> Rc<ValueCell> {
        let rec = self.records.pop().expect("record stack empty");
        let cell = match rec {
            Record::Value(ValueRecord { cell, .. }) => cell,
            other => panic!("completed {other:?} as a value record"),
        };
        self.records
            .last_mut()
            .expect("record stack empty")
            .on_resumed();
        cell
    }

    /// Intercept a starting bind while a replay is in progress.
    ///
    /// Returns the handle to use instead of executing, or `None` when the
    /// step must run for real. Three alignments are possible:
    ///
    /// - the target was already captured: skip the body entirely, jumping
    ///   the tick counter across the recorded range;
    /// - the recorded step at this tick is still resident and the target is
    ///   not hidden inside it: reuse the recorded value through a value
    ///   record, no re-execution;
    /// - otherwise: run it.
    pub(crate) fn replay_shortcut(&mut self) -> Option<Handle> {
        let fa = self.replay.forward_at?;
        let s = self.current_tock;
        let recorded = self.akasha.get(s).cloned();

        if self.replay.forward_to.is_some() {
            // Past the capture; whatever this body would compute is moot.
            // The jump lands one past the recorded end tick, which the
            // original completion consumed.
            if let Some(full) = recorded.as_ref().and_then(|c| c.as_full()) {
                self.current_tock = full.end().next();
                return Some(Handle::new(s, Rc::clone(&full.cell)));
            }
            self.current_tock = s.next().next();
            return Some(Handle::hollow(s));
        }

        let ctx = recorded?;
        let full = ctx.as_full()?;
        let target_inside = fa > s && fa < full.end();
        if full.resident() && !target_inside {
            self.records
                .last_mut()
                .expect("record stack empty")
                .on_suspended();
            self.records.push(Record::Value(ValueRecord {
                t: s,
                cell: Rc::clone(&full.cell),
            }));
            let cell = self.complete_value();
            self.current_tock = full.end().next();
            full.accessed(self.raw.now());
            if fa == s {
                self.replay.forward_to = Some(Rc::clone(&cell));
            }
            trace!(start = s.0, "reused resident step during replay");
            return Some(Handle::new(s, cell));
        }
        None
    }

    // ------------------------------------------------------------------
    // Completion
    // ------------------------------------------------------------------

    /// Pop the running head and persist its outcome.
    ///
    /// A fresh step becomes a context on the timeline and enters the pool; a
    /// played step refills the context it replayed. Either way the parent
    /// record is resumed exactly once. Steps that ran past a forward capture
    /// are not persisted: their tails executed against stubs.
    pub(crate) fn complete_head(&mut self, bytes: Rc<[u8]>, taken: Time) -> Handle {
        let rec = self.records.pop().expect("record stack empty");
        let head = match rec {
            Record::Head(h) => h,
            Record::Root => panic!("completing the root record is a logic fault"),
            Record::Value(_) => panic!("completing a value record out of band"),
        };
        assert_eq!(
            head.state,
            HeadState::Running,
            "completed a head record that was not running"
        );
        let s = head.t;
        self.records
            .last_mut()
            .expect("record stack empty")
            .on_resumed();
        let now = self.raw.now();

        let captured_elsewhere =
            self.replay.forward_to.is_some() && self.replay.forward_at != Some(s);
        if captured_elsewhere {
            // Ancestor or trailing sibling of the capture target.
            let cell = self
                .akasha
                .get(s)
                .and_then(|c| c.as_full().map(|f| Rc::clone(&f.cell)));
            return match cell {
                Some(cell) => Handle::new(s, cell),
                None => Handle::hollow(s),
            };
        }

        if head.played {
            self.refill_context(s, bytes, taken, now)
        } else {
            self.persist_context(head, bytes, taken, now)
        }
    }

    /// Played completion: restore the payload of the context being replayed.
    fn refill_context(&mut self, s: Tock, bytes: Rc<[u8]>, taken: Time, now: Time) -> Handle {
        let ctx = self
            .akasha
            .get(s)
            .cloned()
            .expect("replayed context left the timeline");
        let full = ctx
            .as_full()
            .expect("replaying the root context is a logic fault");

        let stale = full.cell.clear();
        self.resident_bytes = self.resident_bytes.saturating_sub(stale);
        let size = full.cell.fill(Rc::clone(&bytes));
        self.resident_bytes += size;
        full.space.set(size);

        full.time_taken.set(full.time_taken.get() + taken);
        // Observed rebuild work flows into the whole group, so estimates for
        // everything chained through this context track reality.
        full.deps.borrow().increase(taken);
        full.accessed(now);

        if full.pool_index().is_none() {
            let cost = reclaim_cost(
                self.config.cost_formula,
                full.rebuild_cost(),
                Time::ZERO,
                size,
            );
            self.book.push(Phantom::recompute_later(&ctx), cost);
        }
        if self.replay.forward_at == Some(s) {
            self.replay.forward_to = Some(Rc::clone(&full.cell));
        }
        debug!(
            start = s.0,
            taken_ns = taken.as_nanos() as u64,
            size,
            "context replayed and refilled"
        );
        Handle::new(s, Rc::clone(&full.cell))
    }

    /// Fresh completion: mint a context and index it for eviction.
    fn persist_context(
        &mut self,
        head: HeadRecord,
        bytes: Rc<[u8]>,
        taken: Time,
        now: Time,
    ) -> Handle {
        let s = head.t;
        let end = self.take_tock();
        let size = bytes.len();
        let cell = Rc::new(ValueCell::filled(s, bytes));

        let owners: Vec<Tock> = head
            .inputs
            .iter()
            .map(|h| self.owning_start(h.tock()))
            .collect();
        for owner in owners {
            if owner != Tock::ROOT {
                let deps = self.dependents.entry(owner).or_default();
                if !deps.contains(&s) {
                    deps.push(s);
                }
            }
        }

        let ctx: Context = Rc::new(ContextNode::Full(FullContext {
            f: head.f,
            inputs: head.inputs,
            start: s,
            end: std::cell::Cell::new(end),
            time_taken: std::cell::Cell::new(taken),
            last_accessed: std::cell::Cell::new(now),
            cell: Rc::clone(&cell),
            space: std::cell::Cell::new(size),
            pool_index: std::cell::Cell::new(None),
            deps: RefCell::new(CostGroup::new(taken)),
        }));

        if let Some(old) = self.akasha.insert(s, Rc::clone(&ctx)) {
            self.release_displaced(&old);
        }
        self.resident_bytes += size;

        let cost = reclaim_cost(self.config.cost_formula, taken, Time::ZERO, size);
        self.book.push(Phantom::recompute_later(&ctx), cost);

        if self.replay.forward_at == Some(s) {
            self.replay.forward_to = Some(Rc::clone(&cell));
        }
        trace!(
            start = s.0,
            end = end.0,
            size,
            taken_ns = taken.as_nanos() as u64,
            inclusive_ns = now.saturating_sub(head.started).as_nanos() as u64,
            "step completed"
        );
        Handle::new(s, cell)
    }

    /// Release whatever a displaced timeline entry still holds.
    fn release_displaced(&mut self, old: &Context) {
        if let Some(full) = old.as_full() {
            if let Some(idx) = full.pool_index() {
                let _ = self.book.remove_at(idx);
            }
            let freed = full.drop_payload();
            self.resident_bytes = self.resident_bytes.saturating_sub(freed);
        }
    }

    // ------------------------------------------------------------------
    // Eviction
    // ------------------------------------------------------------------

    /// Drop a context's payload and chain its rebuild-cost group through
    /// every evicted neighbour in the replay graph.
    ///
    /// Neighbours on both sides matter: the contexts this one reads from
    /// (rebuilding it replays them first) and the recorded dependents that
    /// read from it (rebuilding them replays it first). Merges are
    /// idempotent, so revisiting a neighbour is harmless.
    pub(crate) fn evict_context(&mut self, ctx: &Context) {
        let full = ctx.as_full().expect("the root context is not evictable");
        if !full.resident() {
            return;
        }
        if let Some(idx) = full.pool_index() {
            let _ = self.book.remove_at(idx);
        }
        let freed = full.drop_payload();
        self.resident_bytes = self.resident_bytes.saturating_sub(freed);

        let input_ticks: Vec<Tock> = full.inputs.iter().map(Handle::tock).collect();
        for t in input_ticks {
            if let Some(ictx) = self.owning_context(t) {
                if let Some(ifull) = ictx.as_full() {
                    if !ifull.resident() {
                        full.deps.borrow().merge(&ifull.deps.borrow());
                    }
                }
            }
        }
        if let Some(dependents) = self.dependents.get(&full.start()).cloned() {
            for d in dependents {
                if let Some(dctx) = self.akasha.get(d) {
                    if let Some(dfull) = dctx.as_full() {
                        if !dfull.resident() {
                            full.deps.borrow().merge(&dfull.deps.borrow());
                        }
                    }
                }
            }
        }
        debug!(
            start = full.start().0,
            freed,
            group_ns = full.rebuild_cost().as_nanos() as u64,
            "evicted context"
        );
    }

    /// Borrow the reaper.
    pub fn reaper(&mut self) -> Reaper<'_> {
        Reaper { engine: self }
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    /// Current raw clock reading.
    pub fn now(&self) -> Time {
        self.raw.now()
    }

    /// The next unconsumed tick.
    pub fn tock(&self) -> Tock {
        self.current_tock
    }

    /// Depth of the record stack, the root record included.
    pub fn record_depth(&self) -> usize {
        self.records.len()
    }

    /// Number of completed steps on the timeline (root excluded).
    pub fn context_count(&self) -> usize {
        self.akasha.len() - 1
    }

    /// Live payload bytes across all contexts and root values.
    pub fn resident_bytes(&self) -> usize {
        self.resident_bytes
    }

    /// Number of entries in the eviction pool.
    pub fn heap_len(&self) -> usize {
        self.book.len()
    }

    /// Diagnostic aggregate of heap cost.
    pub fn heap_score(&self) -> u64 {
        self.book.score()
    }

    /// Whether a replay is in progress.
    pub fn replaying(&self) -> bool {
        self.replay.active()
    }

    /// Snapshot of the completed step that started at `t`.
    pub fn stat(&self, t: Tock) -> Option<StepStat> {
        let ctx = self.akasha.get(t)?;
        let full = ctx.as_full()?;
        Some(StepStat {
            start: full.start(),
            end: full.end(),
            resident: full.resident(),
            space_bytes: full.space(),
            time_taken: full.time_taken(),
            last_accessed: full.last_accessed.get(),
            rebuild_cost: full.rebuild_cost(),
            pool_index: full.pool_index(),
        })
    }

    /// Whether two completed steps currently share a rebuild-cost group.
    pub fn same_rebuild_group(&self, a: Tock, b: Tock) -> bool {
        let (Some(ca), Some(cb)) = (self.akasha.get(a), self.akasha.get(b)) else {
            return false;
        };
        match (ca.as_full(), cb.as_full()) {
            (Some(fa), Some(fb)) => fa.deps.borrow().same_group(&fb.deps.borrow()),
            _ => false,
        }
    }

    /// Verify the heap back-index invariant (law M-002) in both directions.
    ///
    /// Every pool entry's context must point back at its slot, and every
    /// resident completed step must sit in the pool at the slot it claims.
    pub fn backlinks_hold(&self) -> bool {
        for idx in 0..self.book.len() {
            let Some(phantom) = self.book.get(idx) else {
                return false;
            };
            if let Some(ctx) = phantom.context() {
                let Some(full) = ctx.as_full() else {
                    return false;
                };
                if full.pool_index() != Some(idx) {
                    return false;
                }
            }
        }
        for (_, ctx) in self.akasha.iter() {
            let Some(full) = ctx.as_full() else { continue };
            match full.pool_index() {
                Some(idx) => {
                    let Some(phantom) = self.book.get(idx) else {
                        return false;
                    };
                    match phantom.context() {
                        Some(linked) => {
                            if !Rc::ptr_eq(&linked, ctx) {
                                return false;
                            }
                        }
                        None => return false,
                    }
                }
                None => {
                    if full.resident() {
                        return false;
                    }
                }
            }
        }
        true
    }
}

impl std::fmt::Debug for Trailokya {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trailokya")
            .field("tock", &self.current_tock)
            .field("contexts", &self.context_count())
            .field("records", &self.records.len())
            .field("pool", &self.book.len())
            .field("resident_bytes", &self.resident_bytes)
            .finish()
    }
}

/// Pops the cheapest pool entry and evicts it on demand.
pub struct Reaper<'a> {
    engine: &'a mut Trailokya,
}

impl Reaper<'_> {
    /// Perform one eviction. Returns `false` when nothing is evictable.
    ///
    /// Stale entries (dead weak references, already-hollow contexts) rank as
    /// immediate pops and are dropped silently on the way.
    pub fn murder(&mut self) -> bool {
        loop {
            let now = self.engine.raw.now();
            let policy = self.engine.config.cost_formula;
            let Some(phantom) = self.engine.book.adjust_pop(|p| p.cost(now, policy)) else {
                trace!("reaper found nothing to evict");
                return false;
            };
            match phantom.context() {
                Some(ctx) if ctx.as_full().is_some_and(FullContext::resident) => {
                    self.engine.evict_context(&ctx);
                    return true;
                }
                _ => trace!("dropped stale pool entry"),
            }
        }
    }

    /// Whether the pool still holds anything to reap.
    pub fn have_soul(&self) -> bool {
        !self.engine.book.is_empty()
    }

    /// Diagnostic aggregate of heap cost.
    pub fn score(&self) -> u64 {
        self.engine.book.score()
    }
}
