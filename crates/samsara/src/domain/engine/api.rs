//! Public Operations - bind, dereference, and the machinery between them
//!
//! # Re-entrancy Discipline
//!
//! Step bodies are arbitrary user code that may bind, dereference, lift, and
//! evict. Every function here therefore follows one rule: engine state is
//! touched only inside short [`Trailokya::with`] borrows, and **no borrow is
//! held while user code runs**. The sequence for one step is:
//!
//! ```text
//! borrow { suspend parent, push record, open clock frame }
//! run user body (no borrow held; nested operations re-borrow freely)
//! borrow { close clock frame, complete record, index context }
//! ```
//!
//! # Replay
//!
//! [`dereference`] on an evicted handle finds the recorded step covering the
//! handle's tick and re-executes it with the forward-capture scratchpad set.
//! Recursion happens through input materialization: replaying a step first
//! dereferences its inputs, which replays *their* steps if needed, merging
//! rebuild-cost groups along the way (law C-001).

use std::rc::Rc;

use tracing::{debug, warn};

use crate::domain::clock::Time;
use crate::domain::cost;
use crate::domain::steps::{BindFn, Context, Handle, ValueCell, Yield};
use crate::domain::timeline::Tock;

use super::trailokya::{Replay, Trailokya};

/// Record one computation step.
///
/// `f` must be pure: given the payloads of `inputs`, produce either a value
/// or a tailcall continuation. It may freely call [`bind`], [`dereference`],
/// and [`lift`]; it runs on the caller's thread with no engine borrow held.
///
/// Returns a handle to the step's output, which may later be evicted and
/// transparently rebuilt.
pub fn bind(f: impl Fn(&[&[u8]]) -> Yield + 'static, inputs: &[Handle]) -> Handle {
    bind_erased(Rc::new(f), inputs.to_vec())
}

/// [`bind`] for an already type-erased body.
pub fn bind_erased(f: BindFn, inputs: Vec<Handle>) -> Handle {
    if let Some(handle) = Trailokya::with(|t| t.replay_shortcut()) {
        return handle;
    }
    let input_bytes: Vec<Rc<[u8]>> = inputs.iter().map(dereference).collect();
    let handle = run_step(f, inputs, input_bytes, None);
    after_step();
    handle
}

/// Materialize a handle's value, replaying its producing step if evicted.
///
/// Total for well-formed usage: eviction is invisible here apart from the
/// time replay takes.
pub fn dereference(h: &Handle) -> Rc<[u8]> {
    if let Some(bytes) = h.cached_bytes() {
        Trailokya::with(|t| t.touch(h.tock()));
        return bytes;
    }
    materialize(h)
}

/// Mint a top-level value owned by the root context.
///
/// Root values are never evicted and never replayed; they are the fixed
/// points recomputation bottoms out on.
pub fn lift(bytes: Vec<u8>) -> Handle {
    Trailokya::with(|t| {
        let s = t.take_tock();
        let root_ctx = t
            .akasha
            .get(Tock::ROOT)
            .cloned()
            .expect("timeline lost its root");
        let root = root_ctx.as_root().expect("root tick holds a non-root context");
        // During replay the tick was already minted once; reuse its cell.
        if let Some(cell) = root.find(s) {
            return Handle::new(s, cell);
        }
        let payload: Rc<[u8]> = Rc::from(bytes);
        let size = payload.len();
        let cell = Rc::new(ValueCell::filled(s, payload));
        root.adopt(Rc::clone(&cell));
        t.resident_bytes += size;
        Handle::new(s, cell)
    })
}

/// Drop the resident payload behind `h`, keeping the recipe to rebuild it.
///
/// Returns whether anything was evicted. Root values and already-evicted
/// steps are left alone.
pub fn evict(h: &Handle) -> bool {
    Trailokya::with(|t| {
        if t.root_find(h.tock()).is_some() {
            return false;
        }
        let Some(ctx) = t.owning_context(h.tock()) else {
            return false;
        };
        match ctx.as_full() {
            Some(full) if full.start() == h.tock() && full.resident() => {
                t.evict_context(&ctx);
                true
            }
            _ => false,
        }
    })
}

/// Advance the engine clock by `d` without waiting.
pub fn fast_forward(d: Time) {
    Trailokya::with(|t| t.raw.fast_forward(d));
}

/// Evict while resident payload bytes exceed `bytes`.
pub fn set_memory_limit(bytes: usize) {
    Trailokya::with(|t| t.config.memory_limit_bytes = Some(bytes));
    drive_pressure();
}

/// Install a hook fired after each completed bind.
///
/// The hook runs with no engine borrow held, so it may drive eviction or
/// record instrumentation through the public operations.
pub fn each_step(hook: impl FnMut() + 'static) {
    Trailokya::with(|t| t.step_hook = Some(Box::new(hook)));
}

/// Perform one eviction by cost order. Returns `false` when nothing is
/// evictable.
pub fn reap() -> bool {
    Trailokya::with(|t| t.reaper().murder())
}

/// Diagnostic aggregate of the eviction heap's cost.
pub fn heap_score() -> u64 {
    Trailokya::with(|t| t.heap_score())
}

// ----------------------------------------------------------------------
// Step execution
// ----------------------------------------------------------------------

/// Execute one step body to completion: record, trampoline, persist.
///
/// `forced` carries the original start tick when re-executing a recorded
/// step; fresh steps consume the next tick.
fn run_step(
    f: BindFn,
    inputs: Vec<Handle>,
    input_bytes: Vec<Rc<[u8]>>,
    forced: Option<Tock>,
) -> Handle {
    let played = forced.is_some();
    Trailokya::with(|t| {
        let s = match forced {
            Some(s) => s,
            None => t.take_tock(),
        };
        t.open_head(Rc::clone(&f), inputs, s, played);
    });
    let out = run_trampoline(f, input_bytes);
    Trailokya::with(|t| {
        let taken = t.frame_pop();
        t.complete_head(out, taken)
    })
}

/// Run a step body, applying tailcall continuations in place until it
/// produces a value (law R-002: the chain stays one record, one step).
fn run_trampoline(mut f: BindFn, mut input_bytes: Vec<Rc<[u8]>>) -> Rc<[u8]> {
    loop {
        let outcome = {
            let refs: Vec<&[u8]> = input_bytes.iter().map(|b| b.as_ref()).collect();
            f(&refs)
        };
        match outcome {
            Yield::Value(bytes) => return Rc::from(bytes),
            Yield::Tailcall { f: next, inputs } => {
                Trailokya::with(|t| t.apply_tailcall(Rc::clone(&next), inputs.clone()));
                input_bytes = inputs.iter().map(dereference).collect();
                f = next;
            }
        }
    }
}

// ----------------------------------------------------------------------
// Replay
// ----------------------------------------------------------------------

enum Plan {
    Ready(Rc<ValueCell>, Rc<[u8]>),
    Play(Context),
}

/// Materialize an evicted (or stale-cached) handle.
fn materialize(h: &Handle) -> Rc<[u8]> {
    loop {
        let plan = Trailokya::with(|t| {
            if let Some(cell) = t.root_find(h.tock()) {
                let bytes = cell.bytes().expect("root values are never evicted");
                return Plan::Ready(cell, bytes);
            }
            let ctx = t.owning_context(h.tock()).expect("timeline lost its root");
            if let Some(full) = ctx.as_full() {
                if full.start() == h.tock() {
                    if let Some(bytes) = full.cell.bytes() {
                        full.accessed(t.raw.now());
                        return Plan::Ready(Rc::clone(&full.cell), bytes);
                    }
                }
            } else {
                panic!("dangling handle: no recorded step produced {}", h.tock());
            }
            Plan::Play(ctx)
        });
        match plan {
            Plan::Ready(cell, bytes) => {
                h.retarget(cell);
                return bytes;
            }
            Plan::Play(ctx) => match play_context(&ctx, h.tock()) {
                Some(cell) => {
                    if let Some(bytes) = cell.bytes() {
                        h.retarget(cell);
                        return bytes;
                    }
                    // Evicted again before the value could be read; replay
                    // once more.
                }
                None => panic!(
                    "out-of-order replay: execution never reached {}",
                    h.tock()
                ),
            },
        }
    }
}

/// Re-execute a recorded step to reproduce the value minted at `target`.
///
/// Returns the captured value cell, or `None` if execution never reached the
/// target tick (a logic fault surfaced by the caller).
fn play_context(ctx: &Context, target: Tock) -> Option<Rc<ValueCell>> {
    let full = ctx
        .as_full()
        .expect("replaying the root context is a logic fault");
    let f = Rc::clone(&full.f);
    let inputs = full.inputs.clone();
    debug!(start = full.start().0, target = target.0, "replaying context");

    // Materialize inputs first; every input that itself required replay
    // chains its rebuild-cost group into this one.
    let mut input_bytes = Vec::with_capacity(inputs.len());
    for input in &inputs {
        let required_replay = Trailokya::with(|t| t.needs_replay(input.tock()));
        input_bytes.push(dereference(input));
        if required_replay {
            Trailokya::with(|t| {
                if let Some(ictx) = t.owning_context(input.tock()) {
                    if let Some(ifull) = ictx.as_full() {
                        full.deps.borrow().merge(&ifull.deps.borrow());
                    }
                }
            });
        }
    }

    // Rewind the tick counter into the recorded range and race for the
    // target; both the counter and the scratchpad are restored on the way
    // out, so replays nest through recursion without trampling each other.
    let (saved_replay, saved_tock) = Trailokya::with(|t| {
        let saved_replay = std::mem::replace(
            &mut t.replay,
            Replay {
                forward_at: Some(target),
                forward_to: None,
            },
        );
        let saved_tock = t.current_tock;
        t.current_tock = full.start().next();
        (saved_replay, saved_tock)
    });

    let _ = run_step(f, inputs, input_bytes, Some(full.start()));

    Trailokya::with(|t| {
        t.current_tock = saved_tock.max(t.current_tock);
        std::mem::replace(&mut t.replay, saved_replay).forward_to
    })
}

// ----------------------------------------------------------------------
// Post-step driving
// ----------------------------------------------------------------------

/// Fire the step hook and handle memory pressure after a completed bind.
///
/// Skipped while a replay is in flight: eviction mid-replay could take away
/// the very value being raced for, so pressure waits until the replay
/// settles.
fn after_step() {
    if Trailokya::with(|t| t.replay.active()) {
        return;
    }
    if let Some(mut hook) = Trailokya::with(|t| t.step_hook.take()) {
        hook();
        Trailokya::with(|t| {
            // The hook may have installed a replacement; newest wins.
            if t.step_hook.is_none() {
                t.step_hook = Some(hook);
            }
        });
    }
    drive_pressure();
}

/// Evict in batches while the resident footprint exceeds the limit.
fn drive_pressure() {
    loop {
        let (limit, batch, resident) = Trailokya::with(|t| {
            (
                t.config.memory_limit_bytes,
                t.config.eviction_batch,
                t.resident_bytes,
            )
        });
        let Some(limit) = limit else { return };
        if resident <= limit {
            return;
        }
        let evicted = Trailokya::with(|t| {
            let mut reaper = t.reaper();
            let mut n = 0;
            for _ in 0..batch {
                if reaper.murder() {
                    n += 1;
                } else {
                    break;
                }
            }
            n
        });
        if evicted == 0 {
            warn!(resident, limit, "memory limit exceeded with nothing evictable");
            return;
        }
    }
}

/// Largest rebuild-group total ever observed in this process.
pub fn largest_rebuild_group() -> Time {
    cost::largest_group()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EngineConfig;

    fn num(n: u64) -> Vec<u8> {
        n.to_le_bytes().to_vec()
    }

    fn read(bytes: &[u8]) -> u64 {
        u64::from_le_bytes(bytes.try_into().expect("eight bytes"))
    }

    #[test]
    fn test_bind_and_dereference() {
        Trailokya::reset(EngineConfig::default());
        let a = bind(|_| Yield::Value(num(41)), &[]);
        let b = bind(|xs| Yield::Value(num(read(xs[0]) + 1)), &[a.clone()]);
        assert_eq!(read(&dereference(&b)), 42);
        assert_eq!(Trailokya::with(|t| t.context_count()), 2);
    }

    #[test]
    fn test_lift_is_never_evictable() {
        Trailokya::reset(EngineConfig::default());
        let v = lift(num(7));
        assert!(!evict(&v));
        assert!(v.resident());
        assert_eq!(read(&dereference(&v)), 7);
    }

    #[test]
    fn test_evict_then_dereference_replays() {
        Trailokya::reset(EngineConfig::default());
        let a = bind(|_| Yield::Value(num(10)), &[]);
        assert!(evict(&a));
        assert!(!a.resident());
        assert_eq!(read(&dereference(&a)), 10);
        assert!(a.resident());
    }

    #[test]
    fn test_evict_is_idempotent() {
        Trailokya::reset(EngineConfig::default());
        let a = bind(|_| Yield::Value(num(1)), &[]);
        assert!(evict(&a));
        assert!(!evict(&a));
    }

    #[test]
    fn test_nested_bind_depth() {
        Trailokya::reset(EngineConfig::default());
        let outer = bind(
            |_| {
                let inner = bind(|_| Yield::Value(num(5)), &[]);
                let depth = Trailokya::with(|t| t.record_depth());
                // Root + outer while the inner has already completed.
                assert_eq!(depth, 2);
                Yield::Value(dereference(&inner).to_vec())
            },
            &[],
        );
        assert_eq!(read(&dereference(&outer)), 5);
        assert_eq!(Trailokya::with(|t| t.context_count()), 2);
    }

    #[test]
    fn test_reap_empty_heap_is_noop() {
        Trailokya::reset(EngineConfig::default());
        assert!(!reap());
        assert_eq!(heap_score(), 0);
    }

    #[test]
    fn test_step_hook_fires_per_bind() {
        Trailokya::reset(EngineConfig::default());
        let seen = Rc::new(std::cell::Cell::new(0u32));
        let counter = Rc::clone(&seen);
        each_step(move || counter.set(counter.get() + 1));

        bind(|_| Yield::Value(num(1)), &[]);
        bind(|_| Yield::Value(num(2)), &[]);
        assert_eq!(seen.get(), 2);
    }

    #[test]
    fn test_memory_limit_drives_eviction() {
        Trailokya::reset(EngineConfig::default());
        for i in 0..8u64 {
            bind(move |_| Yield::Value(vec![i as u8; 1024]), &[]);
        }
        assert_eq!(Trailokya::with(|t| t.resident_bytes()), 8 * 1024);
        set_memory_limit(3 * 1024);
        assert!(Trailokya::with(|t| t.resident_bytes()) <= 3 * 1024);
        assert!(Trailokya::with(|t| t.backlinks_hold()));
    }
}
