//! Samsara - Time-Travelling Memoization With Bounded Memory
//!
//! # Overview
//!
//! `samsara` records a computation as a composition of pure *bound* steps on
//! a logical timeline. Every step's inputs, output, wall-clock cost, and
//! memory footprint are remembered. Under memory pressure the engine
//! **evicts** concrete values, keeping only the recipe to recompute them; a
//! Greedy-Dual cost policy picks the victim that reclaims the most bytes per
//! nanosecond of future rebuild work. Dereferencing an evicted handle
//! **replays** the recorded step transparently, rebuilding
//! transitively-evicted inputs on the way. Tailcall continuation keeps
//! iterative recursion flat: a chain of continuations is one step, one
//! record, one context.
//!
//! # Engine Laws (Invariants)
//!
//! ## Temporal
//! - **T-001 Time Monotonicity**: clock readings never decrease; the
//!   fast-forward offset only grows.
//! - **T-002 Nested Exclusion**: a step is charged only its exclusive time;
//!   nested steps' time is attributed to the innermost step running.
//!
//! ## Memory
//! - **M-001 Timeline Coverage**: the step covering tick `t` is the nearest
//!   predecessor whose range `[start, end)` contains `t`, falling through to
//!   the root.
//! - **M-002 Heap Back-Index**: a context is in the eviction pool exactly
//!   when it is evictable and not yet evicted, and its `pool_index` always
//!   names its live slot.
//! - **M-003 Payload Accounting**: `space_bytes` and the engine's resident
//!   total reflect live payloads only.
//!
//! ## Replay
//! - **R-001 Replay Determinism**: evicting and dereferencing any handle
//!   reproduces a byte-identical payload, any number of times.
//! - **R-002 Tailcall Flatness**: a chain of `n` tailcalls produces exactly
//!   one context and never grows the record stack.
//!
//! ## Cost
//! - **C-001 Group Conservation**: merging rebuild-cost groups sums their
//!   totals; observed replay time is added to the group it rebuilt.
//!
//! # Usage
//!
//! ```rust
//! use samsara::{bind, dereference, evict, Yield};
//!
//! let a = bind(|_| Yield::Value(vec![2]), &[]);
//! let b = bind(
//!     |xs| Yield::Value(vec![xs[0][0] * 21]),
//!     &[a.clone()],
//! );
//!
//! // Evict the concrete value; the recipe stays behind.
//! assert!(evict(&b));
//!
//! // Dereferencing replays the step and rebuilds the value.
//! assert_eq!(dereference(&b).as_ref(), &[42]);
//! ```
//!
//! # Scope
//!
//! In-process, synchronous, single-threaded. Values are opaque byte blobs;
//! type them at the edges. No persistence, no distribution.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod domain;

pub use domain::{
    bind, bind_erased, dereference, each_step, evict, fast_forward, heap_score,
    largest_rebuild_group, lift, reap, set_memory_limit, BindFn, ConfigError, CostPolicy,
    EngineConfig, Handle, StepStat, Time, Tock, Trailokya, Yield,
};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
