//! Engine - Replay State Machine and the Trailokya Singleton
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  api: bind / dereference / lift / evict / reap / hooks       │
//! │  (no borrow held across user code)                           │
//! ├──────────────────────────────────────────────────────────────┤
//! │  Trailokya: tick counter, akasha (timeline), book (pool),    │
//! │  record stack, replay scratchpad, clocks, reaper, config     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The flow for one step: `bind` pushes a record and runs the body inside a
//! nested-clock frame; completion turns the record into a context on the
//! timeline and indexes it in the pool. The reaper pops the cheapest pool
//! entry and hollows its context. Dereferencing a hollow handle replays the
//! recorded step, rebuilding transitively-evicted inputs on the way and
//! charging observed rebuild time back into the cost groups.

mod api;
mod config;
mod trailokya;

pub use api::{
    bind, bind_erased, dereference, each_step, evict, fast_forward, heap_score,
    largest_rebuild_group, lift, reap, set_memory_limit,
};
pub use config::{ConfigError, EngineConfig};
pub use trailokya::{Reaper, Replay, StepStat, Trailokya};
