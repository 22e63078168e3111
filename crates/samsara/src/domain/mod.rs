//! Domain Layer - The Memoization Machinery
//!
//! # Components, leaves first
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │  engine     bind / dereference / tailcall / replay /      │
//! │             eviction, wired into the Trailokya singleton  │
//! ├───────────────────────────────────────────────────────────┤
//! │  steps      Record (in flight) and Context (completed),   │
//! │             value cells, handles, pool phantoms           │
//! ├─────────────┬─────────────┬─────────────┬─────────────────┤
//! │  clock      │  cost       │  timeline   │  pool           │
//! │  raw +      │  union-find │  Tock →     │  indexed        │
//! │  nested     │  + ranking  │  Context    │  min-heap       │
//! └─────────────┴─────────────┴─────────────┴─────────────────┘
//! ```
//!
//! Everything below `engine` is a passive data structure, unit-testable in
//! isolation; `engine` owns the one mutable instance of each and drives the
//! protocol between them.

pub mod clock;
pub mod cost;
pub mod engine;
pub mod pool;
pub mod steps;
pub mod timeline;

pub use clock::{NestedClock, RawClock, Time};
pub use cost::{CostGroup, CostPolicy};
pub use engine::{
    bind, bind_erased, dereference, each_step, evict, fast_forward, heap_score,
    largest_rebuild_group, lift, reap, set_memory_limit, ConfigError, EngineConfig, Reaper,
    StepStat, Trailokya,
};
pub use pool::{Pool, PoolEntry};
pub use steps::{BindFn, Handle, Yield};
pub use timeline::{Timeline, Tock};
