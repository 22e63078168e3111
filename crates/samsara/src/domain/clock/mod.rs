//! Clocks - Wall Time With Nesting Awareness
//!
//! # Architecture
//!
//! Two layers, leaves first:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │  NestedClock                                        │
//! │  ├─ frame stack {constructed_at, skipped}           │
//! │  └─ timed(f) → (result, taken)                      │
//! ├─────────────────────────────────────────────────────┤
//! │  RawClock                                           │
//! │  ├─ monotonic_now − boot_instant + forwarded        │
//! │  └─ fast_forward(d)                                 │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! `RawClock` is the single source of truth for wall time. The fast-forward
//! offset is the only supported way to perturb it; tests drive eviction-cost
//! math through it instead of sleeping.
//!
//! `NestedClock` measures the wall time of a step *excluding* the time spent
//! in steps nested inside it (law T-002). Every nanosecond of real time is
//! attributed to exactly one frame: the innermost one running when it passed.

mod nested;
mod raw;

#[cfg(kani)]
mod proofs;

pub use nested::NestedClock;
pub use raw::{RawClock, Time};
