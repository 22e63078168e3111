//! Greedy-Dual Eviction Ranking
//!
//! The reaper wants the entry that reclaims the most bytes per nanosecond of
//! future rebuild work. Ranking entries by
//!
//! ```text
//! cost = rebuild_time / (staleness × size)
//! ```
//!
//! and evicting the *minimum* is equivalent to evicting the entry with the
//! largest reclaim ratio. Only the direction has to be consistent; the
//! absolute scale is meaningless, so the ratio is computed in `f64` and
//! ordered with `total_cmp`.
//!
//! Two sentinels bracket the finite range:
//!
//! - [`EVICT_NOW`] (−∞): the heap entry's target is already gone; popping it
//!   is pure bookkeeping.
//! - [`KEEP_FOREVER`] (+∞): the entry holds no bytes, so evicting it can
//!   never be useful.

use serde::{Deserialize, Serialize};

use crate::domain::clock::Time;

/// Cost of an entry whose target no longer exists; pops before everything.
pub const EVICT_NOW: f64 = f64::NEG_INFINITY;

/// Cost of an entry that would reclaim nothing; never pops usefully.
pub const KEEP_FOREVER: f64 = f64::INFINITY;

/// Greedy-Dual variant used to rank evictable entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CostPolicy {
    /// `rebuild_time / (staleness × size)`: prefer stale, large, cheap
    /// values. The default.
    #[default]
    GreedyDualSize,

    /// `rebuild_time / staleness`: size-blind variant, for workloads whose
    /// payloads are near-uniform.
    GreedyDual,
}

/// Rank one evictable entry. Lower ranks evict sooner.
///
/// `staleness` is clamped to one nanosecond so a value ranked in the same
/// instant it was produced still has a finite cost.
pub fn reclaim_cost(policy: CostPolicy, rebuild: Time, staleness: Time, size_bytes: usize) -> f64 {
    if size_bytes == 0 {
        return KEEP_FOREVER;
    }
    let rebuild_ns = rebuild.as_nanos() as f64;
    let staleness_ns = staleness.as_nanos().max(1) as f64;
    match policy {
        CostPolicy::GreedyDualSize => rebuild_ns / (staleness_ns * size_bytes as f64),
        CostPolicy::GreedyDual => rebuild_ns / staleness_ns,
    }
}
