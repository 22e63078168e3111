//! Rebuild-Cost Accounting
//!
//! Evicting a value is only half a decision; the other half is knowing what
//! it will cost to bring it back. That cost is not a per-value constant:
//! rebuilding a value whose inputs are themselves evicted means rebuilding
//! the inputs first, so evicted values form *groups* whose rebuild costs sum.
//!
//! - [`CostGroup`]: a union-find of evicted steps accumulating total rebuild
//!   time per group (law C-001).
//! - [`CostPolicy`] / [`reclaim_cost`]: the Greedy-Dual ranking that turns
//!   (staleness, size, rebuild time) into an eviction priority.

mod group;
mod policy;

pub use group::{largest_group, CostGroup};
pub use policy::{reclaim_cost, CostPolicy, EVICT_NOW, KEEP_FOREVER};
