//! Union-Find of Rebuild Times
//!
//! Each completed step starts in a singleton group holding its own execution
//! time. When eviction chains steps together (rebuilding one means rebuilding
//! the other first), their groups merge and the root accumulates the sum.
//!
//! # Law C-001 (Group Conservation)
//!
//! A merge never loses time: the merged root's payload equals the sum of the
//! two previous roots' payloads. `increase` adds observed replay time to the
//! root, so estimates track reality as values are rebuilt.
//!
//! Path compression keeps `value()` effectively O(α(n)); the payload is
//! meaningful only at a root.

use std::cell::RefCell;
use std::rc::Rc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::debug;

use crate::domain::clock::Time;

/// Largest group payload ever observed, process-wide.
///
/// Purely a diagnostic high-water mark; it participates in no invariant.
static LARGEST_GROUP: Lazy<Mutex<Time>> = Lazy::new(|| Mutex::new(Time::ZERO));

/// Read the largest rebuild-group total ever seen in this process.
pub fn largest_group() -> Time {
    *LARGEST_GROUP.lock()
}

fn record_high_water(total: Time) {
    let mut largest = LARGEST_GROUP.lock();
    if total > *largest {
        *largest = total;
        debug!(total_ns = total.as_nanos() as u64, "new largest rebuild group");
    }
}

struct GroupNode {
    parent: Option<Rc<RefCell<GroupNode>>>,
    /// Meaningful only when `parent` is `None`.
    total: Time,
}

impl GroupNode {
    /// Find the root of `node`, compressing the path behind it.
    fn root(node: &Rc<RefCell<GroupNode>>) -> Rc<RefCell<GroupNode>> {
        let parent = node.borrow().parent.clone();
        match parent {
            None => Rc::clone(node),
            Some(p) => {
                let root = Self::root(&p);
                node.borrow_mut().parent = Some(Rc::clone(&root));
                root
            }
        }
    }
}

/// Handle to one set in the union-find of rebuild times.
///
/// Cloning the handle aliases the same set; two handles compare as the same
/// group when their roots coincide.
#[derive(Clone)]
pub struct CostGroup {
    node: Rc<RefCell<GroupNode>>,
}

impl CostGroup {
    /// Create a singleton group holding `time`.
    pub fn new(time: Time) -> Self {
        Self {
            node: Rc::new(RefCell::new(GroupNode {
                parent: None,
                total: time,
            })),
        }
    }

    /// Total rebuild time of the group this handle belongs to.
    pub fn value(&self) -> Time {
        GroupNode::root(&self.node).borrow().total
    }

    /// Add `d` to the group total.
    pub fn increase(&self, d: Time) {
        let root = GroupNode::root(&self.node);
        let total = {
            let mut root = root.borrow_mut();
            root.total += d;
            root.total
        };
        record_high_water(total);
    }

    /// Unite this group with `other`, summing their totals.
    ///
    /// Union direction is irrelevant to correctness; merging a group with
    /// itself is a no-op.
    pub fn merge(&self, other: &CostGroup) {
        let lhs = GroupNode::root(&self.node);
        let rhs = GroupNode::root(&other.node);
        if Rc::ptr_eq(&lhs, &rhs) {
            return;
        }
        let moved = lhs.borrow().total;
        lhs.borrow_mut().parent = Some(Rc::clone(&rhs));
        let total = {
            let mut rhs = rhs.borrow_mut();
            rhs.total += moved;
            rhs.total
        };
        record_high_water(total);
    }

    /// Whether two handles currently belong to the same group.
    pub fn same_group(&self, other: &CostGroup) -> bool {
        Rc::ptr_eq(&GroupNode::root(&self.node), &GroupNode::root(&other.node))
    }
}

impl std::fmt::Debug for CostGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CostGroup")
            .field("value", &self.value())
            .finish()
    }
}
