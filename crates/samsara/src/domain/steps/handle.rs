//! Value Cells and Handles
//!
//! A step's output lives in a [`ValueCell`]: an immortal shell around a
//! mortal payload. Eviction empties the shell; replay refills it. Handles
//! hold the shell strongly, so a handle alone never keeps evicted bytes
//! alive, yet always knows where the bytes will reappear.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::domain::timeline::Tock;

/// Shell for one step's output payload.
///
/// The shell is created when the producing step completes and lives as long
/// as anything references it. The payload inside is mortal: eviction clears
/// it, replay restores a byte-identical copy.
pub struct ValueCell {
    t: Tock,
    bytes: RefCell<Option<Rc<[u8]>>>,
}

impl ValueCell {
    /// A cell holding `bytes`, produced by the step that started at `t`.
    pub fn filled(t: Tock, bytes: Rc<[u8]>) -> Self {
        Self {
            t,
            bytes: RefCell::new(Some(bytes)),
        }
    }

    /// An empty cell for a value that is currently evicted.
    pub fn hollow(t: Tock) -> Self {
        Self {
            t,
            bytes: RefCell::new(None),
        }
    }

    /// Start tick of the producing step.
    pub fn tock(&self) -> Tock {
        self.t
    }

    /// The resident payload, if any.
    pub fn bytes(&self) -> Option<Rc<[u8]>> {
        self.bytes.borrow().clone()
    }

    /// Whether the payload is resident.
    pub fn resident(&self) -> bool {
        self.bytes.borrow().is_some()
    }

    /// Resident payload size in bytes; zero when evicted.
    pub fn size(&self) -> usize {
        self.bytes.borrow().as_ref().map_or(0, |b| b.len())
    }

    /// Restore the payload, returning its size.
    pub fn fill(&self, bytes: Rc<[u8]>) -> usize {
        let size = bytes.len();
        *self.bytes.borrow_mut() = Some(bytes);
        size
    }

    /// Drop the payload, returning the number of bytes freed.
    pub fn clear(&self) -> usize {
        self.bytes.borrow_mut().take().map_or(0, |b| b.len())
    }
}

impl fmt::Debug for ValueCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueCell")
            .field("t", &self.t)
            .field("resident", &self.resident())
            .field("size", &self.size())
            .finish()
    }
}

/// A possibly-evicted reference to a step's output value.
///
/// Carries the producing step's start tick and a strong reference to the
/// value's cell. When the cell is empty the handle is *evicted*; the engine
/// materializes it by replaying the producing step before any read.
///
/// Handles are cheap to clone and freely shareable within the engine's
/// thread.
#[derive(Clone)]
pub struct Handle {
    t: Tock,
    cell: RefCell<Rc<ValueCell>>,
}

impl Handle {
    /// Handle onto an existing cell.
    pub(crate) fn new(t: Tock, cell: Rc<ValueCell>) -> Self {
        debug_assert_eq!(cell.tock(), t, "handle and cell disagree on tick");
        Self {
            t,
            cell: RefCell::new(cell),
        }
    }

    /// Handle whose value is not resident anywhere yet.
    pub(crate) fn hollow(t: Tock) -> Self {
        Self {
            t,
            cell: RefCell::new(Rc::new(ValueCell::hollow(t))),
        }
    }

    /// Start tick of the producing step.
    pub fn tock(&self) -> Tock {
        self.t
    }

    /// Whether the value can be read without replay.
    pub fn resident(&self) -> bool {
        self.cell.borrow().resident()
    }

    /// The resident payload, if any.
    pub(crate) fn cached_bytes(&self) -> Option<Rc<[u8]>> {
        self.cell.borrow().bytes()
    }

    /// The cell this handle currently points at.
    pub(crate) fn cell(&self) -> Rc<ValueCell> {
        Rc::clone(&self.cell.borrow())
    }

    /// Point this handle at the authoritative cell for its tick.
    pub(crate) fn retarget(&self, cell: Rc<ValueCell>) {
        debug_assert_eq!(cell.tock(), self.t, "retargeted across ticks");
        *self.cell.borrow_mut() = cell;
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("t", &self.t)
            .field("resident", &self.resident())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(bytes: &[u8]) -> Rc<[u8]> {
        Rc::from(bytes.to_vec())
    }

    #[test]
    fn test_cell_fill_and_clear() {
        let cell = ValueCell::hollow(Tock(3));
        assert!(!cell.resident());
        assert_eq!(cell.size(), 0);

        assert_eq!(cell.fill(payload(b"abcd")), 4);
        assert!(cell.resident());
        assert_eq!(cell.size(), 4);

        assert_eq!(cell.clear(), 4);
        assert!(!cell.resident());
        assert_eq!(cell.clear(), 0);
    }

    #[test]
    fn test_handle_sees_through_eviction() {
        let cell = Rc::new(ValueCell::filled(Tock(5), payload(b"xy")));
        let h = Handle::new(Tock(5), Rc::clone(&cell));
        assert!(h.resident());

        cell.clear();
        assert!(!h.resident());
        assert!(h.cached_bytes().is_none());

        cell.fill(payload(b"xy"));
        assert_eq!(h.cached_bytes().unwrap().as_ref(), b"xy");
    }

    #[test]
    fn test_retarget_moves_to_fresh_cell() {
        let h = Handle::hollow(Tock(9));
        assert!(!h.resident());

        let fresh = Rc::new(ValueCell::filled(Tock(9), payload(b"z")));
        h.retarget(Rc::clone(&fresh));
        assert!(h.resident());
        assert!(Rc::ptr_eq(&h.cell(), &fresh));
    }

    #[test]
    fn test_clones_share_the_cell() {
        let h = Handle::new(Tock(2), Rc::new(ValueCell::filled(Tock(2), payload(b"v"))));
        let h2 = h.clone();
        h.cell().clear();
        assert!(!h2.resident());
    }
}
