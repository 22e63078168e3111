//! Nested Clock - Exclusive Per-Step Timing
//!
//! # The Problem
//!
//! A step's recorded cost drives eviction decisions: "how long would it take
//! to rebuild this value?" If a step spends 1 ms of its own arithmetic and
//! 900 ms inside a nested step, charging it 901 ms would make the eviction
//! policy treat the cheap outer value as expensive to rebuild. Rebuild cost
//! must be *exclusive* time.
//!
//! # The Mechanism
//!
//! A stack of frames, one per step in flight. Each frame records when it was
//! opened and how much of the time since then belongs to frames nested inside
//! it (`skipped`). Closing a frame computes
//!
//! ```text
//! taken = now − (constructed_at + skipped)
//! ```
//!
//! and folds `taken + skipped` into the parent's `skipped`, so the parent in
//! turn excludes everything that happened while it was not the innermost
//! frame.
//!
//! # Law T-002 (Nested Exclusion)
//!
//! For non-overlapping nested calls, the reported `taken` values sum to the
//! real elapsed time; time spent inside inner calls is attributed only to the
//! innermost frame.

use super::raw::{RawClock, Time};

/// One in-flight timing frame.
#[derive(Debug, Clone, Copy)]
struct Frame {
    /// Clock reading when the frame was opened.
    constructed_at: Time,

    /// Time consumed by frames nested inside this one since it was opened.
    skipped: Time,
}

/// Measures wall time of a step excluding nested steps.
///
/// The frame push/pop halves are exposed separately so a caller can release
/// any interior borrows while the timed code runs; [`NestedClock::timed`] is
/// the bracketed convenience form.
#[derive(Debug, Default)]
pub struct NestedClock {
    stack: Vec<Frame>,
}

impl NestedClock {
    /// Create a clock with no frames in flight.
    pub fn new() -> Self {
        Self { stack: Vec::new() }
    }

    /// Number of frames currently in flight.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Open a frame at the raw clock's current reading.
    pub fn push_frame(&mut self, raw: &RawClock) {
        self.stack.push(Frame {
            constructed_at: raw.now(),
            skipped: Time::ZERO,
        });
    }

    /// Close the innermost frame and return its exclusive time.
    ///
    /// # Panics
    ///
    /// Popping with no frame in flight is a logic fault: the driver keeps a
    /// root frame alive for as long as it owns this clock, so push and pop
    /// calls are always balanced above it.
    pub fn pop_frame(&mut self, raw: &RawClock) -> Time {
        let frame = self
            .stack
            .pop()
            .expect("pop_frame with no frame in flight");
        let now = raw.now();
        let excluded = frame.constructed_at + frame.skipped;
        assert!(
            now >= excluded,
            "clock went backwards: now {now:?} < frame floor {excluded:?}"
        );
        let taken = now - excluded;
        if let Some(parent) = self.stack.last_mut() {
            parent.skipped += taken + frame.skipped;
        }
        taken
    }

    /// Run `f` inside a fresh frame, returning its result and exclusive time.
    pub fn timed<R>(
        &mut self,
        raw: &mut RawClock,
        f: impl FnOnce(&mut Self, &mut RawClock) -> R,
    ) -> (R, Time) {
        self.push_frame(raw);
        let out = f(self, raw);
        let taken = self.pop_frame(raw);
        (out, taken)
    }
}
