//! Kani Proofs for the Clocks
//!
//! The clocks are the foundation every cost estimate stands on, so their two
//! laws get machine-checked harnesses in addition to unit tests:
//!
//! - T-001: readings never decrease
//! - T-002: a closed frame's exclusive time never exceeds elapsed time
//!
//! `Instant` itself is opaque to the model checker, so the harnesses drive
//! the clocks exclusively through symbolic `fast_forward` amounts, which is
//! also the only perturbation the engine supports.

#[cfg(kani)]
mod kani_proofs {
    use super::super::{NestedClock, RawClock};
    use std::time::Duration;

    /// T-001: fast-forwarding never moves a reading backwards.
    #[kani::proof]
    #[kani::unwind(4)]
    fn proof_reading_monotonic_under_fast_forward() {
        let mut clock = RawClock::new();

        let d1: u64 = kani::any();
        let d2: u64 = kani::any();
        kani::assume(d1 <= 1_000_000);
        kani::assume(d2 <= 1_000_000);

        let t0 = clock.now();
        clock.fast_forward(Duration::from_nanos(d1));
        let t1 = clock.now();
        kani::assert(t1 >= t0, "reading must not decrease");

        clock.fast_forward(Duration::from_nanos(d2));
        let t2 = clock.now();
        kani::assert(t2 >= t1, "reading must remain monotonic");
    }

    /// T-002: the exclusive time of a frame is bounded by elapsed time, and
    /// an inner frame's time is not charged to the outer frame.
    #[kani::proof]
    #[kani::unwind(8)]
    fn proof_nested_frame_excluded() {
        let mut raw = RawClock::new();
        let mut clock = NestedClock::new();

        let outer_work: u64 = kani::any();
        let inner_work: u64 = kani::any();
        kani::assume(outer_work <= 1_000_000);
        kani::assume(inner_work <= 1_000_000);

        let start = raw.now();
        clock.push_frame(&raw);
        raw.fast_forward(Duration::from_nanos(outer_work));

        clock.push_frame(&raw);
        raw.fast_forward(Duration::from_nanos(inner_work));
        let inner_taken = clock.pop_frame(&raw);

        let outer_taken = clock.pop_frame(&raw);
        let elapsed = raw.now() - start;

        kani::assert(
            inner_taken >= Duration::from_nanos(inner_work),
            "inner frame must see its own work",
        );
        kani::assert(
            outer_taken + inner_taken <= elapsed,
            "attributed time must not exceed elapsed time",
        );
        kani::assert(
            outer_taken >= Duration::from_nanos(outer_work) && outer_taken <= elapsed - inner_taken,
            "outer frame must exclude the inner frame's work",
        );
    }
}
