//! Property Tests - Invariants Under Random Workloads
//!
//! Random step graphs, eviction storms, and clock skews; the engine's laws
//! must hold at every intermediate state, and every value must come back
//! byte-identical no matter how often it is thrown away.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use proptest::prelude::*;

use samsara::{
    bind, bind_erased, dereference, evict, fast_forward, lift, reap, BindFn, EngineConfig,
    Handle, Tock, Trailokya, Yield,
};

fn num(n: u64) -> Vec<u8> {
    n.to_le_bytes().to_vec()
}

fn read(bytes: &[u8]) -> u64 {
    u64::from_le_bytes(bytes.try_into().expect("eight bytes"))
}

/// Step spec: own seed plus indices (mod available) of earlier steps to read.
fn dag_strategy() -> impl Strategy<Value = Vec<(u64, Vec<usize>)>> {
    prop::collection::vec(
        (any::<u64>(), prop::collection::vec(0usize..100, 0..3)),
        1..16,
    )
}

/// Build the recorded DAG and its reference model side by side.
fn build_dag(spec: &[(u64, Vec<usize>)]) -> (Vec<Handle>, Vec<u64>) {
    let mut handles: Vec<Handle> = Vec::new();
    let mut expected: Vec<u64> = Vec::new();
    for (seed, choices) in spec {
        let picked: Vec<usize> = if handles.is_empty() {
            Vec::new()
        } else {
            choices.iter().map(|c| c % handles.len()).collect()
        };
        let inputs: Vec<Handle> = picked.iter().map(|&i| handles[i].clone()).collect();
        let model = picked
            .iter()
            .fold(*seed, |acc, &i| acc.wrapping_add(expected[i]));

        let seed = *seed;
        let h = bind(
            move |xs: &[&[u8]]| {
                let acc = xs.iter().fold(seed, |acc, x| acc.wrapping_add(read(x)));
                Yield::Value(num(acc))
            },
            &inputs,
        );
        handles.push(h);
        expected.push(model);
    }
    (handles, expected)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Timeline coverage (law M-001) and heap back-indices (law M-002) hold
    /// through arbitrary interleavings of eviction, access, clock skew, and
    /// reaping; every value survives byte-identically (law R-001).
    #[test]
    fn prop_dag_survives_eviction_churn(
        spec in dag_strategy(),
        ops in prop::collection::vec((0u8..4, 0usize..100, 1u64..1000), 0..40),
    ) {
        Trailokya::reset(EngineConfig::default());
        let (handles, expected) = build_dag(&spec);

        // Every handle's producing step sits on the timeline at its tick.
        for h in &handles {
            let stat = Trailokya::with(|t| t.stat(h.tock()));
            let stat = stat.expect("producing step missing from the timeline");
            prop_assert_eq!(stat.start, h.tock());
            prop_assert!(stat.end > stat.start);
        }
        prop_assert!(Trailokya::with(|t| t.backlinks_hold()));

        for (op, idx, amount) in ops {
            let h = &handles[idx % handles.len()];
            match op {
                0 => {
                    evict(h);
                }
                1 => {
                    prop_assert_eq!(read(&dereference(h)), expected[idx % handles.len()]);
                }
                2 => fast_forward(Duration::from_millis(amount)),
                _ => {
                    reap();
                }
            }
            prop_assert!(Trailokya::with(|t| t.backlinks_hold()));
        }

        for (h, want) in handles.iter().zip(&expected) {
            prop_assert_eq!(read(&dereference(h)), *want);
        }
    }

    /// Replay determinism (law R-001): evict-and-rebuild any number of
    /// times, the payload never drifts.
    #[test]
    fn prop_replay_is_deterministic(
        spec in dag_strategy(),
        rounds in 1usize..4,
    ) {
        Trailokya::reset(EngineConfig::default());
        let (handles, _) = build_dag(&spec);

        let baseline: Vec<Vec<u8>> =
            handles.iter().map(|h| dereference(h).to_vec()).collect();
        for _ in 0..rounds {
            for h in handles.iter().rev() {
                evict(h);
            }
            for (h, want) in handles.iter().zip(&baseline) {
                let got = dereference(h);
                prop_assert_eq!(got.as_ref(), &want[..]);
            }
        }
    }

    /// Group conservation (law C-001): before any eviction each step's group
    /// is a singleton of its own time; after evicting a whole chain, in any
    /// order, one group holds the exact sum.
    #[test]
    fn prop_chain_group_sums_times(
        (millis, order) in prop::collection::vec(1u64..40, 2..7).prop_flat_map(|ms| {
            let n = ms.len();
            (Just(ms), Just((0..n).collect::<Vec<usize>>()).prop_shuffle())
        }),
    ) {
        Trailokya::reset(EngineConfig::default());

        let mut handles: Vec<Handle> = Vec::new();
        for (i, ms) in millis.iter().enumerate() {
            let ms = *ms;
            let inputs: Vec<Handle> = handles.last().cloned().into_iter().collect();
            let h = bind(
                move |xs: &[&[u8]]| {
                    fast_forward(Duration::from_millis(ms));
                    let base = xs.first().map_or(0, |x| read(x));
                    Yield::Value(num(base.wrapping_add(i as u64)))
                },
                &inputs,
            );
            handles.push(h);
        }

        let times: Vec<Duration> = handles
            .iter()
            .map(|h| Trailokya::with(|t| t.stat(h.tock()).unwrap().time_taken))
            .collect();

        // Singleton groups before any eviction.
        for (h, taken) in handles.iter().zip(&times) {
            let group = Trailokya::with(|t| t.stat(h.tock()).unwrap().rebuild_cost);
            prop_assert_eq!(group, *taken);
        }

        // Evict the whole chain in the shuffled order the strategy chose.
        for &i in &order {
            evict(&handles[i]);
        }

        let total: Duration = times.iter().sum();
        for h in &handles {
            let group = Trailokya::with(|t| t.stat(h.tock()).unwrap().rebuild_cost);
            prop_assert_eq!(group, total);
        }
        for pair in handles.windows(2) {
            let same_group =
                Trailokya::with(|t| t.same_rebuild_group(pair[0].tock(), pair[1].tock()));
            prop_assert!(same_group);
        }
    }

    /// Tailcall flatness (law R-002): any chain length makes one context and
    /// never grows the record stack.
    #[test]
    fn prop_tailcall_chain_is_flat(n in 0u64..200) {
        Trailokya::reset(EngineConfig::default());

        fn countdown(max_depth: Rc<std::cell::Cell<usize>>) -> BindFn {
            Rc::new(move |args: &[&[u8]]| {
                let depth = Trailokya::with(|t| t.record_depth());
                max_depth.set(max_depth.get().max(depth));
                let n = read(args[0]);
                if n == 0 {
                    Yield::Value(num(0))
                } else {
                    Yield::Tailcall {
                        f: countdown(Rc::clone(&max_depth)),
                        inputs: vec![lift(num(n - 1))],
                    }
                }
            })
        }

        let max_depth = Rc::new(std::cell::Cell::new(0));
        let out = bind_erased(countdown(Rc::clone(&max_depth)), vec![lift(num(n))]);

        prop_assert_eq!(read(&dereference(&out)), 0);
        prop_assert_eq!(Trailokya::with(|t| t.context_count()), 1);
        prop_assert!(max_depth.get() <= 2);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Nested-time additivity (law T-002): in a chain of nested steps, each
    /// step is charged its own fast-forward and nothing of its children's.
    #[test]
    fn prop_nested_time_additivity(
        millis in prop::collection::vec(30u64..90, 1..5),
    ) {
        Trailokya::reset(EngineConfig::default());
        let tocks: Rc<RefCell<Vec<Tock>>> = Rc::new(RefCell::new(Vec::new()));

        fn build(ffs: Vec<u64>, tocks: Rc<RefCell<Vec<Tock>>>) -> Handle {
            let inner = Rc::clone(&tocks);
            let h = bind(
                move |_| {
                    fast_forward(Duration::from_millis(ffs[0]));
                    if ffs.len() > 1 {
                        let child = build(ffs[1..].to_vec(), Rc::clone(&inner));
                        let _ = dereference(&child);
                    }
                    Yield::Value(vec![0])
                },
                &[],
            );
            tocks.borrow_mut().push(h.tock());
            h
        }

        let start = Trailokya::with(|t| t.now());
        let _root = build(millis.clone(), Rc::clone(&tocks));
        let elapsed = Trailokya::with(|t| t.now()) - start;

        let slack = Duration::from_millis(20);
        let mut attributed = Duration::ZERO;
        // Completion order is innermost first; pair each step with its own
        // fast-forward amount.
        for (tock, ms) in tocks.borrow().iter().zip(millis.iter().rev()) {
            let taken = Trailokya::with(|t| t.stat(*tock).unwrap().time_taken);
            let own = Duration::from_millis(*ms);
            prop_assert!(
                taken >= own && taken < own + slack,
                "step charged {:?}, fast-forwarded {:?}", taken, own
            );
            attributed += taken;
        }
        prop_assert!(attributed <= elapsed);
        prop_assert!(elapsed - attributed < slack);
    }
}
