// ==============================================
// ENGINE INVARIANT TESTS (integration)
// ==============================================
//
// Behaviour that spans the box store, the segmented queue, admission control
// and the ghost cache together.

use flashbox::admission::{AdmissionConfig, AdmissionPolicy};
use flashbox::builder::EngineBuilder;
use flashbox::ds::GhostCache;
use flashbox::engine::{CacheEngine, RequestOutcome};

fn single_class_engine(cache_size: u64) -> CacheEngine {
    EngineBuilder::new(cache_size)
        .max_box_size(100)
        .size_classes(vec![100])
        .build()
}

// ==============================================
// Box Lifecycle Scenario
// ==============================================
//
// One 100-byte class, 100-byte boxes, 400-byte cache: two boxes per segment.
// Every object fills a box exactly, so every admission seals.

mod box_lifecycle {
    use super::*;

    #[test]
    fn fifth_box_evicts_the_first() {
        let mut engine = single_class_engine(400);
        for id in ["A", "B", "C", "D", "E"] {
            assert!(matches!(engine.request(id, 100), RequestOutcome::MissAdmitted(_)));
        }

        let counters = engine.counters();
        assert_eq!(counters.num_seals, 5);
        assert_eq!(counters.evicted_boxes, 1);
        assert_eq!(engine.queue().hot_len(), 2);
        assert_eq!(engine.queue().cold_len(), 2);
        assert_eq!(engine.store().lookup_sealed("A"), None);

        let outcome = engine.request("A", 100);
        assert!(
            matches!(outcome, RequestOutcome::MissAdmitted(_)),
            "A was evicted, got {outcome:?}"
        );
        engine.check_invariants().unwrap();
    }

    #[test]
    fn survivors_still_hit() {
        let mut engine = single_class_engine(400);
        for id in ["A", "B", "C", "D", "E"] {
            engine.request(id, 100);
        }
        for id in ["B", "C", "D", "E"] {
            assert!(matches!(engine.request(id, 100), RequestOutcome::HitSealed(_)), "{id}");
        }
        engine.check_invariants().unwrap();
    }
}

// ==============================================
// Ghost Cache Scenario
// ==============================================

mod ghost_cache {
    use super::*;

    #[test]
    fn evicted_entry_restarts_its_count() {
        let mut ghost = GhostCache::new(2);
        assert_eq!(ghost.record_access("X".to_string()), 1);
        assert_eq!(ghost.record_access("Y".to_string()), 1);
        assert_eq!(ghost.record_access("Z".to_string()), 1);

        assert!(!ghost.contains(&"X".to_string()));
        assert_eq!(ghost.record_access("X".to_string()), 1);
    }
}

// ==============================================
// Eviction Correctness
// ==============================================

mod eviction {
    use super::*;

    #[test]
    fn evicted_members_leave_the_index() {
        let mut engine = EngineBuilder::new(400)
            .max_box_size(100)
            .size_classes(vec![50, 100])
            .build();
        // box 1 holds a, b and c; d overflows and seals it
        for id in ["a", "b", "c", "d"] {
            engine.request(id, 30);
        }
        // each 100-byte object seals a box of its own
        for id in ["w", "x", "y", "z"] {
            engine.request(id, 100);
        }
        assert_eq!(engine.counters().evicted_boxes, 1);
        assert_eq!(engine.counters().evicted_objects, 3);

        for id in ["a", "b", "c"] {
            assert_eq!(engine.store().lookup_sealed(id), None);
            assert!(!matches!(engine.request(id, 30), RequestOutcome::HitSealed(_)));
        }
        engine.check_invariants().unwrap();
    }
}

// ==============================================
// Repeated Hits
// ==============================================

mod repeated_hits {
    use super::*;

    #[test]
    fn second_hit_is_a_hot_reshuffle() {
        let mut engine = single_class_engine(400);
        for id in ["A", "B", "C"] {
            engine.request(id, 100);
        }
        // A's box is in cold
        assert_eq!(engine.queue().cold_len(), 1);

        engine.request("A", 100);
        let hot = engine.queue().hot_size();
        let cold = engine.queue().cold_size();

        assert!(matches!(engine.request("A", 100), RequestOutcome::HitSealed(_)));
        assert_eq!(engine.queue().hot_size(), hot);
        assert_eq!(engine.queue().cold_size(), cold);
        assert_eq!(engine.counters().evicted_boxes, 0);
    }
}

// ==============================================
// Admission Wiring
// ==============================================

mod admission {
    use super::*;

    #[test]
    fn frequency_threshold_needs_ghost_sightings_once_budget_is_used() {
        let mut engine = EngineBuilder::new(10_000)
            .max_box_size(100)
            .size_classes(vec![100])
            .admission(
                AdmissionConfig::new(AdmissionPolicy::FrequencyThreshold, 100)
                    .warmup_quanta(0)
                    .k(3),
            )
            .ghost_capacity(16)
            .build();

        // four quotas written: past the first interval segment
        for id in ["a", "b", "c", "d"] {
            assert!(matches!(engine.request(id, 100), RequestOutcome::MissAdmitted(_)));
        }
        assert_eq!(engine.admission().threshold(), Some(3));

        let outcomes: Vec<RequestOutcome> = (0..4).map(|_| engine.request("hot", 10)).collect();
        assert_eq!(outcomes[..3], [RequestOutcome::MissRejected; 3]);
        assert!(matches!(outcomes[3], RequestOutcome::MissAdmitted(_)));
        engine.check_invariants().unwrap();
    }

    #[test]
    fn same_seed_replays_identically() {
        let run = || {
            let mut engine = EngineBuilder::new(2_000)
                .max_box_size(100)
                .size_classes(vec![25, 50, 100])
                .admission(
                    AdmissionConfig::new(AdmissionPolicy::Exponential, 300)
                        .epoch(50)
                        .warmup_quanta(1)
                        .seed(11),
                )
                .build();
            (0..1_000u64)
                .map(|n| {
                    let id = (n * 7919) % 97;
                    engine.request(&id.to_string(), 1 + id % 100)
                })
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }
}

// ==============================================
// Property Tests - Randomized Invariants
// ==============================================

mod properties {
    use super::*;
    use proptest::prelude::*;

    const MAX_OBJECT: u64 = 100;

    fn size_of(id: u16) -> u64 {
        1 + (u64::from(id) * 37) % MAX_OBJECT
    }

    fn policy_strategy() -> impl Strategy<Value = AdmissionPolicy> {
        prop::sample::select(vec![
            AdmissionPolicy::AdmitAll,
            AdmissionPolicy::Linear,
            AdmissionPolicy::LinearBalance,
            AdmissionPolicy::Exponential,
            AdmissionPolicy::Logarithmic,
            AdmissionPolicy::LogarithmicBalance,
            AdmissionPolicy::LogBudget,
            AdmissionPolicy::FixedProbability,
            AdmissionPolicy::GrowingBudget,
            AdmissionPolicy::FrequencyThreshold,
        ])
    }

    fn engine_for(policy: AdmissionPolicy, seed: u64) -> CacheEngine {
        EngineBuilder::new(600)
            .max_box_size(MAX_OBJECT)
            .size_classes(vec![25, 50, MAX_OBJECT])
            .admission(
                AdmissionConfig::new(policy, 400)
                    .epoch(40)
                    .warmup_quanta(1)
                    .k(3)
                    .seed(seed),
            )
            .ghost_capacity(32)
            .build()
    }

    proptest! {
        /// Property: bookkeeping stays consistent after every request
        #[cfg_attr(miri, ignore)]
        #[test]
        fn prop_engine_invariants_hold(
            policy in policy_strategy(),
            seed in any::<u64>(),
            ids in prop::collection::vec(0u16..64, 1..400)
        ) {
            let mut engine = engine_for(policy, seed);
            let segment = engine.queue().segment_capacity();

            for (n, id) in ids.iter().enumerate() {
                engine.request(&id.to_string(), size_of(*id));

                let c = engine.counters();
                prop_assert_eq!(c.num_requests, n as u64 + 1);
                prop_assert_eq!(
                    c.hits + c.miss_admitted + c.miss_rejected + c.unroutable,
                    c.num_requests
                );
                prop_assert!(engine.queue().hot_size() <= segment);
                prop_assert!(engine.queue().cold_size() <= segment);
                prop_assert!(engine.check_invariants().is_ok());
            }

            for id in 0u16..64 {
                let key = id.to_string();
                let Some(class) = engine.store().route(size_of(id)) else { continue };
                let in_open = engine.store().lookup_open(class, &key);
                let in_sealed = engine.store().lookup_sealed(&key).is_some();
                prop_assert!(!(in_open && in_sealed), "{} resident twice", key);
            }
        }

        /// Property: a sealed-box hit is followed by a hit on the next
        /// identical request, and queue totals do not move
        #[cfg_attr(miri, ignore)]
        #[test]
        fn prop_repeated_hit_is_size_neutral(
            ids in prop::collection::vec(0u16..32, 1..200),
            probe in 0u16..32
        ) {
            let mut engine = engine_for(AdmissionPolicy::AdmitAll, 0);
            for id in &ids {
                engine.request(&id.to_string(), size_of(*id));
            }
            let key = probe.to_string();
            if let RequestOutcome::HitSealed(box_id) = engine.request(&key, size_of(probe)) {
                let hot = engine.queue().hot_size();
                let cold = engine.queue().cold_size();
                prop_assert_eq!(engine.request(&key, size_of(probe)), RequestOutcome::HitSealed(box_id));
                prop_assert_eq!(engine.queue().hot_size(), hot);
                prop_assert_eq!(engine.queue().cold_size(), cold);
            }
        }

        /// Property: with K = 1 the linear and logarithmic curves close once
        /// the quota is reached, so a quantum overshoots by at most one object
        #[cfg_attr(miri, ignore)]
        #[test]
        fn prop_budget_overshoot_is_one_object(
            linear in any::<bool>(),
            seed in any::<u64>(),
            sizes in prop::collection::vec(1u64..=MAX_OBJECT, 1..600)
        ) {
            let policy = if linear { AdmissionPolicy::Linear } else { AdmissionPolicy::Logarithmic };
            let quota = 500;
            let mut engine = EngineBuilder::new(10_000)
                .max_box_size(MAX_OBJECT)
                .size_classes(vec![MAX_OBJECT])
                .admission(
                    AdmissionConfig::new(policy, quota)
                        .epoch(60)
                        .warmup_quanta(0)
                        .k(1)
                        .seed(seed),
                )
                .build();

            for (n, size) in sizes.iter().enumerate() {
                engine.request(&format!("o{n}"), *size);
                prop_assert!(engine.admission().budget().written() <= quota + MAX_OBJECT);
            }
        }
    }
}
