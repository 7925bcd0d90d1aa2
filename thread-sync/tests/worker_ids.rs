mod common;

use std::sync::atomic::Ordering;

use proptest::prelude::*;

use ipu_thread_sync::{sync_all_workers, sync_and_start_on_all_workers, NUM_WORKERS};

use common::{tile, Fill, Sentinels, SENTINEL};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Whatever the tile size and however many rounds run, worker ids are
    /// exactly `0..workers` and every context runs once per round.
    #[test]
    fn ids_cover_exactly_the_worker_contexts(workers in 1..=NUM_WORKERS, rounds in 1u32..4) {
        let tile = tile(workers);
        let vertex = Sentinels::leak();

        tile.run(|| {
            for _ in 0..rounds {
                sync_and_start_on_all_workers::<Fill>(vertex);
            }
            sync_all_workers();
        })
        .expect("run");

        prop_assert_eq!(vertex.seen.load(Ordering::Relaxed), (1u32 << workers) - 1);

        let hits = vertex.hits();
        let slots = vertex.slots();
        for id in 0..NUM_WORKERS {
            if id < workers {
                prop_assert_eq!(hits[id], rounds);
                prop_assert_eq!(slots[id], SENTINEL | id as u32);
            } else {
                prop_assert_eq!(hits[id], 0);
                prop_assert_eq!(slots[id], 0);
            }
        }
        prop_assert_eq!(tile.completions(), vec![rounds as u64; workers]);
    }
}
