mod common;

use std::sync::atomic::{AtomicU32, Ordering};

use ipu_thread_sync::sim::{Context, Fault, TileError, WorkerExit};
use ipu_thread_sync::{
    exit_worker, sync_all_workers, sync_and_start_on_all_workers, tile_assert, trap,
    worker_entry, PatchedBreakpoint, WorkerId, NUM_WORKERS,
};

use common::tile;

/// Counts how far each worker got through its routine.
struct Progress {
    before: [AtomicU32; NUM_WORKERS],
    after: [AtomicU32; NUM_WORKERS],
}

impl Progress {
    fn leak() -> &'static Self {
        Box::leak(Box::new(Self {
            before: [const { AtomicU32::new(0) }; NUM_WORKERS],
            after: [const { AtomicU32::new(0) }; NUM_WORKERS],
        }))
    }

    fn before(&self, worker: WorkerId) -> u32 {
        self.before[worker.index()].load(Ordering::Relaxed)
    }

    fn after(&self, worker: WorkerId) -> u32 {
        self.after[worker.index()].load(Ordering::Relaxed)
    }

    fn trap_on_first(&self, worker: WorkerId) -> bool {
        self.before[worker.index()].fetch_add(1, Ordering::Relaxed);
        if worker.get() == 0 {
            trap(PatchedBreakpoint::Pbrk0);
        }
        self.after[worker.index()].fetch_add(1, Ordering::Relaxed);
        true
    }

    fn assert_even(&self, worker: WorkerId) -> bool {
        self.before[worker.index()].fetch_add(1, Ordering::Relaxed);
        tile_assert!(worker.get() % 2 == 0, PatchedBreakpoint::Pbrk1);
        self.after[worker.index()].fetch_add(1, Ordering::Relaxed);
        true
    }

    fn exit_odd(&self, worker: WorkerId) -> bool {
        self.before[worker.index()].fetch_add(1, Ordering::Relaxed);
        if worker.get() % 2 == 1 {
            exit_worker();
        }
        self.after[worker.index()].fetch_add(1, Ordering::Relaxed);
        true
    }
}

worker_entry! {
    struct TrapOnFirst for Progress => trap_on_first;
    struct AssertEven for Progress => assert_even;
    struct ExitOdd for Progress => exit_odd;
}

#[test]
fn trap_in_worker_never_returns() {
    let tile = tile(NUM_WORKERS);
    let vertex = Progress::leak();

    let result = tile.run(|| {
        sync_and_start_on_all_workers::<TrapOnFirst>(vertex);
        sync_all_workers();
    });

    match result {
        Err(TileError::Breakpoint { context, code }) => {
            assert_eq!(context, Context::Worker(0));
            assert_eq!(code, PatchedBreakpoint::Pbrk0.code());
        }
        other => panic!("expected PBRK0 from worker 0, got {:?}", other.err()),
    }

    let first = WorkerId::new(0);
    assert_eq!(vertex.before(first), 1);
    assert_eq!(vertex.after(first), 0);
    for id in 1..NUM_WORKERS as u32 {
        assert_eq!(vertex.after(WorkerId::new(id)), 1);
    }

    let exits = tile.exits();
    assert_eq!(exits[0], Some(WorkerExit::Trapped(0)));
    assert!(exits[1..].iter().all(|exit| *exit == Some(WorkerExit::Returned(true))));
}

#[test]
fn failed_tile_assert_raises_requested_breakpoint() {
    let tile = tile(4);
    let vertex = Progress::leak();

    let result = tile.run(|| {
        sync_and_start_on_all_workers::<AssertEven>(vertex);
        sync_all_workers();
    });
    assert!(matches!(result, Err(TileError::Breakpoint { code: 1, .. })));

    let mut trapped: Vec<Context> = tile
        .faults()
        .into_iter()
        .map(|fault| match fault {
            Fault::Breakpoint { context, code } => {
                assert_eq!(code, 1);
                context
            }
            other => panic!("unexpected fault {:?}", other),
        })
        .collect();
    trapped.sort_by_key(|context| match context {
        Context::Worker(id) => *id,
        Context::Supervisor => u32::MAX,
    });
    assert_eq!(trapped, vec![Context::Worker(1), Context::Worker(3)]);

    for id in 0..4u32 {
        let expected_after = u32::from(id % 2 == 0);
        assert_eq!(vertex.after(WorkerId::new(id)), expected_after);
    }
}

#[test]
fn exit_worker_ends_routine_without_fault() {
    let tile = tile(NUM_WORKERS);
    let vertex = Progress::leak();

    tile.run(|| {
        sync_and_start_on_all_workers::<ExitOdd>(vertex);
        sync_all_workers();
    })
    .expect("explicit exit is not a fault");

    for (id, exit) in tile.exits().into_iter().enumerate() {
        let worker = WorkerId::new(id as u32);
        assert_eq!(vertex.before(worker), 1);
        if id % 2 == 1 {
            assert_eq!(exit, Some(WorkerExit::Exited));
            assert_eq!(vertex.after(worker), 0);
        } else {
            assert_eq!(exit, Some(WorkerExit::Returned(true)));
            assert_eq!(vertex.after(worker), 1);
        }
    }
    assert!(tile.faults().is_empty());
}

#[test]
fn trap_on_supervisor_halts_run() {
    let tile = tile(2);
    let reached = AtomicU32::new(0);

    let result = tile.run(|| {
        reached.fetch_add(1, Ordering::Relaxed);
        trap(PatchedBreakpoint::default());
    });

    assert!(matches!(
        result,
        Err(TileError::Breakpoint {
            context: Context::Supervisor,
            code: 0
        })
    ));
    assert_eq!(reached.load(Ordering::Relaxed), 1);
}

#[test]
fn tile_keeps_working_after_a_trap() {
    let tile = tile(NUM_WORKERS);
    let trapping = Progress::leak();
    assert!(tile
        .run(|| sync_and_start_on_all_workers::<TrapOnFirst>(trapping))
        .is_err());

    let clean = Progress::leak();
    tile.run(|| {
        sync_and_start_on_all_workers::<ExitOdd>(clean);
        sync_all_workers();
    })
    .expect("faults from an earlier run are not reported again");
    assert_eq!(tile.completions(), vec![2; NUM_WORKERS]);
}
