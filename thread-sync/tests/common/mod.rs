//! Vertices shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::thread;
use std::time::Duration;

use ipu_thread_sync::sim::{Tile, TileConfig};
use ipu_thread_sync::{worker_entry, WorkerId, NUM_WORKERS};

pub const SENTINEL: u32 = 0x5EED_0000;

pub fn tile(workers: usize) -> Tile {
    tlog::init();
    Tile::new(TileConfig::new().workers(workers)).expect("tile")
}

/// One slot per worker context plus bookkeeping on who ran.
pub struct Sentinels {
    pub slots: [AtomicU32; NUM_WORKERS],
    pub hits: [AtomicU32; NUM_WORKERS],
    /// Bit `n` set once worker `n` has run.
    pub seen: AtomicU32,
}

impl Sentinels {
    pub fn leak() -> &'static Self {
        Box::leak(Box::new(Self {
            slots: [const { AtomicU32::new(0) }; NUM_WORKERS],
            hits: [const { AtomicU32::new(0) }; NUM_WORKERS],
            seen: AtomicU32::new(0),
        }))
    }

    fn fill(&self, worker: WorkerId) -> bool {
        self.slots[worker.index()].store(SENTINEL | worker.get(), Ordering::Relaxed);
        self.hits[worker.index()].fetch_add(1, Ordering::Relaxed);
        self.seen.fetch_or(1 << worker.get(), Ordering::Relaxed);
        false
    }

    pub fn slots(&self) -> Vec<u32> {
        self.slots.iter().map(|s| s.load(Ordering::Relaxed)).collect()
    }

    pub fn hits(&self) -> Vec<u32> {
        self.hits.iter().map(|h| h.load(Ordering::Relaxed)).collect()
    }
}

/// Two-phase vertex: phase one is slow, phase two checks phase one has
/// finished on every worker context.
pub struct Phases {
    pub workers: usize,
    pub first_done: [AtomicBool; NUM_WORKERS],
    pub overlaps: AtomicU32,
    pub second_runs: AtomicU32,
}

impl Phases {
    pub fn leak(workers: usize) -> &'static Self {
        Box::leak(Box::new(Self {
            workers,
            first_done: [const { AtomicBool::new(false) }; NUM_WORKERS],
            overlaps: AtomicU32::new(0),
            second_runs: AtomicU32::new(0),
        }))
    }

    fn slow_first(&self, worker: WorkerId) -> bool {
        // Stagger the workers so a missing barrier would show up.
        thread::sleep(Duration::from_millis(5 * (worker.get() as u64 + 1)));
        self.first_done[worker.index()].store(true, Ordering::Release);
        true
    }

    fn second(&self, _worker: WorkerId) -> bool {
        let all_done = self.first_done[..self.workers]
            .iter()
            .all(|done| done.load(Ordering::Acquire));
        if !all_done {
            self.overlaps.fetch_add(1, Ordering::Relaxed);
        }
        self.second_runs.fetch_add(1, Ordering::Relaxed);
        true
    }
}

worker_entry! {
    pub struct Fill for Sentinels => fill;
    pub struct SlowFirst for Phases => slow_first;
    pub struct SecondPhase for Phases => second;
}
