// =============================================================================
// ipu-thread-sync: Tile Thread Synchronization Primitives
// =============================================================================
//
// A tile runs one supervisor thread and a fixed set of worker contexts that
// share the tile's memory. This crate is the whole protocol between them:
//
//   context  : who am I (worker id), what am I working on (the vertex)
//   trap     : patched breakpoints and explicit worker exit
//   barrier  : supervisor waits for every worker context to go idle
//   dispatch : start one statically bound routine on every worker context
//
// CONTROL FLOW:
//   supervisor ── sync ──► runall(trampoline::<E>, &vertex)
//                                  │
//            ┌─────────────┬───────┴──────┬─────────────┐
//            ▼             ▼              ▼             ▼
//        worker 0      worker 1      ...          worker N-1
//        vertex() + current_worker_id() → E::run(&vertex, id) → exit
//
// The instructions themselves come from `thal`. On the target they are
// single inline-asm instructions; on the host the tile simulator stands in
// for them, which is what the tests run against.
// =============================================================================

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod macros;

pub mod barrier;
pub mod context;
pub mod dispatch;
pub mod trap;

pub use barrier::sync_all_workers;
pub use context::{current_worker_id, vertex, WorkerId};
pub use dispatch::{start_on_all_workers, sync_and_start_on_all_workers, WorkerEntry};
pub use trap::{exit_worker, trap, PatchedBreakpoint};

pub use thal::consts::NUM_WORKERS;

/// Hosted tile simulator the primitives run against off-target.
#[cfg(all(feature = "sim", not(feature = "colossus")))]
pub use thal::sim;
