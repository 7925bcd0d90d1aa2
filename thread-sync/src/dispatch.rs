// =============================================================================
// Worker Dispatch
// =============================================================================
//
// The supervisor starts one routine on every worker context with a single
// `runall`. The instruction takes two operands: the entry address and the
// vertex base each worker will see.
//
// The entry is never the user's routine itself. It is `trampoline::<E>`,
// one monomorphised copy per entry type. The trampoline:
//   1. reads the vertex base and reinterprets it as `&E::Vertex`
//   2. reads its own worker id from `$WSR`
//   3. calls `E::run` and exits with its flag as the thread's final value
//
// The trampoline never returns. A worker started by `runall` has no
// caller to return to, so the last thing it does is `thal::exit(flag)`,
// which retires the context. User routines just return their flag. The
// entry is bound at compile time, so workers never pay for an indirect
// call through a vtable.
//
// Per worker context, per round:  Idle ──runall──► Running ──exit──► Idle
//
// Dispatch does not wait. `start_on_all_workers` is the bare instruction:
// the caller must already know the previous round has drained.
// `sync_and_start_on_all_workers` issues the tile-local `sync` first, so
// it is safe whatever state the previous round is in.
// =============================================================================

use thal::EntryPoint;

use crate::barrier::TEXCH_SYNCZONE_LOCAL;
use crate::context::{self, require_supervisor, WorkerId};

/// A routine that can be started on every worker context.
///
/// Implementors are usually zero-sized marker types declared with
/// [`worker_entry!`](crate::worker_entry). Each one binds a single routine
/// to its vertex type.
pub trait WorkerEntry {
    /// The shared per-tile state every worker is handed.
    ///
    /// All workers get the same `&Vertex` at once. Fields they write must
    /// use interior mutability, and each worker should write only the
    /// slots its id owns.
    type Vertex: Sync + 'static;

    /// Body run on worker context `worker`. The return value becomes the
    /// thread's final status.
    fn run(vertex: &Self::Vertex, worker: WorkerId) -> bool;
}

fn trampoline<E: WorkerEntry>() -> ! {
    // SAFETY: this instantiation's address is only ever taken by
    // `Dispatch::of::<E>`, which pairs it with an `E::Vertex` base.
    let vertex = unsafe { context::vertex::<E::Vertex>() };
    thal::exit(E::run(vertex, context::current_worker_id()))
}

/// Operands of one `runall`, built right before the instruction and
/// consumed by it.
struct Dispatch {
    entry: EntryPoint,
    base: *const (),
}

impl Dispatch {
    #[inline(always)]
    fn of<E: WorkerEntry>(vertex: &'static E::Vertex) -> Self {
        Self {
            entry: trampoline::<E>,
            base: vertex as *const E::Vertex as *const (),
        }
    }

    /// # Safety
    ///
    /// Every worker context must be idle.
    #[inline(always)]
    unsafe fn start(self) {
        // SAFETY: forwarded to the caller.
        unsafe { thal::runall(self.entry, self.base) }
    }

    #[inline(always)]
    fn sync_and_start(self) {
        // SAFETY: the vertex is `'static`, and the sync drains the previous
        // round before `runall` issues.
        unsafe { thal::sync_and_runall::<TEXCH_SYNCZONE_LOCAL>(self.entry, self.base) }
    }
}

/// Start `E` on every worker context and return immediately.
///
/// # Safety
///
/// Supervisor only. Every worker context must already be idle: either no
/// round was ever started or a [`sync_all_workers`](crate::sync_all_workers)
/// has returned since the last one. Use [`sync_and_start_on_all_workers`]
/// when that is not known.
#[inline(always)]
pub unsafe fn start_on_all_workers<E: WorkerEntry>(vertex: &'static E::Vertex) {
    require_supervisor("start_on_all_workers");
    // SAFETY: the vertex is `'static`; idleness is the caller's contract.
    unsafe { Dispatch::of::<E>(vertex).start() }
}

/// Wait for the previous round to drain, then start `E` on every worker
/// context and return immediately.
///
/// Supervisor only. Call [`sync_all_workers`](crate::sync_all_workers)
/// before reading results the new round writes.
#[inline(always)]
pub fn sync_and_start_on_all_workers<E: WorkerEntry>(vertex: &'static E::Vertex) {
    require_supervisor("sync_and_start_on_all_workers");
    Dispatch::of::<E>(vertex).sync_and_start();
}
