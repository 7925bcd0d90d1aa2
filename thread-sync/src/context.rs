//! Worker identity and vertex access.
//!
//! Both are derived from per-context hardware state rather than stored:
//! the identity from the `CTXTID_M1` field of `$WSR`, the vertex from the
//! base register loaded by `runall`. Call them only from worker code.

use core::fmt;

use thal::consts::{CSR_W_WSR__CTXTID_M1__MASK, CSR_W_WSR__CTXTID_M1__SHIFT, CSR_W_WSR__INDEX};

use crate::trap::{trap, PatchedBreakpoint};

/// Index of the worker context a routine is running on, `0..NUM_WORKERS`.
///
/// Stable for the duration of one dispatch round.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkerId(u32);

impl WorkerId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    /// The id as a slice index, for per-worker slots in a vertex.
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<WorkerId> for u32 {
    fn from(id: WorkerId) -> u32 {
        id.0
    }
}

/// Identity of the calling worker context.
///
/// Undefined when called from the supervisor.
#[inline(always)]
pub fn current_worker_id() -> WorkerId {
    let wsr = thal::get_csr::<CSR_W_WSR__INDEX>();
    WorkerId((wsr & CSR_W_WSR__CTXTID_M1__MASK) >> CSR_W_WSR__CTXTID_M1__SHIFT)
}

/// The vertex the current dispatch round was started with.
///
/// # Safety
///
/// Must be called from a worker routine, and `V` must be the type the
/// supervisor dispatched with. Nothing here checks either.
#[inline(always)]
pub unsafe fn vertex<'a, V>() -> &'a V {
    let base = thal::vertex_base() as *const V;
    debug_assert!(!base.is_null(), "vertex base read outside a dispatched worker");
    // SAFETY: the caller guarantees `base` points at a live `V`.
    unsafe { &*base }
}

/// Debug builds trap with PBRK1 when a supervisor-only operation is issued
/// from a worker context. Nested dispatch is not supported.
#[inline(always)]
pub(crate) fn require_supervisor(operation: &'static str) {
    if cfg!(debug_assertions) && thal::in_worker() {
        log::error!(
            "{} issued from worker context {}; only the supervisor may dispatch or sync",
            operation,
            current_worker_id()
        );
        trap(PatchedBreakpoint::Pbrk1);
    }
}
