//! Colossus tile instructions.
//!
//! Thin wrappers around the worker and supervisor instructions. Each one
//! is `#[inline(always)]` and compiles down to the bare instruction, so the
//! primitives built on top add nothing at the supervisor/worker boundary.

use core::arch::asm;

use crate::EntryPoint;

/// Read a worker control/status register.
///
/// `INDEX` is encoded as an immediate in the `get` instruction.
#[inline(always)]
pub fn get_csr<const INDEX: u32>() -> u32 {
    let value: u32;
    // SAFETY: `get` only observes the issuing context's own CSR.
    unsafe {
        asm!(
            "get {value}, {index}",
            value = out(reg) value,
            index = const INDEX,
            options(nomem, nostack, preserves_flags)
        );
    }
    value
}

/// Read the vertex base register set by the `runall` that started this
/// worker.
#[inline(always)]
pub fn vertex_base() -> *const () {
    let base: *const ();
    // SAFETY: reading `$mvertex_base` has no side effects.
    unsafe {
        asm!(
            "mov {base}, $mvertex_base",
            base = out(reg) base,
            options(nomem, nostack, preserves_flags)
        );
    }
    base
}

/// Start `entry` on every worker context with `base` as the vertex base.
///
/// # Safety
///
/// Supervisor only. All worker contexts must be idle, and `base` must stay
/// valid for as long as the started workers use it.
#[inline(always)]
pub unsafe fn runall(entry: EntryPoint, base: *const ()) {
    // No `nomem`: `runall` publishes the supervisor's prior stores to the
    // workers it starts.
    asm!(
        "runall {entry}, {base}, 0",
        entry = in(reg) entry,
        base = in(reg) base,
        options(nostack)
    );
}

/// Block the supervisor until every worker context in `ZONE` is idle.
#[inline(always)]
pub fn sync<const ZONE: u32>() {
    // SAFETY: `sync` stalls the issuing context and has no other effect.
    unsafe {
        asm!("sync {zone}", zone = const ZONE, options(nostack));
    }
}

/// `sync` immediately followed by `runall`, issued as one sequence.
///
/// # Safety
///
/// Supervisor only. `base` must stay valid for as long as the started
/// workers use it.
#[inline(always)]
pub unsafe fn sync_and_runall<const ZONE: u32>(entry: EntryPoint, base: *const ()) {
    asm!(
        "sync {zone}",
        "runall {entry}, {base}, 0",
        zone = const ZONE,
        entry = in(reg) entry,
        base = in(reg) base,
        options(nostack)
    );
}

/// Raise patched breakpoint `CODE` on the issuing context.
#[inline(always)]
pub fn trap<const CODE: u8>() -> ! {
    // SAFETY: `trap` hands control to the debugger and never falls through.
    unsafe {
        asm!("trap {code}", code = const CODE, options(noreturn, nostack));
    }
}

/// Terminate the issuing worker context with `flag` as its final status.
///
/// A worker entry must end here: falling off the end of the routine would
/// `ret` through whatever `$lr` the context was started with.
#[inline(always)]
pub fn exit(flag: bool) -> ! {
    // SAFETY: `exitnz` retires the context and never falls through.
    unsafe {
        asm!(
            "exitnz {flag}",
            flag = in(reg) flag as u32,
            options(noreturn, nostack)
        );
    }
}

/// Terminate the issuing worker context with a zero status.
#[inline(always)]
pub fn exitz() -> ! {
    // SAFETY: `exitz` retires the context and never falls through.
    unsafe {
        asm!("exitz $mzero", options(noreturn, nostack));
    }
}

/// Supervisor and worker code live in separate code regions that the
/// toolchain keeps apart at compile time, so there is nothing to check at
/// run time.
#[inline(always)]
pub const fn in_worker() -> bool {
    false
}
