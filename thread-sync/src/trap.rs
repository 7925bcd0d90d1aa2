//! Patched breakpoints and explicit worker exit.
//!
//! Both operations end the calling context on the spot. Nothing unwinds on
//! the target; a trap hands the tile to the debugger and `exitz` retires
//! the worker context.

use thal::consts::{PBRK0, PBRK1};

/// The patched breakpoint slots a trap can raise.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PatchedBreakpoint {
    #[default]
    Pbrk0 = PBRK0,
    Pbrk1 = PBRK1,
}

impl PatchedBreakpoint {
    /// Immediate encoded in the `trap` instruction.
    pub const fn code(self) -> u8 {
        self as u8
    }
}

/// Raise `breakpoint` on the calling context. Never returns.
#[inline(always)]
pub fn trap(breakpoint: PatchedBreakpoint) -> ! {
    // `trap` takes an immediate, so each slot gets its own instruction.
    match breakpoint {
        PatchedBreakpoint::Pbrk0 => thal::trap::<PBRK0>(),
        PatchedBreakpoint::Pbrk1 => thal::trap::<PBRK1>(),
    }
}

/// Retire the calling worker context. Never returns.
///
/// Routines started through [`crate::dispatch`] just return their flag; the
/// trampoline exits with it. This ends a routine early, with no flag.
#[inline(always)]
pub fn exit_worker() -> ! {
    thal::exitz()
}
