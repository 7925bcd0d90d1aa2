//! Tile constants.
//!
//! These mirror the toolchain's `TileConstants.hpp` for the Mk2 tile.
//! A mismatch with the target revision is a silent correctness bug, so
//! keep them in lock-step with the header.

/// Number of worker contexts per tile.
pub const NUM_WORKERS: usize = 6;

/// Index of the worker status register (`$WSR`).
pub const CSR_W_WSR__INDEX: u32 = 0x1;

/// Shift of the `CTXTID_M1` field (context id minus one) in `$WSR`.
pub const CSR_W_WSR__CTXTID_M1__SHIFT: u32 = 0;

/// Mask of the `CTXTID_M1` field in `$WSR`.
pub const CSR_W_WSR__CTXTID_M1__MASK: u32 = 0x7;

/// Sync zone covering only the issuing tile.
pub const TEXCH_SYNCZONE_LOCAL: u32 = 0;

/// Immediate of the first patched breakpoint.
pub const PBRK0: u8 = 0;

/// Immediate of the second patched breakpoint.
pub const PBRK1: u8 = 1;
