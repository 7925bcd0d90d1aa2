//! Tile Hardware Abstraction Layer.
//!
//! Every instruction the thread-sync primitives depend on lives behind this
//! crate: the worker status CSR read, the vertex base register, `runall`,
//! `sync`, `trap`, `exit` and `exitz`. Two backends provide the same surface:
//!
//! - `colossus`: the real instructions, emitted with inline assembly.
//! - `sim` (default): a hosted tile simulator where OS threads stand in
//!   for worker contexts. Used for tests and off-target development.
//!
//! The rest of the workspace uses `thal::*` and never names a backend.
#![cfg_attr(not(feature = "sim"), no_std)]

pub mod consts;

#[cfg(feature = "colossus")]
mod colossus;

#[cfg(feature = "colossus")]
pub use colossus::*;

#[cfg(all(feature = "sim", not(feature = "colossus")))]
pub mod sim;

#[cfg(all(feature = "sim", not(feature = "colossus")))]
pub use sim::{exit, exitz, get_csr, in_worker, runall, sync, sync_and_runall, trap, vertex_base};

#[cfg(not(any(feature = "sim", feature = "colossus")))]
compile_error!("thal needs a backend: enable either the `sim` or the `colossus` feature");

/// Address of a worker entry routine as handed to `runall`.
///
/// The routine takes no arguments: a worker finds its state through the
/// vertex base register and its identity through `$WSR`. It never returns:
/// a worker context only retires through an exit instruction, and the
/// status it exits with is the thread's final value. See [`exit`].
pub type EntryPoint = fn() -> !;
