//! Tile-local barrier.

use crate::context::require_supervisor;

/// Sync zone covering this tile's worker contexts only. It is the zone
/// [`sync_all_workers`] waits on.
pub use thal::consts::TEXCH_SYNCZONE_LOCAL;

/// Block the supervisor until every worker context on this tile is idle.
///
/// The sync zone is the local one: this never waits on other tiles. With
/// no round in flight it returns at once, so back-to-back calls are fine.
/// A worker that never finishes hangs the tile.
#[inline(always)]
pub fn sync_all_workers() {
    require_supervisor("sync_all_workers");
    thal::sync::<TEXCH_SYNCZONE_LOCAL>();
}
