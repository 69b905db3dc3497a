//! Garbage-collection pass outcome and the pure index transform it drives.
//! The stateful half — acquiring `gc_lock`, holding the scratch index,
//! publishing or discarding it — lives on [`crate::tracker::Tracker`], which
//! owns the locks this protocol needs.

use crate::flags::KindMask;
use crate::index::Index;
use crate::superblock::TrackerError;

/// Outcome an external GC orchestrator reports back to `gc_end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcResult {
    Ok,
    Err,
}

/// Seeds a GC scratch table: the live table minus every entry whose data
/// kind is being collected. Pure function so the Eytzinger rebuild it
/// performs can be tested without a full `Tracker`.
pub(crate) fn seed(live: &Index, kind_mask: KindMask) -> Result<Index, TrackerError> {
    live.filter_copy(kind_mask)
}
