//! The tracker itself: the live/GC table pair, the mark path, and the
//! stateful half of the GC protocol.

use alloc::sync::Arc;

use arc_swap::{ArcSwap, ArcSwapOption};
use spin::Mutex;

use crate::entry::{DataKind, Entry};
use crate::flags::{KindMask, MarkFlags};
use crate::gc::{self, GcResult};
use crate::index::Index;
use crate::keywalker::{Key, KeyWalker};
use crate::query::{self, Status};
use crate::superblock::{self, SectionKind, SuperblockService, TrackerError};

/// One instance per filesystem. `live` and `gc` are each published via
/// `ArcSwap`, so every read method below is lock-free; `lock` and `gc_lock`
/// serialise mutators only.
pub struct Tracker {
    live: ArcSwap<Index>,
    gc: ArcSwapOption<Index>,
    lock: Mutex<()>,
    gc_lock: Mutex<()>,
}

impl Tracker {
    /// Opens the tracker at filesystem mount: decodes `live` from the
    /// superblock's replicas section, or starts empty if the section is
    /// absent (a freshly-formatted filesystem).
    pub fn open(sb: &dyn SuperblockService) -> Result<Self, TrackerError> {
        let live = match sb.get_section(SectionKind::Replicas) {
            Some(bytes) => superblock::load(&bytes)?,
            None => Index::empty(),
        };
        trace!("tracker opened with {} live entries", live.len());
        Ok(Self {
            live: ArcSwap::from_pointee(live),
            gc: ArcSwapOption::from(None),
            lock: Mutex::new(()),
            gc_lock: Mutex::new(()),
        })
    }

    /// Ensures `(kind, devs)` is present in the live table (and the GC table,
    /// if a pass is active) and durably recorded in the superblock. An empty
    /// device list (a key with no pointers) is a no-op success.
    pub fn mark(
        &self,
        sb: &dyn SuperblockService,
        kind: DataKind,
        devs: &[u8],
    ) -> Result<(), TrackerError> {
        self.mark_entry(sb, Entry::from_device_list(kind, devs))
    }

    /// As [`mark`](Self::mark), deriving the device list by walking `key`
    /// through the injected [`KeyWalker`]. Each cached pointer's singleton
    /// `(Cached, [dev])` combination is marked before the primary
    /// non-cached combination, so a subsequent `key_is_marked` for the same
    /// key agrees with what this call just persisted.
    pub fn mark_key(
        &self,
        sb: &dyn SuperblockService,
        kind: DataKind,
        key: &Key,
        walker: &dyn KeyWalker,
    ) -> Result<(), TrackerError> {
        for dev in walker.cached_devs(key) {
            self.mark(sb, DataKind::Cached, &[dev])?;
        }
        self.mark_entry(sb, Entry::from_key(kind, key, walker))
    }

    fn mark_entry(&self, sb: &dyn SuperblockService, probe: Entry) -> Result<(), TrackerError> {
        if probe.is_empty() {
            return Ok(());
        }

        let live = self.live.load_full();
        let gc = self.gc.load_full();
        let already_marked = live.contains(&probe)
            && match &gc {
                None => true,
                Some(gc) => gc.contains(&probe),
            };
        if already_marked {
            return Ok(());
        }

        self.mark_slow(sb, &probe)
    }

    /// Acquires `lock`, builds whichever of `live'`/`gc'` are missing
    /// `probe`, persists `live'` to the superblock before publishing either,
    /// and publishes both atomically. Any failure along the way returns
    /// before either `ArcSwap::store` call, so a failed mark never leaves a
    /// partially-updated table.
    fn mark_slow(&self, sb: &dyn SuperblockService, probe: &Entry) -> Result<(), TrackerError> {
        let _guard = self.lock.lock();
        trace!("mark_slow {}", probe.render());

        let gc_arc = self.gc.load_full();
        let new_gc = match &gc_arc {
            Some(gc) if !gc.contains(probe) => Some(gc.insert_copy(probe)?),
            _ => None,
        };

        let live_arc = self.live.load_full();
        let new_live = if !live_arc.contains(probe) {
            Some(live_arc.insert_copy(probe)?)
        } else {
            None
        };

        if let Some(nl) = &new_live {
            superblock::store(nl, sb)?;
            sb.flush()?;
        }

        if let Some(ng) = new_gc {
            self.gc.store(Some(Arc::new(ng)));
        }
        if let Some(nl) = new_live {
            self.live.store(Arc::new(nl));
        }

        Ok(())
    }

    /// Begins a GC pass: seeds `gc` with every live entry whose kind is
    /// *not* covered by `kind_mask`.
    ///
    /// # Panics (debug only)
    ///
    /// Panics if a pass is already active.
    pub fn gc_start(&self, kind_mask: KindMask) -> Result<(), TrackerError> {
        let _guard = self.gc_lock.lock();
        debug_assert!(
            self.gc.load_full().is_none(),
            "gc_start called while a GC pass is already active"
        );
        let live = self.live.load_full();
        let seeded = gc::seed(&live, kind_mask)?;
        trace!("gc_start seeded {} entries", seeded.len());
        self.gc.store(Some(Arc::new(seeded)));
        Ok(())
    }

    /// Ends the active GC pass. On [`GcResult::Ok`], persists `gc` and
    /// promotes it to `live`; on [`GcResult::Err`] (or an empty `gc`,
    /// meaning no pass was active) the scratch table is simply discarded.
    /// The `gc` pointer is cleared before this returns in every case.
    pub fn gc_end(&self, sb: &dyn SuperblockService, result: GcResult) -> Result<(), TrackerError> {
        let _guard = self.gc_lock.lock();
        let gc = self.gc.load_full();
        self.gc.store(None);

        let gc = match (result, gc) {
            (GcResult::Ok, Some(gc)) => gc,
            _ => {
                trace!("gc_end discarded scratch table");
                return Ok(());
            }
        };

        superblock::store(&gc, sb)?;
        sb.flush()?;
        trace!("gc_end promoted {} entries to live", gc.len());
        self.live.store(gc);
        Ok(())
    }

    pub fn is_marked(&self, kind: DataKind, devs: &[u8]) -> bool {
        query::is_marked(&self.live.load_full(), kind, devs)
    }

    pub fn key_is_marked(&self, kind: DataKind, key: &Key, walker: &dyn KeyWalker) -> bool {
        query::key_is_marked(&self.live.load_full(), kind, key, walker)
    }

    pub fn status(&self, online: &[bool]) -> Status {
        query::status(&self.live.load_full(), online)
    }

    pub fn have_enough(status: &Status, flags: MarkFlags) -> bool {
        query::have_enough(status, flags)
    }

    pub fn dev_has_data(&self, dev_idx: u8) -> KindMask {
        query::dev_has_data(&self.live.load_full(), dev_idx)
    }

    /// Snapshot of the live table's entry count, for diagnostics only.
    pub fn live_len(&self) -> usize {
        self.live.load().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{FakeKeyWalker, FakeSuperblock};
    use crate::keywalker::DevPointer;

    #[test]
    fn mark_then_is_marked() {
        let sb = FakeSuperblock::default();
        let tracker = Tracker::open(&sb).unwrap();
        tracker.mark(&sb, DataKind::UserData, &[2]).unwrap();
        assert!(tracker.is_marked(DataKind::UserData, &[2]));
    }

    #[test]
    fn duplicate_mark_does_not_rewrite_superblock() {
        let sb = FakeSuperblock::default();
        let tracker = Tracker::open(&sb).unwrap();
        tracker.mark(&sb, DataKind::UserData, &[0, 1]).unwrap();
        let writes_before = sb.write_count();

        tracker.mark(&sb, DataKind::UserData, &[1, 0]).unwrap();
        assert_eq!(sb.write_count(), writes_before);
        assert_eq!(tracker.live_len(), 1);
    }

    #[test]
    fn fresh_filesystem_marks_land_on_disk_in_sorted_order() {
        let sb = FakeSuperblock::default();
        let tracker = Tracker::open(&sb).unwrap();
        tracker.mark(&sb, DataKind::UserData, &[2]).unwrap();
        tracker.mark(&sb, DataKind::BtreeMeta, &[2]).unwrap();

        let bytes = sb.current_section().unwrap();
        let (first, consumed) = Entry::unpack_from(&bytes).unwrap();
        let (second, _) = Entry::unpack_from(&bytes[consumed..]).unwrap();
        assert_eq!(first.data_kind(), DataKind::BtreeMeta);
        assert_eq!(second.data_kind(), DataKind::UserData);
    }

    #[test]
    fn marking_empty_device_list_is_a_pure_no_op() {
        let sb = FakeSuperblock::default();
        let tracker = Tracker::open(&sb).unwrap();
        tracker.mark(&sb, DataKind::UserData, &[]).unwrap();
        assert_eq!(tracker.live_len(), 0);
        assert_eq!(sb.write_count(), 0);
    }

    #[test]
    fn mark_key_skips_cached_pointers() {
        let sb = FakeSuperblock::default();
        let tracker = Tracker::open(&sb).unwrap();
        let walker = FakeKeyWalker::new(alloc::vec![
            DevPointer { dev: 1, cached: false },
            DevPointer { dev: 2, cached: true },
        ]);
        tracker
            .mark_key(&sb, DataKind::UserData, &Key(0), &walker)
            .unwrap();
        assert!(tracker.is_marked(DataKind::UserData, &[1]));
        assert!(!tracker.is_marked(DataKind::UserData, &[1, 2]));
    }

    #[test]
    fn mark_key_leaves_key_is_marked_agreeing_for_cached_pointers() {
        let sb = FakeSuperblock::default();
        let tracker = Tracker::open(&sb).unwrap();
        let walker = FakeKeyWalker::new(alloc::vec![
            DevPointer { dev: 1, cached: false },
            DevPointer { dev: 2, cached: true },
        ]);

        tracker
            .mark_key(&sb, DataKind::UserData, &Key(0), &walker)
            .unwrap();

        assert!(tracker.key_is_marked(DataKind::UserData, &Key(0), &walker));
    }

    #[test]
    fn gc_pass_drops_stale_entries_and_keeps_remarked_ones() {
        let sb = FakeSuperblock::default();
        let tracker = Tracker::open(&sb).unwrap();
        tracker.mark(&sb, DataKind::BtreeMeta, &[0, 1]).unwrap();
        tracker.mark(&sb, DataKind::BtreeMeta, &[0, 2]).unwrap();

        let mut mask = KindMask::default();
        mask.set_btree_meta(true);
        tracker.gc_start(mask).unwrap();

        tracker.mark(&sb, DataKind::BtreeMeta, &[0, 1]).unwrap();

        tracker.gc_end(&sb, GcResult::Ok).unwrap();

        assert_eq!(tracker.live_len(), 1);
        assert!(tracker.is_marked(DataKind::BtreeMeta, &[0, 1]));
        assert!(!tracker.is_marked(DataKind::BtreeMeta, &[0, 2]));
    }

    #[test]
    fn gc_end_err_leaves_live_unchanged() {
        let sb = FakeSuperblock::default();
        let tracker = Tracker::open(&sb).unwrap();
        tracker.mark(&sb, DataKind::BtreeMeta, &[0, 1]).unwrap();

        tracker.gc_start(KindMask::default()).unwrap();
        tracker.gc_end(&sb, GcResult::Err).unwrap();

        assert_eq!(tracker.live_len(), 1);
        assert!(tracker.is_marked(DataKind::BtreeMeta, &[0, 1]));
    }

    #[test]
    fn mark_slow_failure_leaves_state_untouched() {
        let sb = FakeSuperblock::default();
        sb.set_out_of_space(true);
        let tracker = Tracker::open(&sb).unwrap();

        let err = tracker.mark(&sb, DataKind::UserData, &[0]).unwrap_err();
        assert_eq!(err, TrackerError::NoSpace);
        assert!(!tracker.is_marked(DataKind::UserData, &[0]));
        assert_eq!(tracker.live_len(), 0);
    }
}
