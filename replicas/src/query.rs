//! Degraded/lost quorum predicates and per-device usage queries, all
//! lock-free reads over a published [`Index`].

use crate::entry::{DataKind, Entry};
use crate::flags::{KindMask, MarkFlags};
use crate::index::Index;
use crate::keywalker::{Key, KeyWalker};

/// Online/offline device tally for one data kind, worst-replica aggregated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindStatus {
    pub nr_online: u32,
    pub nr_offline: u32,
}

impl KindStatus {
    const NO_ENTRIES: Self = Self {
        nr_online: u32::MAX,
        nr_offline: 0,
    };
}

/// Quorum status across the four storable data kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    pub journal: KindStatus,
    pub btree_meta: KindStatus,
    pub user_data: KindStatus,
    pub cached: KindStatus,
}

/// `live.contains(from_device_list(kind, devs))`, lock-free.
pub fn is_marked(live: &Index, kind: DataKind, devs: &[u8]) -> bool {
    live.contains(&Entry::from_device_list(kind, devs))
}

/// As [`is_marked`], but for a key rather than an explicit device list: the
/// key's non-cached pointers must combine into a marked entry, and every
/// cached pointer's singleton combination must be marked `Cached`.
pub fn key_is_marked(live: &Index, kind: DataKind, key: &Key, walker: &dyn KeyWalker) -> bool {
    let entry = Entry::from_key(kind, key, walker);
    if !entry.is_empty() && !live.contains(&entry) {
        return false;
    }
    for dev in walker.cached_devs(key) {
        let singleton = Entry::from_device_list(DataKind::Cached, &[dev]);
        if !live.contains(&singleton) {
            return false;
        }
    }
    true
}

/// Tallies, for each storable data kind, the minimum `nr_online` and maximum
/// `nr_offline` across every live entry of that kind against `online`, a
/// bitmap indexed by device id. A kind with no entries reports
/// `nr_online = u32::MAX` (always enough) and `nr_offline = 0`.
pub fn status(live: &Index, online: &[bool]) -> Status {
    let mut per = [KindStatus::NO_ENTRIES; 4];

    for i in 0..live.len() {
        let view = live.entry_at(i);
        let kind = view.data_kind_raw();
        if kind as usize >= per.len() {
            continue;
        }
        let devs = view.devs();
        let nr_online = devs
            .iter()
            .filter(|&&d| online.get(d as usize).copied().unwrap_or(false))
            .count() as u32;
        let nr_offline = devs.len() as u32 - nr_online;

        let slot = &mut per[kind as usize];
        slot.nr_online = slot.nr_online.min(nr_online);
        slot.nr_offline = slot.nr_offline.max(nr_offline);
    }

    Status {
        journal: per[DataKind::Journal as usize],
        btree_meta: per[DataKind::BtreeMeta as usize],
        user_data: per[DataKind::UserData as usize],
        cached: per[DataKind::Cached as usize],
    }
}

/// Whether `status` clears quorum for journal, btree-meta, and user-data
/// given `flags`'s force overrides. Journal and btree-meta are gated by the
/// metadata force bits; user-data by the data force bits. `cached` is not
/// part of this predicate.
pub fn have_enough(status: &Status, flags: MarkFlags) -> bool {
    let check = |k: &KindStatus, force_degraded: bool, force_lost: bool| {
        (k.nr_offline == 0 || force_degraded) && (k.nr_online > 0 || force_lost)
    };

    check(
        &status.journal,
        flags.force_if_metadata_degraded(),
        flags.force_if_metadata_lost(),
    ) && check(
        &status.btree_meta,
        flags.force_if_metadata_degraded(),
        flags.force_if_metadata_lost(),
    ) && check(
        &status.user_data,
        flags.force_if_data_degraded(),
        flags.force_if_data_lost(),
    )
}

/// Bitmap of data kinds for which some live entry contains `dev_idx`.
pub fn dev_has_data(live: &Index, dev_idx: u8) -> KindMask {
    let mut mask = KindMask::default();
    for i in 0..live.len() {
        let view = live.entry_at(i);
        if !view.devs().contains(&dev_idx) {
            continue;
        }
        match DataKind::from_u8(view.data_kind_raw()) {
            Some(DataKind::Journal) => mask.set_journal(true),
            Some(DataKind::BtreeMeta) => mask.set_btree_meta(true),
            Some(DataKind::UserData) => mask.set_user_data(true),
            Some(DataKind::Cached) => mask.set_cached(true),
            _ => {}
        }
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keywalker::DevPointer;

    fn idx_with(entries: &[(DataKind, &[u8])]) -> Index {
        let mut idx = Index::empty();
        for &(kind, devs) in entries {
            idx = idx.insert_copy(&Entry::from_device_list(kind, devs)).unwrap();
        }
        idx
    }

    #[test]
    fn is_marked_is_permutation_invariant() {
        let idx = idx_with(&[(DataKind::UserData, &[0, 1])]);
        assert!(is_marked(&idx, DataKind::UserData, &[1, 0]));
    }

    #[test]
    fn status_reports_worst_replica_per_kind() {
        let idx = idx_with(&[
            (DataKind::Journal, &[0, 1]),
            (DataKind::BtreeMeta, &[0, 1]),
            (DataKind::UserData, &[0, 1, 2]),
        ]);
        let online = [true, false, true];
        let status = status(&idx, &online);

        assert_eq!(status.journal.nr_online, 1);
        assert_eq!(status.journal.nr_offline, 1);
        assert_eq!(status.btree_meta.nr_online, 1);
        assert_eq!(status.btree_meta.nr_offline, 1);
        assert_eq!(status.user_data.nr_online, 2);
        assert_eq!(status.user_data.nr_offline, 1);
    }

    #[test]
    fn status_reports_infinite_online_for_absent_kind() {
        let idx = idx_with(&[(DataKind::Journal, &[0])]);
        let status = status(&idx, &[true]);
        assert_eq!(status.user_data.nr_online, u32::MAX);
        assert_eq!(status.user_data.nr_offline, 0);
    }

    #[test]
    fn have_enough_fails_without_force_and_passes_with_it() {
        let idx = idx_with(&[
            (DataKind::Journal, &[0, 1]),
            (DataKind::BtreeMeta, &[0, 1]),
            (DataKind::UserData, &[0, 1, 2]),
        ]);
        let status = status(&idx, &[true, false, true]);

        assert!(!have_enough(&status, MarkFlags::default()));

        let mut flags = MarkFlags::default();
        flags.set_force_if_metadata_degraded(true);
        flags.set_force_if_data_degraded(true);
        assert!(have_enough(&status, flags));
    }

    #[test]
    fn dev_has_data_reports_every_kind_referencing_device() {
        let idx = idx_with(&[(DataKind::Journal, &[2]), (DataKind::UserData, &[2, 3])]);
        let mask = dev_has_data(&idx, 2);
        assert!(mask.journal());
        assert!(mask.user_data());
        assert!(!mask.btree_meta());

        let mask3 = dev_has_data(&idx, 3);
        assert!(!mask3.journal());
        assert!(mask3.user_data());
    }

    struct FakeWalker {
        pointers: alloc::vec::Vec<DevPointer>,
    }

    impl KeyWalker for FakeWalker {
        fn walk_pointers(&self, _key: &Key) -> alloc::vec::Vec<DevPointer> {
            self.pointers.clone()
        }
    }

    #[test]
    fn key_is_marked_checks_both_primary_and_cached_combinations() {
        let idx = idx_with(&[
            (DataKind::UserData, &[0, 1]),
            (DataKind::Cached, &[2]),
        ]);
        let walker = FakeWalker {
            pointers: alloc::vec![
                DevPointer { dev: 0, cached: false },
                DevPointer { dev: 1, cached: false },
                DevPointer { dev: 2, cached: true },
            ],
        };
        assert!(key_is_marked(&idx, DataKind::UserData, &Key(0), &walker));

        let idx_missing_cache = idx_with(&[(DataKind::UserData, &[0, 1])]);
        assert!(!key_is_marked(
            &idx_missing_cache,
            DataKind::UserData,
            &Key(0),
            &walker
        ));
    }
}
