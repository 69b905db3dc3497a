//! The sorted-array index: a packed, Eytzinger-ordered buffer of
//! fixed-stride entry slots supporting lock-free membership queries.

use alloc::vec::Vec;

use crate::entry::Entry;
use crate::eytzinger;
use crate::flags::KindMask;
use crate::superblock::TrackerError;

/// A read-only, typed view over one physical slot of an [`Index`]'s packed
/// buffer. Never exposes raw offsets to callers outside this module.
#[derive(Debug, Clone, Copy)]
pub struct EntryView<'a> {
    slot: &'a [u8],
}

impl<'a> EntryView<'a> {
    pub fn data_kind_raw(&self) -> u8 {
        self.slot[0]
    }

    pub fn nr_devs(&self) -> usize {
        self.slot[1] as usize
    }

    pub fn devs(&self) -> &'a [u8] {
        &self.slot[2..2 + self.nr_devs()]
    }
}

/// Packed, Eytzinger-ordered array of replica entries, all padded out to a
/// common `stride`. Immutable once built: every mutation produces a new
/// `Index` rather than editing this one in place, which is what lets
/// readers traverse a published index with no locking.
#[derive(Debug, Clone)]
pub struct Index {
    stride: usize,
    nr: usize,
    buf: Vec<u8>,
}

impl Index {
    /// The empty index: stride 0, no entries.
    pub fn empty() -> Self {
        Self {
            stride: 0,
            nr: 0,
            buf: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.nr
    }

    pub fn is_empty(&self) -> bool {
        self.nr == 0
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Builds a new index from entries already in ascending sorted order
    /// (by [`Entry::cmp`], which mirrors the packed byte layout). `stride`
    /// is the max `byte_size` across all entries, or 0 if `sorted` is empty.
    pub(crate) fn from_sorted_entries(sorted: &[Entry]) -> Result<Self, TrackerError> {
        if sorted.is_empty() {
            return Ok(Self::empty());
        }
        let stride = sorted.iter().map(Entry::byte_size).max().unwrap_or(0);
        let n = sorted.len();

        let mut flat = Vec::new();
        flat.try_reserve_exact(n * stride)
            .map_err(|_| TrackerError::OutOfMemory)?;
        flat.resize(n * stride, 0);
        for (i, e) in sorted.iter().enumerate() {
            e.pack_into(&mut flat[i * stride..(i + 1) * stride]);
        }

        let mut eytz = Vec::new();
        eytz.try_reserve_exact(n * stride)
            .map_err(|_| TrackerError::OutOfMemory)?;
        eytz.resize(n * stride, 0);
        eytzinger::build(&flat, &mut eytz, n, stride);

        Ok(Self {
            stride,
            nr: n,
            buf: eytz,
        })
    }

    /// Eytzinger binary search by raw memory-compare across `stride` bytes.
    /// Immediately fails if `probe` is wider than this index's current
    /// stride, since no stored entry could possibly match it.
    pub fn contains(&self, probe: &Entry) -> bool {
        if self.nr == 0 || probe.byte_size() > self.stride {
            return false;
        }
        let mut padded = alloc::vec![0u8; self.stride];
        probe.pack_into(&mut padded);
        eytzinger::contains(&self.buf, self.nr, self.stride, &padded)
    }

    /// Allocates a new index containing every entry of `self` plus
    /// `new_entry`, re-striding existing entries if `new_entry` is wider
    /// than the current stride, and re-sorting the whole buffer into
    /// Eytzinger order. Does not check whether `new_entry` is already
    /// present — callers are expected to have checked with `contains`.
    pub(crate) fn insert_copy(&self, new_entry: &Entry) -> Result<Self, TrackerError> {
        let mut sorted = self.iter_sorted_owned()?;
        let pos = sorted.partition_point(|e| e < new_entry);
        sorted
            .try_reserve(1)
            .map_err(|_| TrackerError::OutOfMemory)?;
        sorted.insert(pos, new_entry.clone());
        Self::from_sorted_entries(&sorted)
    }

    /// Allocates a new index containing only the entries of `self` whose
    /// data kind's bit is clear in `kind_mask`. Used to seed the GC scratch
    /// table at `gc_start`.
    pub(crate) fn filter_copy(&self, kind_mask: KindMask) -> Result<Self, TrackerError> {
        let kept: Vec<Entry> = self
            .iter_sorted_owned()?
            .into_iter()
            .filter(|e| !kind_mask.contains(e.data_kind()))
            .collect();
        Self::from_sorted_entries(&kept)
    }

    /// Recovers ascending sorted order from the Eytzinger buffer (the
    /// inverse of the construction in [`from_sorted_entries`]) and decodes
    /// each slot into an owned [`Entry`].
    pub(crate) fn iter_sorted_owned(&self) -> Result<Vec<Entry>, TrackerError> {
        if self.nr == 0 {
            return Ok(Vec::new());
        }
        let mut flat = Vec::new();
        flat.try_reserve_exact(self.nr * self.stride)
            .map_err(|_| TrackerError::OutOfMemory)?;
        eytzinger::inorder_collect(&self.buf, self.nr, self.stride, &mut flat);

        let mut out = Vec::new();
        out.try_reserve_exact(self.nr)
            .map_err(|_| TrackerError::OutOfMemory)?;
        for i in 0..self.nr {
            let slot = &flat[i * self.stride..(i + 1) * self.stride];
            let (entry, _) = Entry::unpack_from(slot).map_err(|_| {
                TrackerError::InvalidSection(alloc::string::String::from(
                    "corrupt in-memory index slot",
                ))
            })?;
            out.push(entry);
        }
        Ok(out)
    }

    /// Typed view over the Eytzinger-physical slot `i` (`0 <= i < len()`),
    /// with no raw pointer arithmetic exposed to the caller.
    pub fn entry_at(&self, i: usize) -> EntryView<'_> {
        assert!(i < self.nr, "index out of bounds");
        EntryView {
            slot: &self.buf[i * self.stride..(i + 1) * self.stride],
        }
    }
}
