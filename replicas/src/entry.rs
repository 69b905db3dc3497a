//! Canonical replica entries: `(data_kind, sorted device list)`.

use alloc::string::String;
use alloc::vec::Vec;
use core::cmp::Ordering;
use core::fmt;

use dvida_serialize::{DvDeErr, DvDeserialize, DvSerErr, DvSerialize, Endianness};
use heapless::Vec as HVec;

use crate::keywalker::{Key, KeyWalker};
use crate::MAX_REPLICAS;

/// Coarse classification of what a replica entry's devices hold.
///
/// `SuperblockShadow` is a reserved discriminant: it occupies a slot in the
/// data-kind range but is never itself stored as an entry — passing it to
/// [`Entry::from_device_list`] is a programmer error.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DataKind {
    Journal = 0,
    BtreeMeta = 1,
    UserData = 2,
    Cached = 3,
    SuperblockShadow = 4,
}

impl DataKind {
    /// Attempts to recover a `DataKind` from its on-disk discriminant.
    /// Used by the superblock adapter while validating an untrusted section.
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Journal),
            1 => Some(Self::BtreeMeta),
            2 => Some(Self::UserData),
            3 => Some(Self::Cached),
            4 => Some(Self::SuperblockShadow),
            _ => None,
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Journal => "journal",
            Self::BtreeMeta => "btree-meta",
            Self::UserData => "user-data",
            Self::Cached => "cached",
            Self::SuperblockShadow => "superblock-shadow",
        };
        f.write_str(name)
    }
}

/// A canonical replica entry: `(data_kind, ascending unique device list)`.
///
/// Two entries are equal iff they agree on `data_kind` and `devs` elementwise.
/// [`Entry::from_device_list`] and [`Entry::from_key`] are the only
/// constructors and both canonicalise the device list, so equality-by-value
/// and equality-by-packed-bytes always agree.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Entry {
    pub(crate) data_kind: DataKind,
    pub(crate) devs: HVec<u8, MAX_REPLICAS>,
}

impl Entry {
    /// Builds a canonical entry from a caller-supplied device list, sorting
    /// it in place with an insertion sort (`devs` is bounded by
    /// [`MAX_REPLICAS`], so this is cheaper than a general-purpose sort) and
    /// dropping duplicates.
    ///
    /// # Panics (debug only)
    ///
    /// Panics if `kind` is [`DataKind::SuperblockShadow`] or if `devs` has
    /// `MAX_REPLICAS` or more entries — both are programmer errors, not
    /// recoverable conditions.
    pub fn from_device_list(kind: DataKind, devs: &[u8]) -> Self {
        debug_assert!(
            kind != DataKind::SuperblockShadow,
            "superblock-shadow is never stored as a replica entry"
        );
        debug_assert!(
            devs.len() < MAX_REPLICAS,
            "device list exceeds MAX_REPLICAS"
        );

        let mut sorted: HVec<u8, MAX_REPLICAS> = HVec::new();
        for &d in devs {
            let _ = sorted.push(d);
        }
        insertion_sort(&mut sorted);
        dedup(&mut sorted);

        Self {
            data_kind: kind,
            devs: sorted,
        }
    }

    /// Builds an entry by walking `key`'s device pointers through the
    /// injected [`KeyWalker`], keeping only non-cached pointers. A key with
    /// no device pointers produces an entry with an empty device list; the
    /// mark path treats that as "nothing to mark" and skips it.
    pub fn from_key(kind: DataKind, key: &Key, walker: &dyn KeyWalker) -> Self {
        let mut devs: Vec<u8> = walker
            .walk_pointers(key)
            .into_iter()
            .filter(|p| !p.cached)
            .map(|p| p.dev)
            .collect();
        devs.truncate(MAX_REPLICAS - 1);
        Self::from_device_list(kind, &devs)
    }

    pub fn data_kind(&self) -> DataKind {
        self.data_kind
    }

    pub fn devs(&self) -> &[u8] {
        &self.devs
    }

    pub fn nr_devs(&self) -> usize {
        self.devs.len()
    }

    /// `true` for the sentinel "no devices" entry produced when a key has no
    /// pointers; callers should skip marking it.
    pub fn is_empty(&self) -> bool {
        self.devs.is_empty()
    }

    /// Packed size: one header byte for `data_kind`, one for `nr_devs`, and
    /// one byte per device. Identical whether the entry is bound for the
    /// in-memory stride buffer or the on-disk record stream.
    pub fn byte_size(&self) -> usize {
        2 + self.devs.len()
    }

    /// Writes the packed header+device bytes into `out[..byte_size()]` and
    /// zero-fills the remainder of `out` (used to pad an entry out to an
    /// index's current stride before a memory-compare).
    pub(crate) fn pack_into(&self, out: &mut [u8]) {
        debug_assert!(out.len() >= self.byte_size());
        out[0] = self.data_kind as u8;
        out[1] = self.devs.len() as u8;
        out[2..2 + self.devs.len()].copy_from_slice(&self.devs);
        for b in &mut out[self.byte_size()..] {
            *b = 0;
        }
    }

    /// Decodes an entry from a packed header+device slice (no trailing
    /// padding expected); returns the entry and the number of bytes
    /// consumed. Used by the superblock adapter walking the on-disk stream.
    pub(crate) fn unpack_from(buf: &[u8]) -> Result<(Self, usize), EntryDecodeError> {
        if buf.len() < 2 {
            return Err(EntryDecodeError::Truncated);
        }
        let kind = DataKind::from_u8(buf[0]).ok_or(EntryDecodeError::BadKind(buf[0]))?;
        let nr_devs = buf[1] as usize;
        if nr_devs >= MAX_REPLICAS {
            return Err(EntryDecodeError::TooManyDevices(nr_devs));
        }
        if buf.len() < 2 + nr_devs {
            return Err(EntryDecodeError::Truncated);
        }
        let mut devs: HVec<u8, MAX_REPLICAS> = HVec::new();
        for &d in &buf[2..2 + nr_devs] {
            let _ = devs.push(d);
        }
        Ok((
            Self {
                data_kind: kind,
                devs,
            },
            2 + nr_devs,
        ))
    }

    /// Debug render: `"<kind>: [d0 d1 ...]"`.
    pub fn render(&self) -> String {
        use core::fmt::Write;
        let mut out = String::new();
        let _ = write!(out, "{}: [", self.data_kind);
        for (i, d) in self.devs.iter().enumerate() {
            if i > 0 {
                let _ = out.push(' ');
            }
            let _ = write!(out, "{d}");
        }
        out.push(']');
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryDecodeError {
    Truncated,
    BadKind(u8),
    TooManyDevices(usize),
}

/// Ordering mirrors the literal on-disk/in-memory byte layout
/// `(data_kind, nr_devs, devs...)`, so it agrees exactly with the raw
/// memory-compare the hot lookup path performs.
impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.data_kind as u8)
            .cmp(&(other.data_kind as u8))
            .then((self.devs.len() as u8).cmp(&(other.devs.len() as u8)))
            .then_with(|| self.devs.as_slice().cmp(other.devs.as_slice()))
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Variable-length on-disk form: no trailing padding, in the same style as
/// `DirEntry`'s hand-rolled codec for another variable-length record.
impl DvSerialize for Entry {
    fn serialize(&self, _endianness: Endianness, target: &mut [u8]) -> Result<usize, DvSerErr> {
        let size = self.byte_size();
        if target.len() < size {
            return Err(DvSerErr::BufferTooSmall);
        }
        target[0] = self.data_kind as u8;
        target[1] = self.devs.len() as u8;
        target[2..size].copy_from_slice(&self.devs);
        Ok(size)
    }
}

impl DvDeserialize for Entry {
    fn deserialize(_endianness: Endianness, input: &[u8]) -> Result<(Self, usize), DvDeErr> {
        Self::unpack_from(input).map_err(|_| DvDeErr::WrongBufferSize)
    }
}

fn insertion_sort(devs: &mut [u8]) {
    for i in 1..devs.len() {
        let mut j = i;
        while j > 0 && devs[j - 1] > devs[j] {
            devs.swap(j - 1, j);
            j -= 1;
        }
    }
}

fn dedup(devs: &mut HVec<u8, MAX_REPLICAS>) {
    let mut write = 0;
    for read in 0..devs.len() {
        if read == 0 || devs[read] != devs[write - 1] {
            devs[write] = devs[read];
            write += 1;
        }
    }
    devs.truncate(write);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keywalker::DevPointer;

    #[test]
    fn canonicalises_unsorted_devices() {
        let a = Entry::from_device_list(DataKind::UserData, &[2, 0, 1]);
        let b = Entry::from_device_list(DataKind::UserData, &[0, 1, 2]);
        assert_eq!(a, b);
        assert_eq!(a.devs(), &[0, 1, 2]);
    }

    #[test]
    fn dedups_duplicate_devices() {
        let a = Entry::from_device_list(DataKind::Journal, &[3, 1, 3, 1, 2]);
        assert_eq!(a.devs(), &[1, 2, 3]);
    }

    #[test]
    fn empty_device_list_is_empty_entry() {
        let a = Entry::from_device_list(DataKind::UserData, &[]);
        assert!(a.is_empty());
    }

    #[test]
    fn ordering_matches_kind_then_len_then_devices() {
        let btree = Entry::from_device_list(DataKind::BtreeMeta, &[2]);
        let user = Entry::from_device_list(DataKind::UserData, &[2]);
        assert!(btree < user);
    }

    #[test]
    fn pack_and_unpack_round_trip() {
        let e = Entry::from_device_list(DataKind::Cached, &[5, 1, 9]);
        let mut buf = [0u8; 16];
        e.pack_into(&mut buf);
        let (back, consumed) = Entry::unpack_from(&buf[..e.byte_size()]).unwrap();
        assert_eq!(consumed, e.byte_size());
        assert_eq!(back, e);
    }

    struct FakeWalker {
        ptrs: Vec<DevPointer>,
    }

    impl KeyWalker for FakeWalker {
        fn walk_pointers(&self, _key: &Key) -> Vec<DevPointer> {
            self.ptrs.clone()
        }
    }

    #[test]
    fn from_key_skips_cached_pointers() {
        let walker = FakeWalker {
            ptrs: alloc::vec![
                DevPointer { dev: 3, cached: false },
                DevPointer { dev: 7, cached: true },
                DevPointer { dev: 1, cached: false },
            ],
        };
        let e = Entry::from_key(DataKind::UserData, &Key(0), &walker);
        assert_eq!(e.devs(), &[1, 3]);
    }
}
