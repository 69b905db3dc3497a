//! Superblock service interface and the adapter that converts between the
//! packed on-disk "replicas" section and an in-memory [`Index`].

use alloc::string::String;
use alloc::vec::Vec;

use thiserror::Error;

use crate::entry::{DataKind, Entry};
use crate::index::Index;
use crate::MAX_REPLICAS;

/// Errors the tracker can return to its caller. Programmer-error conditions
/// (out-of-range data kind, device count at or above [`MAX_REPLICAS`],
/// starting GC mid-pass, marking `superblock-shadow`) are debug assertions,
/// not members of this enum — they are not meant to be recovered from.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackerError {
    #[error("could not allocate a new index")]
    OutOfMemory,
    #[error("superblock replicas section cannot be grown to hold the new set")]
    NoSpace,
    #[error("superblock flush failed")]
    IoFail,
    #[error("invalid replicas section: {0}")]
    InvalidSection(String),
}

/// Which typed superblock section the adapter reads or writes. The tracker
/// only ever touches `Replicas`; the variant exists so the trait mirrors the
/// real superblock service, which multiplexes many sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Replicas,
}

/// External collaborator owning superblock I/O. The tracker never performs
/// I/O itself; it asks this trait to resize, persist, and flush.
pub trait SuperblockService {
    /// Current bytes of `kind`'s section, or `None` if absent (a fresh
    /// filesystem with no replicas recorded yet).
    fn get_section(&self, kind: SectionKind) -> Option<Vec<u8>>;

    /// Grows (or shrinks) `kind`'s section to `words` native units. Returns
    /// [`TrackerError::NoSpace`] if the section cannot be resized.
    fn resize_section(&self, kind: SectionKind, words: u64) -> Result<(), TrackerError>;

    /// Overwrites `kind`'s section with `bytes`, which must fit within the
    /// most recent `resize_section` call.
    fn write_section(&self, kind: SectionKind, bytes: &[u8]) -> Result<(), TrackerError>;

    /// Writes the superblock out and fsyncs it.
    fn flush(&self) -> Result<(), TrackerError>;

    /// Size, in bytes, of one native resize unit. The on-disk payload size
    /// is rounded up to a multiple of this before `resize_section` is
    /// called.
    fn native_unit_bytes(&self) -> u64 {
        8
    }
}

/// Decodes the on-disk "replicas" section into a live [`Index`]. Walks the
/// variable-length record stream once to find the widest entry (fixing the
/// in-memory stride), then again to copy each record in; finally sorts the
/// whole collection into Eytzinger order.
pub fn load(section_bytes: &[u8]) -> Result<Index, TrackerError> {
    let entries = decode_entries(section_bytes)
        .map_err(|e| TrackerError::InvalidSection(String::from(e)))?;
    let mut sorted = entries;
    sorted.sort();
    Index::from_sorted_entries(&sorted)
}

/// Serialises `index` into the on-disk record stream (entries packed
/// back-to-back with no padding, in ascending sorted order) and asks the
/// superblock to hold it, resizing first if necessary.
pub fn store(index: &Index, sb: &dyn SuperblockService) -> Result<(), TrackerError> {
    let sorted = index.iter_sorted_owned()?;
    let total: usize = sorted.iter().map(Entry::byte_size).sum();

    let unit = sb.native_unit_bytes().max(1);
    let words = (total as u64).div_ceil(unit);
    sb.resize_section(SectionKind::Replicas, words)?;

    let mut bytes = Vec::new();
    bytes
        .try_reserve_exact(total)
        .map_err(|_| TrackerError::OutOfMemory)?;
    for e in &sorted {
        let mut slot = alloc::vec![0u8; e.byte_size()];
        e.pack_into(&mut slot);
        bytes.extend_from_slice(&slot);
    }
    sb.write_section(SectionKind::Replicas, &bytes)
}

/// Validates an untrusted on-disk "replicas" section against the current
/// member table before it is trusted as `live`.
///
/// Checks, in order: every entry has `0 < nr_devs < MAX_REPLICAS`, every
/// `data_kind` is in range, every device index is a known member, and after
/// canonicalising and sorting the whole collection there are no adjacent
/// duplicate entries.
pub fn validate(section_bytes: &[u8], member_table: &[bool]) -> Result<(), String> {
    let entries = decode_entries(section_bytes)?;

    for e in &entries {
        if e.nr_devs() == 0 {
            return Err(String::from("invalid replicas entry: no devices"));
        }
        if e.nr_devs() >= MAX_REPLICAS {
            return Err(String::from("invalid replicas entry: too many devices"));
        }
        for &d in e.devs() {
            if !member_table.get(d as usize).copied().unwrap_or(false) {
                return Err(alloc::format!(
                    "invalid replicas entry: device {d} is not a filesystem member"
                ));
            }
        }
    }

    let mut sorted = entries;
    sorted.sort();
    for w in sorted.windows(2) {
        if w[0] == w[1] {
            return Err(alloc::format!(
                "invalid replicas section: duplicate entry {}",
                w[0].render()
            ));
        }
    }

    Ok(())
}

fn decode_entries(section_bytes: &[u8]) -> Result<Vec<Entry>, &'static str> {
    let mut out = Vec::new();
    let mut off = 0usize;
    while off < section_bytes.len() {
        let (entry, consumed) =
            Entry::unpack_from(&section_bytes[off..]).map_err(|_| "truncated replicas record")?;
        if entry.data_kind() == DataKind::SuperblockShadow {
            return Err("superblock-shadow kind is never stored as an entry");
        }
        out.push(entry);
        off += consumed;
    }
    Ok(out)
}
