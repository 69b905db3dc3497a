//! Replica-set tracker for a multi-device copy-on-write filesystem.
//!
//! For every distinct `(data_kind, device_set)` pair observed while walking
//! filesystem metadata and data, the tracker records a witness that "data of
//! this kind exists on exactly this set of devices." The table gates writes
//! (a combination must be marked before the bytes it describes are considered
//! durable) and is consulted by device-removal policy (`have_enough`).
//!
//! This crate owns no I/O and no device identity: it calls out to an injected
//! [`SuperblockService`](superblock::SuperblockService) to persist the table
//! and an injected [`KeyWalker`](keywalker::KeyWalker) to enumerate device
//! pointers inside filesystem keys.
#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

#[macro_use]
mod diag;

pub mod entry;
mod eytzinger;
pub mod flags;
pub mod gc;
pub mod index;
pub mod keywalker;
pub mod query;
pub mod superblock;
pub mod tracker;

#[cfg(any(test, feature = "std"))]
pub mod fakes;

pub use entry::{DataKind, Entry};
pub use flags::{KindMask, MarkFlags};
pub use gc::GcResult;
pub use index::Index;
pub use keywalker::{DevPointer, Key, KeyWalker};
pub use query::{KindStatus, Status};
pub use superblock::{SectionKind, SuperblockService, TrackerError};
pub use tracker::Tracker;

/// Maximum number of devices a single replica entry may span.
///
/// The source allows this to be tuned between 4 and 8; this crate fixes it
/// at the upper end of that range.
pub const MAX_REPLICAS: usize = 8;

/// Number of distinct [`DataKind`] discriminants, including the reserved
/// `superblock-shadow` kind that is never itself stored as an entry.
pub const KIND_COUNT: usize = 5;
