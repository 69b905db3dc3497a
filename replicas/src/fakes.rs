//! In-memory stand-ins for the two external collaborators, used by this
//! crate's own test suite and available to embedders writing their own
//! tracker tests.

use alloc::vec::Vec;
use core::cell::RefCell;

use crate::keywalker::{DevPointer, Key, KeyWalker};
use crate::superblock::{SectionKind, SuperblockService, TrackerError};

/// A superblock backed by a `Vec<u8>` instead of a real section. `resize`
/// rounds up to `native_unit_bytes` like the real service, and
/// [`set_out_of_space`](Self::set_out_of_space) lets a test force `resize`
/// to fail.
#[derive(Default)]
pub struct FakeSuperblock {
    section: RefCell<Option<Vec<u8>>>,
    resized_words: RefCell<Option<u64>>,
    write_count: RefCell<u32>,
    flush_count: RefCell<u32>,
    out_of_space: RefCell<bool>,
}

impl FakeSuperblock {
    pub fn set_out_of_space(&self, out_of_space: bool) {
        *self.out_of_space.borrow_mut() = out_of_space;
    }

    pub fn write_count(&self) -> u32 {
        *self.write_count.borrow()
    }

    pub fn flush_count(&self) -> u32 {
        *self.flush_count.borrow()
    }

    pub fn current_section(&self) -> Option<Vec<u8>> {
        self.section.borrow().clone()
    }
}

impl SuperblockService for FakeSuperblock {
    fn get_section(&self, _kind: SectionKind) -> Option<Vec<u8>> {
        self.section.borrow().clone()
    }

    fn resize_section(&self, _kind: SectionKind, words: u64) -> Result<(), TrackerError> {
        if *self.out_of_space.borrow() {
            return Err(TrackerError::NoSpace);
        }
        *self.resized_words.borrow_mut() = Some(words);
        Ok(())
    }

    fn write_section(&self, _kind: SectionKind, bytes: &[u8]) -> Result<(), TrackerError> {
        *self.section.borrow_mut() = Some(bytes.to_vec());
        *self.write_count.borrow_mut() += 1;
        Ok(())
    }

    fn flush(&self) -> Result<(), TrackerError> {
        *self.flush_count.borrow_mut() += 1;
        Ok(())
    }
}

/// A key walker whose answer is fixed at construction: every key it is
/// asked about returns the same pointer list.
pub struct FakeKeyWalker {
    pointers: Vec<DevPointer>,
}

impl FakeKeyWalker {
    pub fn new(pointers: Vec<DevPointer>) -> Self {
        Self { pointers }
    }
}

impl KeyWalker for FakeKeyWalker {
    fn walk_pointers(&self, _key: &Key) -> Vec<DevPointer> {
        self.pointers.clone()
    }
}
