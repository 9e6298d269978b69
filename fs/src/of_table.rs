//! System-wide open file table.
//!
//! One entry per open file *instance*: two opens of the same path get two
//! entries with independent offsets, while dup2 and descriptor-table
//! cloning alias a single entry and bump its refcount. The vnode is
//! released exactly when the refcount drops from one to zero.
//!
//! Locking: each entry carries its own mutex, held for the full duration
//! of any operation on that entry so offset updates are atomic with the
//! device transfer. The free-slot queue has a separate lock, acquired
//! after an entry lock when both are needed.

use siltos_abi::fs::{OPEN_FILE_MAX, OpenFlags};
use siltos_lib::{SpinMutex, SpinMutexGuard};

use crate::error::{FileError, FileResult};
use crate::slot::{SlotError, SlotQueue};
use crate::vfs::Vnode;

pub struct OpenFile {
    pub(crate) vnode: Option<Vnode>,
    pub(crate) offset: u64,
    pub(crate) flags: OpenFlags,
    pub(crate) refcount: u32,
}

impl OpenFile {
    const fn empty() -> Self {
        Self {
            vnode: None,
            offset: 0,
            flags: OpenFlags::empty(),
            refcount: 0,
        }
    }

    pub(crate) fn is_occupied(&self) -> bool {
        self.vnode.is_some()
    }
}

pub struct OpenFileTable {
    entries: [SpinMutex<OpenFile>; OPEN_FILE_MAX],
    free: SpinMutex<SlotQueue<OPEN_FILE_MAX>>,
}

impl OpenFileTable {
    pub const fn new() -> Self {
        Self {
            entries: [const { SpinMutex::new(OpenFile::empty()) }; OPEN_FILE_MAX],
            free: SpinMutex::new(SlotQueue::full()),
        }
    }

    /// Reserve a free entry index. The entry stays unoccupied until
    /// `occupy` runs; a failed open hands the index back with `cancel`.
    pub fn allocate(&self) -> FileResult<usize> {
        self.free
            .lock()
            .allocate()
            .map_err(|_| FileError::FileTableFull)
    }

    /// Roll back a reservation made by `allocate`.
    pub fn cancel(&self, index: usize) {
        if self.free.lock().release(index) == Err(SlotError::Overflow) {
            panic!("of_table: cancel of unallocated slot {index}");
        }
    }

    /// Populate a reserved entry. Refcount starts at one.
    pub fn occupy(&self, index: usize, vnode: Vnode, flags: OpenFlags, offset: u64) {
        let mut entry = self.entries[index].lock();
        debug_assert!(!entry.is_occupied());
        entry.vnode = Some(vnode);
        entry.offset = offset;
        entry.flags = flags;
        entry.refcount = 1;
    }

    /// Add a reference to an occupied entry (dup2, table cloning).
    pub fn retain(&self, index: usize) -> FileResult<()> {
        let mut entry = self.lock_entry(index)?;
        entry.refcount += 1;
        Ok(())
    }

    /// Drop a reference. When the last reference goes away the entry is
    /// cleared, its index returns to the free queue, and the vnode's close
    /// hook runs (outside the entry lock).
    pub fn release(&self, index: usize) -> FileResult<()> {
        let closed = {
            let mut entry = self.lock_entry(index)?;
            debug_assert!(entry.refcount > 0);
            entry.refcount -= 1;
            if entry.refcount > 0 {
                None
            } else {
                let vnode = entry.vnode.take();
                entry.offset = 0;
                entry.flags = OpenFlags::empty();
                if self.free.lock().release(index) == Err(SlotError::Overflow) {
                    panic!("of_table: slot {index} double free");
                }
                vnode
            }
        };

        if let Some(vnode) = closed {
            vnode.release();
        }
        Ok(())
    }

    /// Run `f` against an occupied entry, holding its lock throughout.
    pub fn with_entry<R>(
        &self,
        index: usize,
        f: impl FnOnce(&mut OpenFile) -> FileResult<R>,
    ) -> FileResult<R> {
        let mut entry = self.lock_entry(index)?;
        f(&mut entry)
    }

    /// Lock an entry directly. Callers that need two entries at once must
    /// acquire them in ascending index order.
    pub(crate) fn lock_entry(&self, index: usize) -> FileResult<SpinMutexGuard<'_, OpenFile>> {
        if index >= OPEN_FILE_MAX {
            return Err(FileError::BadHandle);
        }
        let entry = self.entries[index].lock();
        if !entry.is_occupied() {
            return Err(FileError::BadHandle);
        }
        Ok(entry)
    }

    /// Return a cleared entry's index to the free queue. Only for callers
    /// that emptied the entry themselves while holding its lock.
    pub(crate) fn slot_release(&self, index: usize) {
        if self.free.lock().release(index) == Err(SlotError::Overflow) {
            panic!("of_table: slot {index} double free");
        }
    }

    pub fn free_count(&self) -> usize {
        self.free.lock().free_count()
    }
}

impl Default for OpenFileTable {
    fn default() -> Self {
        Self::new()
    }
}
