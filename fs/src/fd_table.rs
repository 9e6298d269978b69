//! Per-process file descriptor table.
//!
//! A descriptor is nothing more than an index into this table; each
//! occupied entry points at an open file table slot. The table lock is
//! held only for the brief bookkeeping of binding and looking up; device
//! transfers happen under the open file entry's own lock instead.

use siltos_abi::fs::FD_TABLE_SIZE;
use siltos_lib::SpinMutex;

use crate::error::{FileError, FileResult};
use crate::slot::SlotQueue;

#[derive(Clone, Copy)]
pub(crate) struct FdEntry {
    pub(crate) occupied: bool,
    pub(crate) of_index: usize,
}

impl FdEntry {
    const fn empty() -> Self {
        Self {
            occupied: false,
            of_index: 0,
        }
    }
}

pub(crate) struct FdTableInner {
    entries: [FdEntry; FD_TABLE_SIZE],
    free: SlotQueue<FD_TABLE_SIZE>,
}

impl FdTableInner {
    const fn new() -> Self {
        Self {
            entries: [FdEntry::empty(); FD_TABLE_SIZE],
            free: SlotQueue::full(),
        }
    }

    /// Reserve a descriptor number without binding it yet.
    pub(crate) fn allocate(&mut self) -> FileResult<usize> {
        self.free.allocate().map_err(|_| FileError::FdTableFull)
    }

    /// Roll back a reservation made by `allocate`.
    pub(crate) fn cancel(&mut self, fd: usize) {
        if self.free.release(fd).is_err() {
            panic!("fd_table: cancel of unallocated descriptor {fd}");
        }
    }

    /// Point a reserved descriptor at an open file table slot.
    pub(crate) fn bind(&mut self, fd: usize, of_index: usize) {
        debug_assert!(fd < FD_TABLE_SIZE);
        debug_assert!(!self.entries[fd].occupied);
        self.entries[fd] = FdEntry {
            occupied: true,
            of_index,
        };
    }

    /// Clear a descriptor and hand it back to the free queue.
    ///
    /// Returns the open file index it pointed at; the caller still owns
    /// the reference into the open file table.
    pub(crate) fn unbind(&mut self, fd: usize) -> FileResult<usize> {
        if fd >= FD_TABLE_SIZE || !self.entries[fd].occupied {
            return Err(FileError::BadHandle);
        }
        let of_index = self.entries[fd].of_index;
        self.entries[fd] = FdEntry::empty();
        if self.free.release(fd).is_err() {
            panic!("fd_table: descriptor {fd} double free");
        }
        Ok(of_index)
    }

    pub(crate) fn lookup(&self, fd: usize) -> FileResult<usize> {
        if fd >= FD_TABLE_SIZE || !self.entries[fd].occupied {
            return Err(FileError::BadHandle);
        }
        Ok(self.entries[fd].of_index)
    }

    pub(crate) fn is_occupied(&self, fd: usize) -> bool {
        fd < FD_TABLE_SIZE && self.entries[fd].occupied
    }

    /// Pull a specific descriptor out of the free queue so dup2 can bind
    /// a number the process never opened.
    pub(crate) fn claim(&mut self, fd: usize) -> bool {
        self.free.claim(fd)
    }

    /// Rebind an occupied descriptor to a different open file slot.
    pub(crate) fn rebind(&mut self, fd: usize, of_index: usize) {
        debug_assert!(self.entries[fd].occupied);
        self.entries[fd].of_index = of_index;
    }

    pub(crate) fn occupied_fds(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.occupied)
            .map(|(fd, e)| (fd, e.of_index))
    }
}

pub struct FdTable {
    inner: SpinMutex<FdTableInner>,
}

impl FdTable {
    pub const fn new() -> Self {
        Self {
            inner: SpinMutex::new(FdTableInner::new()),
        }
    }

    pub(crate) fn with<R>(&self, f: impl FnOnce(&mut FdTableInner) -> R) -> R {
        let mut inner = self.inner.lock();
        f(&mut inner)
    }

    pub fn lookup(&self, fd: usize) -> FileResult<usize> {
        self.with(|inner| inner.lookup(fd))
    }
}

impl Default for FdTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_bind_lookup_unbind() {
        let table = FdTable::new();

        let fd = table.with(|t| {
            let fd = t.allocate().unwrap();
            t.bind(fd, 42);
            fd
        });
        assert_eq!(table.lookup(fd), Ok(42));

        let of_index = table.with(|t| t.unbind(fd)).unwrap();
        assert_eq!(of_index, 42);
        assert_eq!(table.lookup(fd), Err(FileError::BadHandle));
    }

    #[test]
    fn test_exhaustion() {
        let table = FdTable::new();
        table.with(|t| {
            for _ in 0..FD_TABLE_SIZE {
                let fd = t.allocate().unwrap();
                t.bind(fd, 0);
            }
            assert_eq!(t.allocate(), Err(FileError::FdTableFull));
        });
    }

    #[test]
    fn test_unbind_frees_for_reuse() {
        let table = FdTable::new();
        table.with(|t| {
            for _ in 0..FD_TABLE_SIZE {
                let fd = t.allocate().unwrap();
                t.bind(fd, 0);
            }
            t.unbind(5).unwrap();
            let fd = t.allocate().unwrap();
            assert_eq!(fd, 5);
        });
    }

    #[test]
    fn test_claim_unopened_descriptor() {
        let table = FdTable::new();
        table.with(|t| {
            assert!(t.claim(9));
            assert!(!t.claim(9));
            t.bind(9, 3);
            assert_eq!(t.lookup(9), Ok(3));
        });
    }

    #[test]
    fn test_double_unbind_is_bad_handle() {
        let table = FdTable::new();
        table.with(|t| {
            let fd = t.allocate().unwrap();
            t.bind(fd, 1);
            t.unbind(fd).unwrap();
            assert_eq!(t.unbind(fd), Err(FileError::BadHandle));
        });
    }
}
