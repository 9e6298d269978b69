//! File descriptor layer: per-process descriptor tables over a shared
//! open file table.
//!
//! A descriptor is an index into the owning process's `FdTable`; the
//! entry there points at an `OpenFileTable` slot holding the vnode,
//! offset, access flags, and refcount. Independent opens of the same
//! path get separate open file entries (separate offsets); dup2 and
//! table cloning alias one entry and share the offset.
//!
//! Lock order, for any operation that takes more than one lock:
//! descriptor table lock, then open file entry locks in ascending index
//! order, then the open file allocator lock. Vnode close hooks run with
//! no locks held.

use core::ffi::{c_char, c_int};
use core::slice;

use siltos_abi::error as errno;
use siltos_abi::fs::{FD_TABLE_SIZE, OpenFlags};
use siltos_abi::syscall::{SEEK_CUR, SEEK_END, SEEK_SET};
use siltos_abi::task::{INVALID_PROCESS_ID, MAX_PROCESSES, ProcessId};
use siltos_lib::{SpinMutex, klog_debug};

use crate::MAX_PATH_LEN;
use crate::devfs::{DevFs, console_vnode};
use crate::error::{FileError, FileResult};
use crate::fd_table::FdTable;
use crate::of_table::OpenFileTable;
use crate::vfs::{Vnode, vfs_open};

/// Writes stage through a kernel buffer of this size before touching the
/// device, so a caller cannot mutate the data mid-transfer.
const WRITE_CHUNK: usize = 512;

/// Backing device for descriptors 0-2. Stateless, so a dedicated instance
/// is equivalent to the mounted one and needs no mount table lookup.
static CONSOLE_DEV: DevFs = DevFs::new();

#[derive(Clone, Copy)]
struct ProcEntry {
    process_id: ProcessId,
    in_use: bool,
}

impl ProcEntry {
    const fn empty() -> Self {
        Self {
            process_id: INVALID_PROCESS_ID,
            in_use: false,
        }
    }
}

pub struct FileIo {
    of_table: OpenFileTable,
    registry: SpinMutex<[ProcEntry; MAX_PROCESSES]>,
    fd_tables: [FdTable; MAX_PROCESSES],
    /// Table for kernel-initiated I/O, addressed as `INVALID_PROCESS_ID`.
    /// Always present, never console-bootstrapped.
    kernel_fds: FdTable,
}

impl FileIo {
    pub const fn new() -> Self {
        Self {
            of_table: OpenFileTable::new(),
            registry: SpinMutex::new([ProcEntry::empty(); MAX_PROCESSES]),
            fd_tables: [const { FdTable::new() }; MAX_PROCESSES],
            kernel_fds: FdTable::new(),
        }
    }

    fn registry_index(&self, pid: ProcessId) -> FileResult<usize> {
        if pid == INVALID_PROCESS_ID {
            return Err(FileError::NoSuchProcess);
        }
        self.registry
            .lock()
            .iter()
            .position(|e| e.in_use && e.process_id == pid)
            .ok_or(FileError::NoSuchProcess)
    }

    fn register(&self, pid: ProcessId) -> FileResult<usize> {
        if pid == INVALID_PROCESS_ID {
            return Err(FileError::InvalidArgument);
        }
        let mut registry = self.registry.lock();
        if registry.iter().any(|e| e.in_use && e.process_id == pid) {
            return Err(FileError::InvalidArgument);
        }
        let idx = registry
            .iter()
            .position(|e| !e.in_use)
            .ok_or(FileError::ProcessLimit)?;
        registry[idx] = ProcEntry {
            process_id: pid,
            in_use: true,
        };
        Ok(idx)
    }

    fn unregister(&self, idx: usize) {
        self.registry.lock()[idx] = ProcEntry::empty();
    }

    fn table_for_pid(&self, pid: ProcessId) -> FileResult<&FdTable> {
        if pid == INVALID_PROCESS_ID {
            return Ok(&self.kernel_fds);
        }
        Ok(&self.fd_tables[self.registry_index(pid)?])
    }

    /// Register a descriptor table for `pid` with descriptors 0 (stdin,
    /// read-only), 1 and 2 (stdout/stderr, write-only) wired to the
    /// console device, each through its own open file entry.
    ///
    /// A no-op when the table already exists.
    pub fn create_table_for_process(&self, pid: ProcessId) -> FileResult<()> {
        if pid == INVALID_PROCESS_ID {
            return Ok(());
        }
        if self.registry_index(pid).is_ok() {
            return Ok(());
        }
        let idx = self.register(pid)?;
        if let Err(e) = self.bootstrap_console_fds(&self.fd_tables[idx]) {
            self.unregister(idx);
            return Err(e);
        }
        klog_debug!("fileio: created descriptor table for pid {}", pid);
        Ok(())
    }

    fn bootstrap_console_fds(&self, table: &FdTable) -> FileResult<()> {
        const SETUP: [(usize, OpenFlags); 3] = [
            (0, OpenFlags::READ),
            (1, OpenFlags::WRITE),
            (2, OpenFlags::WRITE),
        ];

        let mut done = [(0usize, 0usize); 3];
        let mut count = 0;
        for (fd, flags) in SETUP {
            let of_index = match self.of_table.allocate() {
                Ok(index) => index,
                Err(e) => {
                    self.rollback_console_fds(table, &done[..count]);
                    return Err(e);
                }
            };
            self.of_table
                .occupy(of_index, console_vnode(&CONSOLE_DEV), flags, 0);
            table.with(|t| {
                if !t.claim(fd) {
                    panic!("fileio: console descriptor {fd} already bound");
                }
                t.bind(fd, of_index);
            });
            done[count] = (fd, of_index);
            count += 1;
        }
        Ok(())
    }

    fn rollback_console_fds(&self, table: &FdTable, done: &[(usize, usize)]) {
        for &(fd, of_index) in done {
            let _ = table.with(|t| t.unbind(fd));
            let _ = self.of_table.release(of_index);
        }
    }

    /// Close every descriptor the process still holds and drop its table.
    pub fn destroy_table_for_process(&self, pid: ProcessId) -> FileResult<()> {
        let idx = self.registry_index(pid)?;
        let table = &self.fd_tables[idx];

        let (of_indices, count) = table.with(|t| {
            let mut fds = [0usize; FD_TABLE_SIZE];
            let mut of_indices = [0usize; FD_TABLE_SIZE];
            let mut count = 0;
            for (fd, of_index) in t.occupied_fds() {
                fds[count] = fd;
                of_indices[count] = of_index;
                count += 1;
            }
            for &fd in &fds[..count] {
                let _ = t.unbind(fd);
            }
            (of_indices, count)
        });

        for &of_index in &of_indices[..count] {
            self.of_table.release(of_index)?;
        }

        self.unregister(idx);
        klog_debug!("fileio: destroyed descriptor table for pid {}", pid);
        Ok(())
    }

    /// Give `dst` a descriptor table aliasing every open file `src` holds,
    /// at the same descriptor numbers. Offsets are shared, fork-style.
    pub fn clone_table_for_process(&self, src: ProcessId, dst: ProcessId) -> FileResult<()> {
        let src_idx = self.registry_index(src)?;
        let dst_idx = self.register(dst)?;

        let (fds, of_indices, count) =
            self.fd_tables[src_idx].with(|t| -> FileResult<([usize; FD_TABLE_SIZE], [usize; FD_TABLE_SIZE], usize)> {
                let mut fds = [0usize; FD_TABLE_SIZE];
                let mut of_indices = [0usize; FD_TABLE_SIZE];
                let mut count = 0;
                for (fd, of_index) in t.occupied_fds() {
                    fds[count] = fd;
                    of_indices[count] = of_index;
                    count += 1;
                }
                // The source binding pins every entry, so retain cannot
                // observe an unoccupied slot while we hold the src lock.
                for &of_index in &of_indices[..count] {
                    self.of_table.retain(of_index)?;
                }
                Ok((fds, of_indices, count))
            })?;

        self.fd_tables[dst_idx].with(|t| {
            for i in 0..count {
                if t.claim(fds[i]) {
                    t.bind(fds[i], of_indices[i]);
                }
            }
        });

        klog_debug!("fileio: cloned descriptor table pid {} -> pid {}", src, dst);
        Ok(())
    }

    /// Open `path` and bind a fresh descriptor to a fresh open file entry.
    ///
    /// Resources are acquired in the order open-file slot, descriptor,
    /// vnode; any failure rolls back what was already taken, so a failed
    /// open leaves both tables exactly as they were.
    pub fn open(&self, pid: ProcessId, path: &[u8], flags: OpenFlags, mode: u16) -> FileResult<usize> {
        if !flags.readable() && !flags.writable() {
            return Err(FileError::InvalidArgument);
        }
        if flags.contains(OpenFlags::APPEND) && !flags.writable() {
            return Err(FileError::InvalidArgument);
        }
        if path.is_empty() {
            return Err(FileError::InvalidArgument);
        }
        let table = self.table_for_pid(pid)?;

        let of_index = self.of_table.allocate()?;
        let fd = match table.with(|t| t.allocate()) {
            Ok(fd) => fd,
            Err(e) => {
                self.of_table.cancel(of_index);
                return Err(e);
            }
        };

        let vnode = match vfs_open(path, flags, mode) {
            Ok(vnode) => vnode,
            Err(e) => {
                table.with(|t| t.cancel(fd));
                self.of_table.cancel(of_index);
                return Err(e.into());
            }
        };

        let offset = if flags.contains(OpenFlags::APPEND) {
            match vnode.size() {
                Ok(size) => size,
                Err(e) => {
                    table.with(|t| t.cancel(fd));
                    self.of_table.cancel(of_index);
                    vnode.release();
                    return Err(e.into());
                }
            }
        } else {
            0
        };

        self.of_table.occupy(of_index, vnode, flags, offset);
        table.with(|t| t.bind(fd, of_index));

        klog_debug!("fileio: pid {} open fd {} -> of {}", pid, fd, of_index);
        Ok(fd)
    }

    /// Read into `buf` at the descriptor's current offset and advance it
    /// by the number of bytes the device actually produced.
    pub fn read(&self, pid: ProcessId, fd: usize, buf: &mut [u8]) -> FileResult<usize> {
        let of_index = self.table_for_pid(pid)?.lookup(fd)?;
        self.of_table.with_entry(of_index, |entry| {
            if !entry.flags.readable() {
                return Err(FileError::PermissionDenied);
            }
            let vnode = entry.vnode.ok_or(FileError::BadHandle)?;
            let n = vnode.read(entry.offset, buf)?;
            // lseek can legally park the offset near u64::MAX; a transfer
            // from there pins it at the limit instead of wrapping.
            entry.offset = entry.offset.saturating_add(n as u64);
            Ok(n)
        })
    }

    /// Write `buf` at the descriptor's current offset.
    ///
    /// The data moves through a fixed kernel buffer chunk by chunk. A
    /// device error after some chunks already landed reports the partial
    /// count instead of the error; a short device write also stops early.
    pub fn write(&self, pid: ProcessId, fd: usize, buf: &[u8]) -> FileResult<usize> {
        let of_index = self.table_for_pid(pid)?.lookup(fd)?;
        self.of_table.with_entry(of_index, |entry| {
            if !entry.flags.writable() {
                return Err(FileError::PermissionDenied);
            }
            let vnode = entry.vnode.ok_or(FileError::BadHandle)?;
            if entry.flags.contains(OpenFlags::APPEND) {
                entry.offset = vnode.size()?;
            }

            let mut kbuf = [0u8; WRITE_CHUNK];
            let mut total = 0;
            while total < buf.len() {
                let n = (buf.len() - total).min(WRITE_CHUNK);
                kbuf[..n].copy_from_slice(&buf[total..total + n]);
                let written = match vnode.write(entry.offset, &kbuf[..n]) {
                    Ok(written) => written,
                    Err(e) => {
                        if total > 0 {
                            break;
                        }
                        return Err(e.into());
                    }
                };
                entry.offset = entry.offset.saturating_add(written as u64);
                total += written;
                if written < n {
                    break;
                }
            }
            Ok(total)
        })
    }

    /// Reposition the descriptor's offset. The offset is not validated
    /// against the file size; reads past EOF simply return zero bytes.
    ///
    /// Fails with `NotSeekable` on devices without meaningful offsets and
    /// with `InvalidArgument` when the result would be negative or
    /// overflow, leaving the offset untouched in every failure case.
    pub fn lseek(&self, pid: ProcessId, fd: usize, offset: i64, whence: u64) -> FileResult<u64> {
        let of_index = self.table_for_pid(pid)?.lookup(fd)?;
        self.of_table.with_entry(of_index, |entry| {
            let vnode = entry.vnode.ok_or(FileError::BadHandle)?;
            if !vnode.is_seekable() {
                return Err(FileError::NotSeekable);
            }
            let base = match whence {
                SEEK_SET => 0,
                SEEK_CUR => entry.offset,
                SEEK_END => vnode.size()?,
                _ => return Err(FileError::InvalidArgument),
            };
            let new_offset = base
                .checked_add_signed(offset)
                .ok_or(FileError::InvalidArgument)?;
            entry.offset = new_offset;
            Ok(new_offset)
        })
    }

    /// Drop the descriptor and its reference into the open file table.
    pub fn close(&self, pid: ProcessId, fd: usize) -> FileResult<()> {
        let table = self.table_for_pid(pid)?;
        let of_index = table.with(|t| t.unbind(fd))?;
        self.of_table.release(of_index)?;
        klog_debug!("fileio: pid {} closed fd {}", pid, fd);
        Ok(())
    }

    /// Make descriptor `new` refer to the same open file as `old`.
    ///
    /// `dup2(fd, fd)` validates `fd` and does nothing else. An open file
    /// previously reachable through `new` loses one reference; when that
    /// was the last one its vnode is closed, but the descriptor number
    /// itself stays allocated since `new` is immediately rebound.
    pub fn dup2(&self, pid: ProcessId, old: usize, new: usize) -> FileResult<usize> {
        let table = self.table_for_pid(pid)?;
        if new >= FD_TABLE_SIZE {
            return Err(FileError::BadHandle);
        }
        if old == new {
            table.lookup(old)?;
            return Ok(new);
        }

        let closed = table.with(|t| -> FileResult<Option<Vnode>> {
            let old_of = t.lookup(old)?;

            if t.is_occupied(new) {
                let new_of = t.lookup(new)?;
                if new_of == old_of {
                    return Ok(None);
                }

                let (mut old_guard, mut new_guard) = if old_of < new_of {
                    let old_guard = self.of_table.lock_entry(old_of)?;
                    (old_guard, self.of_table.lock_entry(new_of)?)
                } else {
                    let new_guard = self.of_table.lock_entry(new_of)?;
                    (self.of_table.lock_entry(old_of)?, new_guard)
                };

                old_guard.refcount += 1;
                new_guard.refcount -= 1;
                let closed = if new_guard.refcount == 0 {
                    let vnode = new_guard.vnode.take();
                    new_guard.offset = 0;
                    new_guard.flags = OpenFlags::empty();
                    self.of_table.slot_release(new_of);
                    vnode
                } else {
                    None
                };

                t.rebind(new, old_of);
                Ok(closed)
            } else {
                // Target was never opened: pull it out of the free queue
                // before binding so the allocator never hands it out again
                // while it is live.
                if !t.claim(new) {
                    return Err(FileError::BadHandle);
                }
                if let Err(e) = self.of_table.retain(old_of) {
                    t.cancel(new);
                    return Err(e);
                }
                t.bind(new, old_of);
                Ok(None)
            }
        })?;

        if let Some(vnode) = closed {
            vnode.release();
        }
        klog_debug!("fileio: pid {} dup2 {} -> {}", pid, old, new);
        Ok(new)
    }
}

impl Default for FileIo {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Syscall entry points
// ---------------------------------------------------------------------------

static FILEIO: FileIo = FileIo::new();

/// The system-wide file descriptor layer instance.
pub fn file_io() -> &'static FileIo {
    &FILEIO
}

unsafe fn cstr_len(ptr_in: *const c_char) -> usize {
    if ptr_in.is_null() {
        return 0;
    }
    let mut len = 0usize;
    unsafe {
        while *ptr_in.add(len) != 0 {
            len += 1;
        }
    }
    len
}

unsafe fn path_bytes<'a>(path: *const c_char) -> Option<&'a [u8]> {
    if path.is_null() {
        return None;
    }
    unsafe {
        let len = cstr_len(path);
        Some(slice::from_raw_parts(
            path as *const u8,
            len.min(MAX_PATH_LEN),
        ))
    }
}

pub fn sys_open(pid: u32, path: *const c_char, flags: u32, mode: u32) -> i64 {
    let Some(path) = (unsafe { path_bytes(path) }) else {
        return -(errno::EFAULT as i64);
    };
    let Some(flags) = OpenFlags::from_bits(flags) else {
        return -(errno::EINVAL as i64);
    };
    match FILEIO.open(pid, path, flags, mode as u16) {
        Ok(fd) => fd as i64,
        Err(e) => -(e.errno() as i64),
    }
}

pub fn sys_read(pid: u32, fd: c_int, buffer: *mut u8, count: usize) -> i64 {
    if fd < 0 {
        return -(errno::EBADF as i64);
    }
    if buffer.is_null() {
        return -(errno::EFAULT as i64);
    }
    let buf = unsafe { slice::from_raw_parts_mut(buffer, count) };
    match FILEIO.read(pid, fd as usize, buf) {
        Ok(n) => n as i64,
        Err(e) => -(e.errno() as i64),
    }
}

pub fn sys_write(pid: u32, fd: c_int, buffer: *const u8, count: usize) -> i64 {
    if fd < 0 {
        return -(errno::EBADF as i64);
    }
    if buffer.is_null() {
        return -(errno::EFAULT as i64);
    }
    let buf = unsafe { slice::from_raw_parts(buffer, count) };
    match FILEIO.write(pid, fd as usize, buf) {
        Ok(n) => n as i64,
        Err(e) => -(e.errno() as i64),
    }
}

pub fn sys_lseek(pid: u32, fd: c_int, offset: i64, whence: u64) -> i64 {
    if fd < 0 {
        return -(errno::EBADF as i64);
    }
    match FILEIO.lseek(pid, fd as usize, offset, whence) {
        Ok(pos) => pos as i64,
        Err(e) => -(e.errno() as i64),
    }
}

pub fn sys_close(pid: u32, fd: c_int) -> i64 {
    if fd < 0 {
        return -(errno::EBADF as i64);
    }
    match FILEIO.close(pid, fd as usize) {
        Ok(()) => 0,
        Err(e) => -(e.errno() as i64),
    }
}

pub fn sys_dup2(pid: u32, old_fd: c_int, new_fd: c_int) -> i64 {
    if old_fd < 0 || new_fd < 0 {
        return -(errno::EBADF as i64);
    }
    match FILEIO.dup2(pid, old_fd as usize, new_fd as usize) {
        Ok(fd) => fd as i64,
        Err(e) => -(e.errno() as i64),
    }
}

pub fn fileio_create_table_for_process(process_id: u32) -> c_int {
    match FILEIO.create_table_for_process(process_id) {
        Ok(()) => 0,
        Err(e) => -e.errno(),
    }
}

pub fn fileio_destroy_table_for_process(process_id: u32) -> c_int {
    match FILEIO.destroy_table_for_process(process_id) {
        Ok(()) => 0,
        Err(e) => -e.errno(),
    }
}

pub fn fileio_clone_table_for_process(src_process_id: u32, dst_process_id: u32) -> c_int {
    match FILEIO.clone_table_for_process(src_process_id, dst_process_id) {
        Ok(()) => 0,
        Err(e) => -e.errno(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::vfs_init_builtin_filesystems;
    use siltos_abi::fs::OPEN_FILE_MAX;
    use std::vec::Vec;

    const RW: OpenFlags = OpenFlags::READ.union(OpenFlags::WRITE);
    const KERNEL: ProcessId = INVALID_PROCESS_ID;

    fn xorshift(state: &mut u64) -> u64 {
        let mut x = *state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        *state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    #[test]
    fn test_open_write_read_roundtrip() {
        vfs_init_builtin_filesystems();
        let io = FileIo::new();

        let flags = OpenFlags::CREAT.union(OpenFlags::WRITE);
        let fd = io.open(KERNEL, b"/roundtrip.txt", flags, 0o644).unwrap();
        assert_eq!(io.write(KERNEL, fd, b"hello world"), Ok(11));
        io.close(KERNEL, fd).unwrap();

        let fd = io.open(KERNEL, b"/roundtrip.txt", OpenFlags::READ, 0).unwrap();
        let mut buf = [0u8; 64];
        assert_eq!(io.read(KERNEL, fd, &mut buf), Ok(11));
        assert_eq!(&buf[..11], b"hello world");
        assert_eq!(io.read(KERNEL, fd, &mut buf), Ok(0));
        io.close(KERNEL, fd).unwrap();

        assert_eq!(io.of_table.free_count(), OPEN_FILE_MAX);
    }

    #[test]
    fn test_open_rejects_bad_arguments() {
        vfs_init_builtin_filesystems();
        let io = FileIo::new();

        assert_eq!(
            io.open(KERNEL, b"/dev/null", OpenFlags::empty(), 0),
            Err(FileError::InvalidArgument)
        );
        assert_eq!(
            io.open(KERNEL, b"", OpenFlags::READ, 0),
            Err(FileError::InvalidArgument)
        );
        assert_eq!(
            io.open(KERNEL, b"/dev/null", OpenFlags::READ.union(OpenFlags::APPEND), 0),
            Err(FileError::InvalidArgument)
        );
        assert!(matches!(
            io.open(KERNEL, b"/no/such/file", OpenFlags::READ, 0),
            Err(FileError::Vfs(crate::vfs::VfsError::NotFound))
        ));
        // Failed opens must not leak table slots.
        assert_eq!(io.of_table.free_count(), OPEN_FILE_MAX);
    }

    #[test]
    fn test_descriptor_exhaustion_and_reuse() {
        vfs_init_builtin_filesystems();
        let io = FileIo::new();
        io.create_table_for_process(1).unwrap();

        let mut fds = Vec::new();
        // Descriptors 0-2 went to the console, leaving the rest.
        for _ in 0..FD_TABLE_SIZE - 3 {
            fds.push(io.open(1, b"/dev/null", RW, 0).unwrap());
        }
        let of_free = io.of_table.free_count();
        assert_eq!(io.open(1, b"/dev/null", RW, 0), Err(FileError::FdTableFull));
        // The reserved open file slot was rolled back.
        assert_eq!(io.of_table.free_count(), of_free);

        let fd = fds.pop().unwrap();
        io.close(1, fd).unwrap();
        assert_eq!(io.open(1, b"/dev/null", RW, 0), Ok(fd));
    }

    #[test]
    fn test_open_file_table_exhaustion_across_processes() {
        vfs_init_builtin_filesystems();
        let io = FileIo::new();
        for pid in 1..=3 {
            io.create_table_for_process(pid).unwrap();
        }

        let mut opened = Vec::new();
        'outer: loop {
            for pid in 1..=3 {
                match io.open(pid, b"/dev/null", RW, 0) {
                    Ok(fd) => opened.push((pid, fd)),
                    Err(e) => {
                        assert_eq!(e, FileError::FileTableFull);
                        break 'outer;
                    }
                }
            }
        }
        // Nine console entries plus one per successful open.
        assert_eq!(opened.len(), OPEN_FILE_MAX - 9);

        let (pid, fd) = opened.pop().unwrap();
        io.close(pid, fd).unwrap();
        assert!(io.open(pid, b"/dev/null", RW, 0).is_ok());
    }

    #[test]
    fn test_access_mode_enforcement() {
        vfs_init_builtin_filesystems();
        let io = FileIo::new();

        let fd = io
            .open(KERNEL, b"/modes.txt", OpenFlags::CREAT.union(OpenFlags::WRITE), 0o644)
            .unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(io.read(KERNEL, fd, &mut buf), Err(FileError::PermissionDenied));
        io.close(KERNEL, fd).unwrap();

        let fd = io.open(KERNEL, b"/modes.txt", OpenFlags::READ, 0).unwrap();
        assert_eq!(io.write(KERNEL, fd, b"no"), Err(FileError::PermissionDenied));
        io.close(KERNEL, fd).unwrap();
    }

    #[test]
    fn test_lseek_whence_and_bounds() {
        vfs_init_builtin_filesystems();
        let io = FileIo::new();

        let fd = io
            .open(KERNEL, b"/seek.txt", OpenFlags::CREAT.union(RW), 0o644)
            .unwrap();
        io.write(KERNEL, fd, b"0123456789").unwrap();

        assert_eq!(io.lseek(KERNEL, fd, 4, SEEK_SET), Ok(4));
        assert_eq!(io.lseek(KERNEL, fd, 3, SEEK_CUR), Ok(7));
        assert_eq!(io.lseek(KERNEL, fd, 0, SEEK_END), Ok(10));
        assert_eq!(io.lseek(KERNEL, fd, -4, SEEK_END), Ok(6));

        // Failures leave the offset untouched.
        assert_eq!(io.lseek(KERNEL, fd, -1, SEEK_SET), Err(FileError::InvalidArgument));
        assert_eq!(io.lseek(KERNEL, fd, -7, SEEK_CUR), Err(FileError::InvalidArgument));
        assert_eq!(io.lseek(KERNEL, fd, 0, 99), Err(FileError::InvalidArgument));
        assert_eq!(io.lseek(KERNEL, fd, 0, SEEK_CUR), Ok(6));

        let mut buf = [0u8; 16];
        assert_eq!(io.read(KERNEL, fd, &mut buf), Ok(4));
        assert_eq!(&buf[..4], b"6789");

        // Seeking past EOF is allowed; reads there see EOF.
        assert_eq!(io.lseek(KERNEL, fd, 100, SEEK_END), Ok(110));
        assert_eq!(io.read(KERNEL, fd, &mut buf), Ok(0));

        io.close(KERNEL, fd).unwrap();
    }

    #[test]
    fn test_transfer_at_offset_limit_saturates() {
        vfs_init_builtin_filesystems();
        let io = FileIo::new();

        let fd = io.open(KERNEL, b"/dev/zero", OpenFlags::READ, 0).unwrap();
        io.lseek(KERNEL, fd, i64::MAX, SEEK_SET).unwrap();
        io.lseek(KERNEL, fd, i64::MAX, SEEK_CUR).unwrap();
        let mut buf = [0xFFu8; 4];
        assert_eq!(io.read(KERNEL, fd, &mut buf), Ok(4));
        assert_eq!(io.lseek(KERNEL, fd, 0, SEEK_CUR), Ok(u64::MAX));
        io.close(KERNEL, fd).unwrap();

        let fd = io.open(KERNEL, b"/dev/null", OpenFlags::WRITE, 0).unwrap();
        io.lseek(KERNEL, fd, i64::MAX, SEEK_SET).unwrap();
        io.lseek(KERNEL, fd, i64::MAX, SEEK_CUR).unwrap();
        assert_eq!(io.write(KERNEL, fd, b"tail"), Ok(4));
        assert_eq!(io.lseek(KERNEL, fd, 0, SEEK_CUR), Ok(u64::MAX));
        io.close(KERNEL, fd).unwrap();
    }

    #[test]
    fn test_write_larger_than_chunk() {
        vfs_init_builtin_filesystems();
        let io = FileIo::new();

        let mut data = [0u8; 1300];
        for (i, b) in data.iter_mut().enumerate() {
            *b = (i % 251) as u8;
        }

        let fd = io
            .open(KERNEL, b"/chunky.bin", OpenFlags::CREAT.union(RW), 0o644)
            .unwrap();
        assert_eq!(io.write(KERNEL, fd, &data), Ok(1300));
        assert_eq!(io.lseek(KERNEL, fd, 0, SEEK_SET), Ok(0));

        let mut back = [0u8; 1300];
        let mut total = 0;
        while total < back.len() {
            let n = io.read(KERNEL, fd, &mut back[total..]).unwrap();
            assert!(n > 0);
            total += n;
        }
        assert_eq!(back, data);
        io.close(KERNEL, fd).unwrap();
    }

    #[test]
    fn test_append_writes_at_end() {
        vfs_init_builtin_filesystems();
        let io = FileIo::new();

        let fd = io
            .open(KERNEL, b"/append.txt", OpenFlags::CREAT.union(OpenFlags::WRITE), 0o644)
            .unwrap();
        io.write(KERNEL, fd, b"hello").unwrap();
        io.close(KERNEL, fd).unwrap();

        let flags = OpenFlags::WRITE.union(OpenFlags::APPEND);
        let fd = io.open(KERNEL, b"/append.txt", flags, 0).unwrap();
        assert_eq!(io.write(KERNEL, fd, b"world"), Ok(5));
        io.close(KERNEL, fd).unwrap();

        let fd = io.open(KERNEL, b"/append.txt", OpenFlags::READ, 0).unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(io.read(KERNEL, fd, &mut buf), Ok(10));
        assert_eq!(&buf[..10], b"helloworld");
        io.close(KERNEL, fd).unwrap();
    }

    #[test]
    fn test_close_twice_is_bad_handle() {
        vfs_init_builtin_filesystems();
        let io = FileIo::new();

        let fd = io.open(KERNEL, b"/dev/null", RW, 0).unwrap();
        io.close(KERNEL, fd).unwrap();
        assert_eq!(io.close(KERNEL, fd), Err(FileError::BadHandle));
        assert_eq!(io.close(KERNEL, FD_TABLE_SIZE + 1), Err(FileError::BadHandle));
        assert_eq!(io.of_table.free_count(), OPEN_FILE_MAX);
    }

    #[test]
    fn test_dup2_self_is_noop() {
        vfs_init_builtin_filesystems();
        let io = FileIo::new();

        let fd = io.open(KERNEL, b"/dev/null", RW, 0).unwrap();
        let of_index = io.kernel_fds.lookup(fd).unwrap();
        assert_eq!(io.dup2(KERNEL, fd, fd), Ok(fd));
        io.of_table
            .with_entry(of_index, |e| {
                assert_eq!(e.refcount, 1);
                Ok(())
            })
            .unwrap();
        assert_eq!(io.dup2(KERNEL, 31, 31), Err(FileError::BadHandle));
        io.close(KERNEL, fd).unwrap();
    }

    #[test]
    fn test_dup2_to_unopened_descriptor() {
        vfs_init_builtin_filesystems();
        let io = FileIo::new();

        let fd = io
            .open(KERNEL, b"/dupfree.txt", OpenFlags::CREAT.union(RW), 0o644)
            .unwrap();
        io.write(KERNEL, fd, b"abcdef").unwrap();

        let target = 20;
        assert_eq!(io.dup2(KERNEL, fd, target), Ok(target));

        // Shared offset: seek via one descriptor, read via the other.
        io.lseek(KERNEL, target, 2, SEEK_SET).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(io.read(KERNEL, fd, &mut buf), Ok(4));
        assert_eq!(&buf[..4], b"cdef");

        io.close(KERNEL, fd).unwrap();
        // The alias survives the original descriptor.
        io.lseek(KERNEL, target, 0, SEEK_SET).unwrap();
        assert_eq!(io.read(KERNEL, target, &mut buf), Ok(6));
        io.close(KERNEL, target).unwrap();
        assert_eq!(io.of_table.free_count(), OPEN_FILE_MAX);
    }

    #[test]
    fn test_dup2_over_open_descriptor() {
        vfs_init_builtin_filesystems();
        let io = FileIo::new();

        let a = io.open(KERNEL, b"/dev/zero", OpenFlags::READ, 0).unwrap();
        let b = io.open(KERNEL, b"/dev/null", OpenFlags::READ, 0).unwrap();
        let a_of = io.kernel_fds.lookup(a).unwrap();
        assert_eq!(io.of_table.free_count(), OPEN_FILE_MAX - 2);

        assert_eq!(io.dup2(KERNEL, a, b), Ok(b));
        // b's old open file was the last reference and got torn down.
        assert_eq!(io.of_table.free_count(), OPEN_FILE_MAX - 1);
        assert_eq!(io.kernel_fds.lookup(b), Ok(a_of));
        io.of_table
            .with_entry(a_of, |e| {
                assert_eq!(e.refcount, 2);
                Ok(())
            })
            .unwrap();

        // Duplicate again onto a target already aliasing the source.
        assert_eq!(io.dup2(KERNEL, a, b), Ok(b));
        io.of_table
            .with_entry(a_of, |e| {
                assert_eq!(e.refcount, 2);
                Ok(())
            })
            .unwrap();

        let mut buf = [0xFFu8; 4];
        assert_eq!(io.read(KERNEL, b, &mut buf), Ok(4));
        assert_eq!(buf, [0u8; 4]);

        io.close(KERNEL, a).unwrap();
        io.close(KERNEL, b).unwrap();
        assert_eq!(io.of_table.free_count(), OPEN_FILE_MAX);
    }

    #[test]
    fn test_console_bootstrap_descriptors() {
        vfs_init_builtin_filesystems();
        let io = FileIo::new();
        io.create_table_for_process(7).unwrap();

        assert_eq!(io.write(7, 1, b"boot message"), Ok(12));
        assert_eq!(io.write(7, 2, b"oops"), Ok(4));
        assert_eq!(io.write(7, 0, b"x"), Err(FileError::PermissionDenied));

        let mut buf = [0u8; 4];
        assert_eq!(io.read(7, 0, &mut buf), Ok(0));
        assert_eq!(io.read(7, 1, &mut buf), Err(FileError::PermissionDenied));

        assert_eq!(io.lseek(7, 1, 0, SEEK_SET), Err(FileError::NotSeekable));

        // Creating the same table again is a no-op.
        io.create_table_for_process(7).unwrap();
        assert_eq!(io.of_table.free_count(), OPEN_FILE_MAX - 3);
    }

    #[test]
    fn test_missing_process_table() {
        vfs_init_builtin_filesystems();
        let io = FileIo::new();

        assert_eq!(
            io.open(42, b"/dev/null", RW, 0),
            Err(FileError::NoSuchProcess)
        );
        let mut buf = [0u8; 1];
        assert_eq!(io.read(42, 0, &mut buf), Err(FileError::NoSuchProcess));
        assert_eq!(io.destroy_table_for_process(42), Err(FileError::NoSuchProcess));
    }

    #[test]
    fn test_process_registry_limit() {
        vfs_init_builtin_filesystems();
        let io = FileIo::new();

        for pid in 1..=MAX_PROCESSES as u32 {
            io.create_table_for_process(pid).unwrap();
        }
        assert_eq!(
            io.create_table_for_process(100),
            Err(FileError::ProcessLimit)
        );

        io.destroy_table_for_process(1).unwrap();
        io.create_table_for_process(100).unwrap();
    }

    #[test]
    fn test_destroy_closes_everything() {
        vfs_init_builtin_filesystems();
        let io = FileIo::new();
        io.create_table_for_process(5).unwrap();

        for _ in 0..10 {
            io.open(5, b"/dev/null", RW, 0).unwrap();
        }
        let fd = io.open(5, b"/dev/zero", OpenFlags::READ, 0).unwrap();
        io.dup2(5, fd, 30).unwrap();
        assert_ne!(io.of_table.free_count(), OPEN_FILE_MAX);

        io.destroy_table_for_process(5).unwrap();
        assert_eq!(io.of_table.free_count(), OPEN_FILE_MAX);
        assert_eq!(io.open(5, b"/dev/null", RW, 0), Err(FileError::NoSuchProcess));
    }

    #[test]
    fn test_clone_shares_open_files() {
        vfs_init_builtin_filesystems();
        let io = FileIo::new();
        io.create_table_for_process(1).unwrap();

        let fd = io
            .open(1, b"/cloned.txt", OpenFlags::CREAT.union(RW), 0o644)
            .unwrap();
        io.write(1, fd, b"abcdef").unwrap();
        io.lseek(1, fd, 0, SEEK_SET).unwrap();

        io.clone_table_for_process(1, 2).unwrap();

        // Same descriptor number, same entry, shared offset.
        let mut buf = [0u8; 3];
        assert_eq!(io.read(2, fd, &mut buf), Ok(3));
        assert_eq!(&buf, b"abc");
        assert_eq!(io.read(1, fd, &mut buf), Ok(3));
        assert_eq!(&buf, b"def");

        // The child's copy outlives the parent's.
        io.close(1, fd).unwrap();
        io.lseek(2, fd, 0, SEEK_SET).unwrap();
        assert_eq!(io.read(2, fd, &mut buf), Ok(3));

        io.destroy_table_for_process(1).unwrap();
        io.destroy_table_for_process(2).unwrap();
        assert_eq!(io.of_table.free_count(), OPEN_FILE_MAX);
    }

    #[test]
    fn test_concurrent_table_audit() {
        vfs_init_builtin_filesystems();
        let io = FileIo::new();
        for pid in 1..=4 {
            io.create_table_for_process(pid).unwrap();
        }

        std::thread::scope(|s| {
            for pid in 1..=4u32 {
                let io = &io;
                s.spawn(move || {
                    let mut state = 0x853c49e6748fea9b ^ u64::from(pid);
                    let mut fds: Vec<usize> = Vec::new();
                    for _ in 0..400 {
                        match xorshift(&mut state) % 4 {
                            0 | 1 => {
                                if let Ok(fd) = io.open(pid, b"/dev/null", RW, 0) {
                                    fds.push(fd);
                                }
                            }
                            2 => {
                                if !fds.is_empty() {
                                    let i = xorshift(&mut state) as usize % fds.len();
                                    let fd = fds.swap_remove(i);
                                    io.close(pid, fd).unwrap();
                                }
                            }
                            _ => {
                                if !fds.is_empty() {
                                    let i = xorshift(&mut state) as usize % fds.len();
                                    let src = fds[i];
                                    let target =
                                        3 + (xorshift(&mut state) as usize % (FD_TABLE_SIZE - 3));
                                    if target != src {
                                        io.dup2(pid, src, target).unwrap();
                                        if !fds.contains(&target) {
                                            fds.push(target);
                                        }
                                    }
                                }
                            }
                        }
                    }
                });
            }
        });

        // Quiescent audit: every descriptor binding is matched by exactly
        // one open file reference, and every entry is either bound or free.
        let mut binding_counts = [0u32; OPEN_FILE_MAX];
        for pid in 1..=4 {
            let idx = io.registry_index(pid).unwrap();
            io.fd_tables[idx].with(|t| {
                for (_, of_index) in t.occupied_fds() {
                    binding_counts[of_index] += 1;
                }
            });
        }

        let mut occupied = 0;
        for (of_index, &count) in binding_counts.iter().enumerate() {
            if count > 0 {
                occupied += 1;
                io.of_table
                    .with_entry(of_index, |e| {
                        assert_eq!(e.refcount, count);
                        Ok(())
                    })
                    .unwrap();
            }
        }
        assert_eq!(occupied + io.of_table.free_count(), OPEN_FILE_MAX);
    }

    #[test]
    fn test_syscall_wrappers_validate_pointers() {
        vfs_init_builtin_filesystems();

        assert_eq!(
            sys_open(INVALID_PROCESS_ID, core::ptr::null(), OpenFlags::READ.bits(), 0),
            -(errno::EFAULT as i64)
        );
        assert_eq!(
            sys_open(
                INVALID_PROCESS_ID,
                b"/dev/null\0".as_ptr() as *const c_char,
                0x8000_0000,
                0
            ),
            -(errno::EINVAL as i64)
        );
        assert_eq!(
            sys_read(INVALID_PROCESS_ID, -1, core::ptr::null_mut(), 0),
            -(errno::EBADF as i64)
        );
        assert_eq!(
            sys_write(INVALID_PROCESS_ID, 0, core::ptr::null(), 8),
            -(errno::EFAULT as i64)
        );

        let fd = sys_open(
            INVALID_PROCESS_ID,
            b"/dev/null\0".as_ptr() as *const c_char,
            RW.bits(),
            0,
        );
        assert!(fd >= 0);
        let mut buf = [0u8; 4];
        assert_eq!(
            sys_read(INVALID_PROCESS_ID, fd as c_int, buf.as_mut_ptr(), buf.len()),
            0
        );
        assert_eq!(sys_close(INVALID_PROCESS_ID, fd as c_int), 0);
        assert_eq!(
            sys_close(INVALID_PROCESS_ID, fd as c_int),
            -(errno::EBADF as i64)
        );
    }
}
