//! Filesystem ABI types shared between kernel and userland.

use bitflags::bitflags;

/// Maximum path length for filesystem operations
pub const USER_PATH_MAX: usize = 256;

/// Per-process file descriptor table capacity. Handles are in
/// `[0, FD_TABLE_SIZE)`; 0/1/2 are pre-bound to the console at process start.
pub const FD_TABLE_SIZE: usize = 32;

/// System-wide open file table capacity, shared by all processes.
pub const OPEN_FILE_MAX: usize = 64;

bitflags! {
    /// File open flags.
    ///
    /// At least one of READ/WRITE must be set; APPEND requires WRITE.
    #[repr(transparent)]
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct OpenFlags: u32 {
        const READ = 0x1;
        const WRITE = 0x2;
        const CREAT = 0x4;
        const APPEND = 0x8;
    }
}

impl OpenFlags {
    /// True when the flags permit reading.
    pub fn readable(self) -> bool {
        self.contains(OpenFlags::READ)
    }

    /// True when the flags permit writing.
    pub fn writable(self) -> bool {
        self.contains(OpenFlags::WRITE)
    }
}
