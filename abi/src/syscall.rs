//! Syscall number definitions (kernel-userland ABI).
//!
//! This module is the single source of truth for all syscall numbers. Both
//! kernel and userland import from here to ensure ABI consistency.
//!
//! Numbers are not required to be contiguous. New syscalls should use the
//! next highest number to avoid ABI breakage with existing userland binaries.

// =============================================================================
// File I/O
// =============================================================================

pub const SYSCALL_OPEN: u64 = 10;
pub const SYSCALL_CLOSE: u64 = 11;
pub const SYSCALL_READ: u64 = 12;
pub const SYSCALL_WRITE: u64 = 13;
pub const SYSCALL_LSEEK: u64 = 14;
pub const SYSCALL_DUP2: u64 = 15;

// =============================================================================
// lseek whence values
// =============================================================================

pub const SEEK_SET: u64 = 0;
pub const SEEK_CUR: u64 = 1;
pub const SEEK_END: u64 = 2;
