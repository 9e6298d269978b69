#![no_std]

use siltos_abi::fs::USER_PATH_MAX;

/// Kernel-side path limit, identical to the one userland sees.
pub const MAX_PATH_LEN: usize = USER_PATH_MAX;
pub const MAX_NAME_LEN: usize = 32;

pub mod devfs;
pub mod error;
pub mod fd_table;
pub mod fileio;
pub mod of_table;
pub mod ramfs;
pub mod slot;
pub mod vfs;

#[cfg(test)]
extern crate std;

pub use devfs::{DevFs, register_console_sink};
pub use error::{FileError, FileResult};
pub use fd_table::FdTable;
pub use fileio::*;
pub use of_table::OpenFileTable;
pub use ramfs::RamFs;
pub use vfs::{
    FileStat, FileSystem, FileType, InodeId, VfsError, VfsResult, mount,
    vfs_init_builtin_filesystems, vfs_is_initialized,
};
