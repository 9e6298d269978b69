//! Error type for the file descriptor layer.
//!
//! Every syscall returns exactly one outcome; VFS-layer errors are carried
//! through verbatim and only mapped to an errno at the ABI edge.

use siltos_abi::error as errno;

use crate::vfs::VfsError;

pub type FileResult<T> = Result<T, FileError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileError {
    /// Null/empty path, bad flags, or an offset computation went negative.
    InvalidArgument,
    /// Handle or open-file index does not name an occupied entry.
    BadHandle,
    /// Access mode forbids the requested transfer direction.
    PermissionDenied,
    /// The underlying vnode does not support seeking.
    NotSeekable,
    /// Per-process descriptor table is full (EMFILE).
    FdTableFull,
    /// System-wide open file table is full (ENFILE).
    FileTableFull,
    /// No descriptor table registered for this process.
    NoSuchProcess,
    /// Process registry is full.
    ProcessLimit,
    /// Verbatim pass-through of a VFS-layer error.
    Vfs(VfsError),
}

impl FileError {
    pub fn errno(self) -> i32 {
        match self {
            FileError::InvalidArgument => errno::EINVAL,
            FileError::BadHandle => errno::EBADF,
            FileError::PermissionDenied => errno::EACCES,
            FileError::NotSeekable => errno::ESPIPE,
            FileError::FdTableFull => errno::EMFILE,
            FileError::FileTableFull => errno::ENFILE,
            FileError::NoSuchProcess => errno::ESRCH,
            FileError::ProcessLimit => errno::EAGAIN,
            FileError::Vfs(e) => e.errno(),
        }
    }
}

impl From<VfsError> for FileError {
    fn from(e: VfsError) -> Self {
        FileError::Vfs(e)
    }
}
