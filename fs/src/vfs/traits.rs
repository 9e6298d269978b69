//! VFS trait definitions for the SiltOS Virtual File System layer.
//!
//! This module defines the core abstractions that all filesystem
//! implementations must adhere to. Operations are inode-based; path
//! resolution happens in the VFS layer above.

/// Unique identifier for an inode within a filesystem.
/// Each filesystem maintains its own inode number space.
pub type InodeId = u64;

/// File type enumeration matching Unix file types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FileType {
    /// Regular file
    Regular = 1,
    /// Directory
    Directory = 2,
    /// Character device (e.g., /dev/null)
    CharDevice = 3,
}

/// Metadata about a file or directory.
/// Returned by stat operations.
#[derive(Debug, Clone)]
pub struct FileStat {
    /// Inode number within the filesystem
    pub inode: InodeId,
    /// Type of file (regular, directory, device)
    pub file_type: FileType,
    /// Size in bytes (0 for directories, devices)
    pub size: u64,
    /// Unix permission bits
    pub mode: u16,
}

impl FileStat {
    pub const fn new_file(inode: InodeId, size: u64) -> Self {
        Self {
            inode,
            file_type: FileType::Regular,
            size,
            mode: 0o644,
        }
    }

    pub const fn new_directory(inode: InodeId) -> Self {
        Self {
            inode,
            file_type: FileType::Directory,
            size: 0,
            mode: 0o755,
        }
    }

    pub const fn new_char_device(inode: InodeId) -> Self {
        Self {
            inode,
            file_type: FileType::CharDevice,
            size: 0,
            mode: 0o666,
        }
    }
}

/// Result type for VFS operations.
pub type VfsResult<T> = Result<T, VfsError>;

/// Errors that can occur during VFS operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VfsError {
    /// File or directory not found (ENOENT)
    NotFound,
    /// Path component is not a directory (ENOTDIR)
    NotDirectory,
    /// Operation not permitted on a directory (EISDIR)
    IsDirectory,
    /// Permission denied (EACCES)
    PermissionDenied,
    /// Filesystem is read-only (EROFS)
    ReadOnly,
    /// No space left on device (ENOSPC)
    NoSpace,
    /// I/O error (EIO)
    IoError,
    /// Invalid path format
    InvalidPath,
    /// File or directory already exists (EEXIST)
    AlreadyExists,
    /// Filename too long (ENAMETOOLONG)
    NameTooLong,
    /// Operation not supported (ENOTSUP)
    NotSupported,
}

impl VfsError {
    pub fn errno(self) -> i32 {
        use siltos_abi::error as errno;
        match self {
            VfsError::NotFound => errno::ENOENT,
            VfsError::NotDirectory => errno::ENOTDIR,
            VfsError::IsDirectory => errno::EISDIR,
            VfsError::PermissionDenied => errno::EACCES,
            VfsError::ReadOnly => errno::EACCES,
            VfsError::NoSpace => errno::ENOSPC,
            VfsError::IoError => errno::EIO,
            VfsError::InvalidPath => errno::EINVAL,
            VfsError::AlreadyExists => errno::EEXIST,
            VfsError::NameTooLong => errno::ENAMETOOLONG,
            VfsError::NotSupported => errno::ENOSYS,
        }
    }
}

/// A filesystem implementation.
///
/// All filesystem types (ramfs, devfs, etc.) implement this trait.
pub trait FileSystem: Send + Sync {
    /// Get the name of this filesystem type (e.g., "ramfs", "devfs").
    fn name(&self) -> &'static str;

    /// Get the root inode of this filesystem.
    /// This is the entry point for all path traversal within this mount.
    fn root_inode(&self) -> InodeId;

    /// Look up a child entry in a directory by name.
    ///
    /// Returns the inode of the found entry, or `VfsError::NotFound`.
    fn lookup(&self, parent: InodeId, name: &[u8]) -> VfsResult<InodeId>;

    /// Get metadata (stat) for an inode.
    fn stat(&self, inode: InodeId) -> VfsResult<FileStat>;

    /// Read data from a file starting at `offset`.
    ///
    /// Returns the number of bytes actually read (may be less than the
    /// buffer size at EOF).
    fn read(&self, inode: InodeId, offset: u64, buf: &mut [u8]) -> VfsResult<usize>;

    /// Write data to a file starting at `offset`.
    ///
    /// Returns the number of bytes actually written.
    fn write(&self, inode: InodeId, offset: u64, buf: &[u8]) -> VfsResult<usize>;

    /// Create a new entry in a parent directory.
    ///
    /// Returns the inode of the newly created entry.
    fn create(
        &self,
        parent: InodeId,
        name: &[u8],
        file_type: FileType,
        mode: u16,
    ) -> VfsResult<InodeId> {
        let _ = (parent, name, file_type, mode);
        Err(VfsError::NotSupported)
    }

    /// Whether byte offsets are meaningful for this inode.
    ///
    /// Character devices such as the console return false; seeking them
    /// fails with ESPIPE at the syscall layer.
    fn is_seekable(&self, inode: InodeId) -> bool {
        let _ = inode;
        true
    }

    /// Called when the last open reference to an inode is dropped.
    fn close(&self, inode: InodeId) {
        let _ = inode;
    }
}
