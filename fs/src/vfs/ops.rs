use siltos_abi::fs::OpenFlags;

use crate::vfs::path::{resolve_parent, resolve_path};
use crate::vfs::traits::{FileSystem, FileType, InodeId, VfsError, VfsResult};

/// A live reference to an inode on a mounted filesystem.
///
/// Held by open-file-table entries for as long as the file is open; the
/// filesystem's `close` hook runs exactly once, when the last table entry
/// referencing the vnode is torn down.
#[derive(Clone, Copy)]
pub struct Vnode {
    pub fs: &'static dyn FileSystem,
    pub inode: InodeId,
}

impl Vnode {
    pub fn read(&self, offset: u64, buf: &mut [u8]) -> VfsResult<usize> {
        self.fs.read(self.inode, offset, buf)
    }

    pub fn write(&self, offset: u64, buf: &[u8]) -> VfsResult<usize> {
        self.fs.write(self.inode, offset, buf)
    }

    pub fn size(&self) -> VfsResult<u64> {
        let stat = self.fs.stat(self.inode)?;
        Ok(stat.size)
    }

    pub fn is_seekable(&self) -> bool {
        self.fs.is_seekable(self.inode)
    }

    pub fn release(&self) {
        self.fs.close(self.inode);
    }
}

/// Resolve a path into a vnode suitable for an open file table entry.
///
/// Directories are rejected; a missing final component is created when
/// the caller asked for `CREAT`.
pub fn vfs_open(path: &[u8], flags: OpenFlags, mode: u16) -> VfsResult<Vnode> {
    match resolve_path(path) {
        Ok(resolved) => {
            let stat = resolved.fs.stat(resolved.inode)?;
            if stat.file_type == FileType::Directory {
                return Err(VfsError::IsDirectory);
            }
            Ok(Vnode {
                fs: resolved.fs,
                inode: resolved.inode,
            })
        }
        Err(VfsError::NotFound) if flags.contains(OpenFlags::CREAT) => {
            let (parent, name) = resolve_parent(path)?;
            let inode = parent.fs.create(parent.inode, name, FileType::Regular, mode)?;
            Ok(Vnode {
                fs: parent.fs,
                inode,
            })
        }
        Err(e) => Err(e),
    }
}
