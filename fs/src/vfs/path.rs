//! Path resolution on top of the mount table.

use crate::MAX_NAME_LEN;
use crate::vfs::mount::resolve_mount;
use crate::vfs::traits::{FileSystem, FileType, InodeId, VfsError, VfsResult};

/// A path resolved down to its owning filesystem and inode.
pub struct ResolvedPath {
    pub fs: &'static dyn FileSystem,
    pub inode: InodeId,
}

fn components(relative: &[u8]) -> impl DoubleEndedIterator<Item = &[u8]> {
    relative
        .split(|&b| b == b'/')
        .filter(|c| !c.is_empty() && *c != b".")
}

/// Resolve an absolute path to an inode, walking one component at a time.
pub fn resolve_path(path: &[u8]) -> VfsResult<ResolvedPath> {
    let (fs, relative) = resolve_mount(path)?;

    let mut inode = fs.root_inode();
    for component in components(relative) {
        if component.len() > MAX_NAME_LEN {
            return Err(VfsError::NameTooLong);
        }
        let stat = fs.stat(inode)?;
        if stat.file_type != FileType::Directory {
            return Err(VfsError::NotDirectory);
        }
        inode = fs.lookup(inode, component)?;
    }

    Ok(ResolvedPath { fs, inode })
}

/// Resolve everything but the final component.
///
/// Returns the parent directory and the leaf name, for create-style
/// operations where the leaf may not exist yet.
pub fn resolve_parent(path: &[u8]) -> VfsResult<(ResolvedPath, &[u8])> {
    let (fs, relative) = resolve_mount(path)?;

    let name = components(relative).next_back().ok_or(VfsError::InvalidPath)?;
    if name.len() > MAX_NAME_LEN {
        return Err(VfsError::NameTooLong);
    }

    let mut inode = fs.root_inode();
    let mut iter = components(relative).peekable();
    while let Some(component) = iter.next() {
        if iter.peek().is_none() {
            break;
        }
        if component.len() > MAX_NAME_LEN {
            return Err(VfsError::NameTooLong);
        }
        let stat = fs.stat(inode)?;
        if stat.file_type != FileType::Directory {
            return Err(VfsError::NotDirectory);
        }
        inode = fs.lookup(inode, component)?;
    }

    let stat = fs.stat(inode)?;
    if stat.file_type != FileType::Directory {
        return Err(VfsError::NotDirectory);
    }

    Ok((ResolvedPath { fs, inode }, name))
}
