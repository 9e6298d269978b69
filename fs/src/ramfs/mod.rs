//! In-memory filesystem backing the root mount.
//!
//! Fixed-capacity arrays throughout: no allocator dependency, safe to use
//! before the heap comes up.

use siltos_lib::SpinMutex;

use crate::MAX_NAME_LEN;
use crate::vfs::{FileStat, FileSystem, FileType, InodeId, VfsError, VfsResult};

const MAX_INODES: usize = 64;
const RAMFS_MAX_FILE_SIZE: usize = 4096;
const MAX_DIR_ENTRIES: usize = 32;

const ROOT_INODE: InodeId = 1;

#[derive(Clone, Copy)]
struct DirEntry {
    name: [u8; MAX_NAME_LEN],
    name_len: usize,
    inode: InodeId,
}

impl DirEntry {
    const fn empty() -> Self {
        Self {
            name: [0; MAX_NAME_LEN],
            name_len: 0,
            inode: 0,
        }
    }
}

struct RamInode {
    in_use: bool,
    file_type: FileType,
    data: [u8; RAMFS_MAX_FILE_SIZE],
    data_len: usize,
    dir_entries: [DirEntry; MAX_DIR_ENTRIES],
    dir_entry_count: usize,
    mode: u16,
}

impl RamInode {
    const fn empty() -> Self {
        Self {
            in_use: false,
            file_type: FileType::Regular,
            data: [0; RAMFS_MAX_FILE_SIZE],
            data_len: 0,
            dir_entries: [const { DirEntry::empty() }; MAX_DIR_ENTRIES],
            dir_entry_count: 0,
            mode: 0o644,
        }
    }

    fn add_dir_entry(&mut self, name: &[u8], inode: InodeId) -> VfsResult<()> {
        if self.dir_entry_count >= MAX_DIR_ENTRIES {
            return Err(VfsError::NoSpace);
        }

        if self.lookup(name).is_ok() {
            return Err(VfsError::AlreadyExists);
        }

        let entry = &mut self.dir_entries[self.dir_entry_count];
        let len = name.len().min(MAX_NAME_LEN);
        entry.name[..len].copy_from_slice(&name[..len]);
        entry.name_len = len;
        entry.inode = inode;
        self.dir_entry_count += 1;

        Ok(())
    }

    fn lookup(&self, name: &[u8]) -> VfsResult<InodeId> {
        for i in 0..self.dir_entry_count {
            let entry = &self.dir_entries[i];
            if entry.name_len == name.len() && &entry.name[..name.len()] == name {
                return Ok(entry.inode);
            }
        }
        Err(VfsError::NotFound)
    }
}

struct RamFsInner {
    inodes: [RamInode; MAX_INODES],
    initialized: bool,
}

impl RamFsInner {
    const fn new() -> Self {
        Self {
            inodes: [const { RamInode::empty() }; MAX_INODES],
            initialized: false,
        }
    }

    fn ensure_initialized(&mut self) {
        if self.initialized {
            return;
        }
        self.initialized = true;

        let root = &mut self.inodes[ROOT_INODE as usize];
        root.in_use = true;
        root.file_type = FileType::Directory;
        root.mode = 0o755;

        root.add_dir_entry(b".", ROOT_INODE).ok();
        root.add_dir_entry(b"..", ROOT_INODE).ok();
    }

    fn alloc_inode(&mut self) -> VfsResult<InodeId> {
        for id in (ROOT_INODE as usize + 1)..MAX_INODES {
            if !self.inodes[id].in_use {
                return Ok(id as InodeId);
            }
        }
        Err(VfsError::NoSpace)
    }

    fn get_inode(&self, id: InodeId) -> VfsResult<&RamInode> {
        if id as usize >= MAX_INODES {
            return Err(VfsError::NotFound);
        }
        let inode = &self.inodes[id as usize];
        if !inode.in_use {
            return Err(VfsError::NotFound);
        }
        Ok(inode)
    }

    fn get_inode_mut(&mut self, id: InodeId) -> VfsResult<&mut RamInode> {
        if id as usize >= MAX_INODES {
            return Err(VfsError::NotFound);
        }
        let inode = &mut self.inodes[id as usize];
        if !inode.in_use {
            return Err(VfsError::NotFound);
        }
        Ok(inode)
    }
}

pub struct RamFs {
    inner: SpinMutex<RamFsInner>,
}

impl RamFs {
    pub const fn new() -> Self {
        Self {
            inner: SpinMutex::new(RamFsInner::new()),
        }
    }

    /// Build the root directory if that has not happened yet.
    pub fn ensure_initialized(&self) {
        self.inner.lock().ensure_initialized();
    }

    fn with_inner<R>(&self, f: impl FnOnce(&RamFsInner) -> R) -> R {
        let mut inner = self.inner.lock();
        inner.ensure_initialized();
        f(&inner)
    }

    fn with_inner_mut<R>(&self, f: impl FnOnce(&mut RamFsInner) -> R) -> R {
        let mut inner = self.inner.lock();
        inner.ensure_initialized();
        f(&mut inner)
    }
}

impl Default for RamFs {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem for RamFs {
    fn name(&self) -> &'static str {
        "ramfs"
    }

    fn root_inode(&self) -> InodeId {
        ROOT_INODE
    }

    fn lookup(&self, parent: InodeId, name: &[u8]) -> VfsResult<InodeId> {
        self.with_inner(|inner| {
            let parent_inode = inner.get_inode(parent)?;

            if parent_inode.file_type != FileType::Directory {
                return Err(VfsError::NotDirectory);
            }

            parent_inode.lookup(name)
        })
    }

    fn stat(&self, inode: InodeId) -> VfsResult<FileStat> {
        self.with_inner(|inner| {
            let ram_inode = inner.get_inode(inode)?;

            Ok(FileStat {
                inode,
                file_type: ram_inode.file_type,
                size: ram_inode.data_len as u64,
                mode: ram_inode.mode,
            })
        })
    }

    fn read(&self, inode: InodeId, offset: u64, buf: &mut [u8]) -> VfsResult<usize> {
        self.with_inner(|inner| {
            let ram_inode = inner.get_inode(inode)?;

            if ram_inode.file_type == FileType::Directory {
                return Err(VfsError::IsDirectory);
            }

            let offset = offset as usize;
            if offset >= ram_inode.data_len {
                return Ok(0);
            }

            let available = ram_inode.data_len - offset;
            let to_read = buf.len().min(available);
            buf[..to_read].copy_from_slice(&ram_inode.data[offset..offset + to_read]);

            Ok(to_read)
        })
    }

    fn write(&self, inode: InodeId, offset: u64, buf: &[u8]) -> VfsResult<usize> {
        self.with_inner_mut(|inner| {
            let ram_inode = inner.get_inode_mut(inode)?;

            if ram_inode.file_type == FileType::Directory {
                return Err(VfsError::IsDirectory);
            }

            let offset = offset as usize;
            if offset >= RAMFS_MAX_FILE_SIZE {
                return Err(VfsError::NoSpace);
            }

            // Sparse writes past the current end zero-fill the gap, which
            // the const-initialised data array already guarantees.
            let to_write = buf.len().min(RAMFS_MAX_FILE_SIZE - offset);
            if to_write == 0 {
                return Err(VfsError::NoSpace);
            }
            let end = offset + to_write;

            ram_inode.data[offset..end].copy_from_slice(&buf[..to_write]);
            if end > ram_inode.data_len {
                ram_inode.data_len = end;
            }

            Ok(to_write)
        })
    }

    fn create(
        &self,
        parent: InodeId,
        name: &[u8],
        file_type: FileType,
        mode: u16,
    ) -> VfsResult<InodeId> {
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(VfsError::NameTooLong);
        }

        self.with_inner_mut(|inner| {
            {
                let parent_inode = inner.get_inode(parent)?;
                if parent_inode.file_type != FileType::Directory {
                    return Err(VfsError::NotDirectory);
                }
                if parent_inode.lookup(name).is_ok() {
                    return Err(VfsError::AlreadyExists);
                }
            }

            let new_id = inner.alloc_inode()?;

            {
                let new_inode = &mut inner.inodes[new_id as usize];
                new_inode.in_use = true;
                new_inode.file_type = file_type;
                new_inode.data_len = 0;
                new_inode.dir_entry_count = 0;
                new_inode.mode = mode;

                if file_type == FileType::Directory {
                    new_inode.add_dir_entry(b".", new_id)?;
                    new_inode.add_dir_entry(b"..", parent)?;
                }
            }

            inner.get_inode_mut(parent)?.add_dir_entry(name, new_id)?;

            Ok(new_id)
        })
    }
}
