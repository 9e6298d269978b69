use spin::RwLock;

use crate::MAX_PATH_LEN;
use crate::vfs::traits::{FileSystem, VfsError, VfsResult};

const MAX_MOUNTS: usize = 16;

pub struct MountPoint {
    path: [u8; MAX_PATH_LEN],
    path_len: usize,
    fs: Option<&'static dyn FileSystem>,
}

impl MountPoint {
    const fn empty() -> Self {
        Self {
            path: [0; MAX_PATH_LEN],
            path_len: 0,
            fs: None,
        }
    }

    fn is_active(&self) -> bool {
        self.fs.is_some()
    }

    fn path_bytes(&self) -> &[u8] {
        &self.path[..self.path_len]
    }
}

pub struct MountTable {
    mounts: [MountPoint; MAX_MOUNTS],
    count: usize,
}

impl MountTable {
    const fn new() -> Self {
        Self {
            mounts: [const { MountPoint::empty() }; MAX_MOUNTS],
            count: 0,
        }
    }

    pub fn mount(&mut self, path: &[u8], fs: &'static dyn FileSystem) -> VfsResult<()> {
        if path.is_empty() || path[0] != b'/' {
            return Err(VfsError::InvalidPath);
        }
        if path.len() > MAX_PATH_LEN {
            return Err(VfsError::NameTooLong);
        }

        for mp in self.mounts.iter() {
            if mp.is_active() && mp.path_bytes() == path {
                return Err(VfsError::AlreadyExists);
            }
        }

        let slot = self
            .mounts
            .iter_mut()
            .find(|m| !m.is_active())
            .ok_or(VfsError::NoSpace)?;

        slot.path[..path.len()].copy_from_slice(path);
        slot.path_len = path.len();
        slot.fs = Some(fs);
        self.count += 1;

        Ok(())
    }

    pub fn unmount(&mut self, path: &[u8]) -> VfsResult<()> {
        for mp in self.mounts.iter_mut() {
            if mp.is_active() && mp.path_bytes() == path {
                mp.fs = None;
                mp.path_len = 0;
                self.count -= 1;
                return Ok(());
            }
        }
        Err(VfsError::NotFound)
    }

    /// Longest-prefix match of `path` against the active mounts.
    ///
    /// Returns the owning filesystem and the path relative to the mount
    /// point (always beginning with `/`).
    pub fn resolve<'a>(&self, path: &'a [u8]) -> VfsResult<(&'static dyn FileSystem, &'a [u8])> {
        if path.is_empty() || path[0] != b'/' {
            return Err(VfsError::InvalidPath);
        }

        let mut best_match: Option<(&MountPoint, usize)> = None;

        for mp in self.mounts.iter() {
            if !mp.is_active() {
                continue;
            }

            let mp_path = mp.path_bytes();

            let matches = if mp_path == b"/" {
                true
            } else if path.len() >= mp_path.len() {
                let prefix_matches = &path[..mp_path.len()] == mp_path;
                let boundary_ok =
                    path.len() == mp_path.len() || path.get(mp_path.len()) == Some(&b'/');
                prefix_matches && boundary_ok
            } else {
                false
            };

            if matches {
                let match_len = mp_path.len();
                if best_match.is_none_or(|(_, len)| match_len > len) {
                    best_match = Some((mp, match_len));
                }
            }
        }

        let (mp, match_len) = best_match.ok_or(VfsError::NotFound)?;
        let fs = mp.fs.ok_or(VfsError::NotFound)?;

        let relative = if match_len >= path.len() {
            b"/" as &[u8]
        } else if path[match_len] == b'/' {
            &path[match_len..]
        } else {
            // Mount path ends with '/' (the root mount), so the byte at
            // match_len is the first of the next component; back up one so
            // the relative path keeps its leading separator.
            &path[match_len - 1..]
        };

        Ok((fs, relative))
    }

    pub fn mount_count(&self) -> usize {
        self.count
    }
}

static MOUNT_TABLE: RwLock<MountTable> = RwLock::new(MountTable::new());

pub fn mount(path: &[u8], fs: &'static dyn FileSystem) -> VfsResult<()> {
    MOUNT_TABLE.write().mount(path, fs)
}

pub fn unmount(path: &[u8]) -> VfsResult<()> {
    MOUNT_TABLE.write().unmount(path)
}

pub fn resolve_mount<'a>(path: &'a [u8]) -> VfsResult<(&'static dyn FileSystem, &'a [u8])> {
    MOUNT_TABLE.read().resolve(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::traits::{FileStat, FileType, InodeId};

    struct StubFs(&'static str);

    impl FileSystem for StubFs {
        fn name(&self) -> &'static str {
            self.0
        }
        fn root_inode(&self) -> InodeId {
            1
        }
        fn lookup(&self, _parent: InodeId, _name: &[u8]) -> VfsResult<InodeId> {
            Err(VfsError::NotFound)
        }
        fn stat(&self, inode: InodeId) -> VfsResult<FileStat> {
            Ok(FileStat::new_file(inode, 0))
        }
        fn read(&self, _inode: InodeId, _offset: u64, _buf: &mut [u8]) -> VfsResult<usize> {
            Ok(0)
        }
        fn write(&self, _inode: InodeId, _offset: u64, buf: &[u8]) -> VfsResult<usize> {
            Ok(buf.len())
        }
        fn create(
            &self,
            _parent: InodeId,
            _name: &[u8],
            _file_type: FileType,
            _mode: u16,
        ) -> VfsResult<InodeId> {
            Err(VfsError::NotSupported)
        }
    }

    static ROOT: StubFs = StubFs("root");
    static DEV: StubFs = StubFs("dev");

    #[test]
    fn test_longest_prefix_wins() {
        let mut table = MountTable::new();
        table.mount(b"/", &ROOT).unwrap();
        table.mount(b"/dev", &DEV).unwrap();

        let (fs, rel) = table.resolve(b"/dev/null").unwrap();
        assert_eq!(fs.name(), "dev");
        assert_eq!(rel, b"/null");

        let (fs, rel) = table.resolve(b"/devices").unwrap();
        assert_eq!(fs.name(), "root");
        assert_eq!(rel, b"/devices");

        let (fs, rel) = table.resolve(b"/dev").unwrap();
        assert_eq!(fs.name(), "dev");
        assert_eq!(rel, b"/");
    }

    #[test]
    fn test_duplicate_mount_rejected() {
        let mut table = MountTable::new();
        table.mount(b"/", &ROOT).unwrap();
        assert_eq!(table.mount(b"/", &DEV), Err(VfsError::AlreadyExists));
        assert_eq!(table.mount_count(), 1);
    }

    #[test]
    fn test_relative_path_rejected() {
        let table = MountTable::new();
        assert_eq!(
            table.resolve(b"foo").map(|_| ()),
            Err(VfsError::InvalidPath)
        );
    }
}
