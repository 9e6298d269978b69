//! Device filesystem mounted at /dev.
//!
//! A flat, read-only namespace of character devices. The console device is
//! what newly created processes get on their first three descriptors;
//! output written to it is forwarded to whatever sink the platform layer
//! registers (serial, framebuffer console). Until a sink is registered,
//! console writes are accepted and dropped.

use core::fmt;
use core::sync::atomic::{AtomicPtr, Ordering};

use crate::MAX_NAME_LEN;
use crate::vfs::{FileStat, FileSystem, InodeId, Vnode, VfsError, VfsResult};

const ROOT_INODE: InodeId = 1;
const NULL_INODE: InodeId = 2;
const ZERO_INODE: InodeId = 3;
const CONSOLE_INODE: InodeId = 4;

struct DeviceEntry {
    name: [u8; MAX_NAME_LEN],
    name_len: usize,
    inode: InodeId,
}

impl DeviceEntry {
    const fn new(name: &[u8], inode: InodeId) -> Self {
        let mut entry = Self {
            name: [0; MAX_NAME_LEN],
            name_len: 0,
            inode,
        };
        let len = if name.len() < MAX_NAME_LEN {
            name.len()
        } else {
            MAX_NAME_LEN
        };
        let mut i = 0;
        while i < len {
            entry.name[i] = name[i];
            i += 1;
        }
        entry.name_len = len;
        entry
    }
}

static DEVICES: [DeviceEntry; 3] = [
    DeviceEntry::new(b"null", NULL_INODE),
    DeviceEntry::new(b"zero", ZERO_INODE),
    DeviceEntry::new(b"console", CONSOLE_INODE),
];

/// Signature of the console output sink.
pub type ConsoleSink = fn(fmt::Arguments<'_>);

/// Null means no sink registered; console output is dropped.
static CONSOLE_SINK: AtomicPtr<()> = AtomicPtr::new(core::ptr::null_mut());

/// Route console device output to the given sink.
pub fn register_console_sink(sink: ConsoleSink) {
    CONSOLE_SINK.store(sink as *mut (), Ordering::Release);
}

fn console_emit(bytes: &[u8]) {
    let ptr = CONSOLE_SINK.load(Ordering::Acquire);
    if ptr.is_null() {
        return;
    }
    // SAFETY: only valid `ConsoleSink` fn pointers are ever stored, and fn
    // pointers have the same representation as `*mut ()` on supported
    // targets.
    let sink: ConsoleSink = unsafe { core::mem::transmute(ptr) };
    // Console payloads are text in practice; replace anything else.
    for chunk in bytes.utf8_chunks() {
        sink(format_args!("{}", chunk.valid()));
        if !chunk.invalid().is_empty() {
            sink(format_args!("\u{FFFD}"));
        }
    }
}

pub struct DevFs;

impl DevFs {
    pub const fn new() -> Self {
        Self
    }
}

impl Default for DevFs {
    fn default() -> Self {
        Self::new()
    }
}

/// Vnode for the console device, independent of the mount table.
///
/// Used to wire up descriptors 0-2 before a process ever resolves a path.
pub fn console_vnode(fs: &'static DevFs) -> Vnode {
    Vnode {
        fs,
        inode: CONSOLE_INODE,
    }
}

impl FileSystem for DevFs {
    fn name(&self) -> &'static str {
        "devfs"
    }

    fn root_inode(&self) -> InodeId {
        ROOT_INODE
    }

    fn lookup(&self, parent: InodeId, name: &[u8]) -> VfsResult<InodeId> {
        if parent != ROOT_INODE {
            return Err(VfsError::NotDirectory);
        }

        if name == b"." || name == b".." {
            return Ok(ROOT_INODE);
        }

        for dev in &DEVICES {
            if dev.name_len == name.len() && &dev.name[..dev.name_len] == name {
                return Ok(dev.inode);
            }
        }

        Err(VfsError::NotFound)
    }

    fn stat(&self, inode: InodeId) -> VfsResult<FileStat> {
        if inode == ROOT_INODE {
            return Ok(FileStat::new_directory(ROOT_INODE));
        }

        for dev in &DEVICES {
            if dev.inode == inode {
                return Ok(FileStat::new_char_device(inode));
            }
        }

        Err(VfsError::NotFound)
    }

    fn read(&self, inode: InodeId, _offset: u64, buf: &mut [u8]) -> VfsResult<usize> {
        match inode {
            NULL_INODE => Ok(0),

            ZERO_INODE => {
                buf.fill(0);
                Ok(buf.len())
            }

            // No input driver wired up; reads observe EOF.
            CONSOLE_INODE => Ok(0),

            ROOT_INODE => Err(VfsError::IsDirectory),

            _ => Err(VfsError::NotFound),
        }
    }

    fn write(&self, inode: InodeId, _offset: u64, buf: &[u8]) -> VfsResult<usize> {
        match inode {
            NULL_INODE | ZERO_INODE => Ok(buf.len()),

            CONSOLE_INODE => {
                console_emit(buf);
                Ok(buf.len())
            }

            ROOT_INODE => Err(VfsError::IsDirectory),

            _ => Err(VfsError::NotFound),
        }
    }

    fn is_seekable(&self, inode: InodeId) -> bool {
        inode != CONSOLE_INODE
    }
}
