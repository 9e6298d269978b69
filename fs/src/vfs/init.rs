//! Built-in filesystem bring-up.

use spin::Once;

use siltos_lib::{klog_info, klog_warn};

use crate::devfs::DevFs;
use crate::ramfs::RamFs;
use crate::vfs::mount::mount;

static ROOT_FS: RamFs = RamFs::new();
static DEV_FS: DevFs = DevFs::new();

static VFS_INIT: Once<()> = Once::new();

/// Mount the built-in filesystems: ramfs at `/` and devfs at `/dev`.
///
/// Idempotent; later calls are no-ops.
pub fn vfs_init_builtin_filesystems() {
    VFS_INIT.call_once(|| {
        ROOT_FS.ensure_initialized();

        if let Err(e) = mount(b"/", &ROOT_FS) {
            klog_warn!("vfs: failed to mount ramfs at /: {:?}", e);
            return;
        }
        if let Err(e) = mount(b"/dev", &DEV_FS) {
            klog_warn!("vfs: failed to mount devfs at /dev: {:?}", e);
            return;
        }

        klog_info!("vfs: mounted ramfs at / and devfs at /dev");
    });
}

pub fn vfs_is_initialized() -> bool {
    VFS_INIT.is_completed()
}
