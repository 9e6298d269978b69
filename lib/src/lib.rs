#![no_std]

pub mod klog;
pub mod spinlock;

pub use klog::{
    KlogLevel, klog_get_level, klog_init, klog_is_enabled, klog_register_backend, klog_set_level,
};
pub use spinlock::{SpinMutex, SpinMutexGuard};

#[cfg(test)]
extern crate std;
