//! SiltOS Kernel-Userland ABI Types
//!
//! This crate provides the canonical definitions for all types shared between
//! the kernel and userland. Having a single source of truth eliminates:
//! - Duplicate type definitions
//! - ABI mismatches between kernel and userland
//! - The need for unsafe FFI conversions

#![no_std]
#![forbid(unsafe_code)]

pub mod error;
pub mod fs;
pub mod syscall;
pub mod task;

pub use error::*;
pub use fs::*;
pub use syscall::*;
pub use task::*;
