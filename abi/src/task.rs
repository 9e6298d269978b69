//! Process identification shared between kernel and userland.

/// Kernel process identifier.
pub type ProcessId = u32;

/// Sentinel for "no process"; also identifies the kernel's own context.
pub const INVALID_PROCESS_ID: ProcessId = ProcessId::MAX;

/// Maximum number of concurrently registered processes.
pub const MAX_PROCESSES: usize = 16;
