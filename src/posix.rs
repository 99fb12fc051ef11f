//! errno and the system call failure convention
//!
//! A failing call stores its reason in the calling thread's errno and
//! returns `SYSCALL_ERROR`.

use core::sync::atomic::{AtomicI32, Ordering};

/// Error numbers the monitor can report.
pub mod errno {
    /// Operation not permitted
    pub const EPERM: i32 = 1;
    /// Bad address
    pub const EFAULT: i32 = 14;
    /// Device or resource busy
    pub const EBUSY: i32 = 16;
    /// Invalid argument
    pub const EINVAL: i32 = 22;
}

pub const SYSCALL_ERROR: u64 = u64::MAX;

static LAST_ERRNO: AtomicI32 = AtomicI32::new(0);

pub fn set_errno(code: i32) {
    LAST_ERRNO.store(code, Ordering::Relaxed);
}

pub fn errno() -> i32 {
    LAST_ERRNO.load(Ordering::Relaxed)
}

/// Record `code` and produce the failure value for the caller.
pub fn fail(code: i32) -> u64 {
    set_errno(code);
    SYSCALL_ERROR
}
