//! Signal numbers the vm86 monitor raises or accepts

pub const SIGILL: u32 = 4;
pub const SIGTRAP: u32 = 5;
pub const SIGBUS: u32 = 7;
pub const SIGFPE: u32 = 8;
pub const SIGUSR1: u32 = 10;
pub const SIGSEGV: u32 = 11;
pub const SIGUSR2: u32 = 12;
pub const SIGURG: u32 = 23;
pub const SIGIO: u32 = 29;
/// Historical alias of SIGSYS; still accepted for IRQ notification.
pub const SIGUNUSED: u32 = 31;
