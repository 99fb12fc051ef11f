//! Virtual-8086 mode monitor
//!
//! Lets a thread run unmodified real-mode code (DOS programs, video BIOS
//! calls) under a supervising user process. The guest runs with IOPL below
//! 3; every instruction that would touch the real interrupt flag traps and
//! is emulated here against a per-thread virtual flags shadow. Whatever the
//! monitor does not handle itself is handed back to the supervisor as an
//! `EscalationReason`.
//!
//! Module layout:
//!
//! - `flags`: virtual flags shadow and CPU tier masks
//! - `session`: entry, run loop and exit
//! - `emulate`: #GP decoding, traps and page faults
//! - `softint`: reflection of `INT n` through the guest IVT
//! - `irq`: hardware IRQ ownership for vm86 processes
//! - `lines`: attach/run gating of interrupt lines and PIC mask updates
//! - `syscall`: `vm86old` / `vm86` entry points
//! - `hw`: 8259 PIC backing for `irq` (kernel builds only)

pub mod config;
pub mod emulate;
pub mod flags;
pub mod host;
#[cfg(target_os = "none")]
pub mod hw;
pub mod irq;
pub mod lines;
pub mod regs;
pub mod session;
pub mod softint;
pub mod stack;
pub mod syscall;

pub use config::{ScreenWritePolicy, Vm86Config};
pub use flags::{CpuTier, VirtualFlags, Width};
pub use host::{
    EntryKind, GuestCpu, GuestEvent, GuestMemory, IrqLines, IrqReturn, TaskOps, Tid, Vm86Host,
};
pub use irq::{IrqTable, VM86_IRQS};
pub use regs::{RevectorBitmap, Vm86Entry, Vm86PlusInfo, Vm86Regs};
pub use session::{enter, Emulation, EscalationReason, Session, Vm86Context, Vm86Thread};

use crate::posix::errno;

/// Failures of the vm86 system calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vm86Error {
    /// Nested entry, missing capability, or an IRQ request that is not
    /// allowed.
    Permission,
    /// The entry structure could not be read.
    Fault,
    /// Unknown subfunction.
    Invalid,
    /// The interrupt controller refused the line.
    Irq(i32),
    /// The final state could not be written back; the thread must die.
    ControlBlockLost,
}

impl Vm86Error {
    pub const fn errno(self) -> i32 {
        match self {
            Vm86Error::Permission => errno::EPERM,
            Vm86Error::Fault | Vm86Error::ControlBlockLost => errno::EFAULT,
            Vm86Error::Invalid => errno::EINVAL,
            Vm86Error::Irq(code) => code,
        }
    }
}

/// Thread teardown: give back every IRQ line the thread still owns.
pub fn on_thread_exit(tid: Tid, irqs: &IrqTable, lines: &dyn IrqLines) {
    irqs.release_owned_by(tid, lines);
}
