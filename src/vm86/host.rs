//! Interfaces to the rest of the kernel
//!
//! The monitor never touches page tables, the scheduler or the interrupt
//! controller directly. Everything it needs from outside goes through the
//! traits below so the same code runs under the kernel and under the
//! hardware mocks of the test crate.

use super::regs::{Vm86Entry, Vm86Regs};

/// Thread identifier (same numbering as the scheduler's PIDs).
pub type Tid = u64;

/// Byte access to the guest's real-mode address space (the low 1 MiB plus
/// the HMA of the calling process). Errors are errno values.
pub trait GuestMemory {
    fn read_u8(&self, linear: u32) -> Result<u8, i32>;
    fn write_u8(&mut self, linear: u32, value: u8) -> Result<(), i32>;
}

/// Why the guest stopped running.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GuestEvent {
    /// #GP on a sensitive instruction (PUSHF, POPF, IRET, CLI, STI, INT n, ...).
    GeneralProtection,
    /// Any other exception, e.g. #DB (1) or #BP (3).
    Exception { vector: u8, error_code: u32 },
    /// Page fault the memory manager could not resolve on its own.
    PageFault { address: u32, write: bool },
    /// A host signal became pending for this thread.
    SignalPending,
}

/// Runs guest code until the next event. The frame is updated with the
/// guest state at the faulting instruction.
pub trait GuestCpu {
    fn run(&mut self, regs: &mut Vm86Regs) -> GuestEvent;
}

/// Which syscall form supplied the entry structure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    /// `vm86old`: plain vm86 structure.
    Legacy,
    /// `vm86(VM86_ENTER*)`: structure with the vm86plus extension.
    Plus,
}

/// Per-thread kernel services used by entry and exit.
pub trait Vm86Host {
    /// Ring-0 stack pointer currently loaded for this thread.
    fn kernel_stack(&self) -> u64;
    fn set_kernel_stack(&mut self, sp0: u64);

    /// copy_from_user of the entry structure at `addr`.
    fn read_entry(&self, addr: u32, kind: EntryKind) -> Result<Vm86Entry, i32>;
    /// copy_to_user of the final frame and screen bitmap into the control
    /// block at `addr`.
    fn write_control_block(
        &mut self,
        addr: u32,
        regs: &Vm86Regs,
        screen_bitmap: u32,
    ) -> Result<(), i32>;

    /// Write-protect `[base, base + len)` in the caller's address space.
    fn protect_display_window(&mut self, base: u32, len: u32);
    /// Make one page of the display window writable again.
    fn unprotect_page(&mut self, address: u32);

    /// Queue `signal` on the current thread, bypassing its blocked mask.
    fn force_signal(&mut self, signal: u32);
    /// Remove `signal` from the current thread's blocked mask.
    fn unblock_signal(&mut self, signal: u32);

    /// Terminate the current thread as if killed by `signal`. Used when
    /// vm86 state can no longer be handed back to the supervisor.
    fn exit_thread(&mut self, signal: u32);
}

/// Process table queries. Must be callable from interrupt context.
pub trait TaskOps {
    fn current(&self) -> Tid;
    fn is_alive(&self, tid: Tid) -> bool;
    /// CAP_SYS_ADMIN (root) check for the current thread.
    fn capable_sys_admin(&self) -> bool;
    fn send_signal(&self, tid: Tid, signal: u32);
}

/// Result of a hardware interrupt callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IrqReturn {
    None,
    Handled,
}

/// Interrupt-controller line management.
pub trait IrqLines {
    /// Install the vm86 handler on `line`.
    fn attach(&self, line: u8) -> Result<(), i32>;
    /// Remove the handler; returns once no callback for `line` is running.
    fn detach(&self, line: u8);
    /// Mask `line` without waiting for running callbacks.
    fn disable_nosync(&self, line: u8);
    fn enable(&self, line: u8);
}
