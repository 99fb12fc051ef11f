//! vm86 mode entry and exit
//!
//! `enter` is the body of the vm86 system calls. It switches the calling
//! thread into vm86 mode and does not come back until the guest leaves
//! it again: the run loop hands the guest to the CPU, dispatches every
//! fault to the emulator, and returns the encoded `EscalationReason` once
//! the emulator asks for the supervisor.
//!
//! A thread has at most one session. The saved ring-0 stack pointer in
//! `Vm86Thread` doubles as the "session active" marker, exactly as the
//! exit path uses it to get back to the supervisor.

use super::config::{self, Vm86Config};
use super::flags::{self, CpuTier, VirtualFlags, Width, AC_MASK, TF_MASK};
use super::host::{GuestCpu, GuestEvent, GuestMemory, IrqLines, TaskOps, Tid, Vm86Host};
use super::irq::IrqTable;
use super::regs::{RevectorBitmap, Vm86Entry, Vm86PlusInfo, Vm86Regs};
use super::Vm86Error;

/// Result codes handed to the supervisor (low byte of the return value).
pub const VM86_SIGNAL: u32 = 0;
pub const VM86_UNKNOWN: u32 = 1;
pub const VM86_INTX: u32 = 2;
pub const VM86_STI: u32 = 3;
pub const VM86_PICRETURN: u32 = 4;
pub const VM86_SCREEN: u32 = 5;
pub const VM86_TRAP: u32 = 6;

/// Why control went back to the supervisor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EscalationReason {
    /// A host signal is pending for the thread.
    Signal,
    /// Instruction the monitor does not emulate (or a fault while decoding it).
    Unknown,
    /// `INT n` that must be handled by the supervisor.
    SoftInt(u8),
    /// The guest enabled interrupts while one was pending.
    Sti,
    /// Interrupts are enabled and the supervisor asked to inject PIC events.
    PicReturn,
    /// Write to the given page of the protected display window.
    ScreenWrite(u8),
    /// Debugger trap (vector 1 or 3) in a vm86plus session.
    Trap(u8),
    /// Single-step trap outside vm86plus.
    DebugStep,
}

impl EscalationReason {
    /// `type | (argument << 8)`
    pub const fn code(self) -> u32 {
        match self {
            EscalationReason::Signal => VM86_SIGNAL,
            EscalationReason::Unknown => VM86_UNKNOWN,
            EscalationReason::SoftInt(vector) => VM86_INTX | (vector as u32) << 8,
            EscalationReason::Sti => VM86_STI,
            EscalationReason::PicReturn => VM86_PICRETURN,
            EscalationReason::ScreenWrite(page) => VM86_SCREEN | (page as u32) << 8,
            EscalationReason::Trap(vector) => VM86_TRAP | (vector as u32) << 8,
            EscalationReason::DebugStep => VM86_TRAP | 1 << 8,
        }
    }
}

/// Outcome of one emulation step: `Ok` resumes the guest, `Err` leaves vm86
/// mode with the given reason.
pub type Emulation = Result<(), EscalationReason>;

/// Per-thread vm86 state. Lives as long as the thread.
#[derive(Clone, Copy, Debug)]
pub struct Vm86Thread {
    tid: Tid,
    pub(super) vflags: VirtualFlags,
    saved_sp0: Option<u64>,
    control_block: Option<u32>,
    pub(super) screen_bitmap: u32,
}

impl Vm86Thread {
    pub const fn new(tid: Tid) -> Self {
        Self {
            tid,
            vflags: VirtualFlags::new(0, CpuTier::I286),
            saved_sp0: None,
            control_block: None,
            screen_bitmap: 0,
        }
    }

    pub const fn tid(&self) -> Tid {
        self.tid
    }

    pub const fn session_active(&self) -> bool {
        self.saved_sp0.is_some()
    }

    pub const fn vflags(&self) -> &VirtualFlags {
        &self.vflags
    }

    pub const fn screen_bitmap(&self) -> u32 {
        self.screen_bitmap
    }
}

/// Everything a vm86 system call runs against.
pub struct Vm86Context<'a> {
    pub thread: &'a mut Vm86Thread,
    pub host: &'a mut dyn Vm86Host,
    pub cpu: &'a mut dyn GuestCpu,
    pub memory: &'a mut dyn GuestMemory,
    pub tasks: &'a dyn TaskOps,
    pub lines: &'a dyn IrqLines,
    pub irqs: &'a IrqTable,
    pub config: Vm86Config,
}

impl<'a> Vm86Context<'a> {
    /// Context for a system call, running under the boot-time configuration.
    pub fn new(
        thread: &'a mut Vm86Thread,
        host: &'a mut dyn Vm86Host,
        cpu: &'a mut dyn GuestCpu,
        memory: &'a mut dyn GuestMemory,
        tasks: &'a dyn TaskOps,
        lines: &'a dyn IrqLines,
        irqs: &'a IrqTable,
    ) -> Self {
        Self {
            thread,
            host,
            cpu,
            memory,
            tasks,
            lines,
            irqs,
            config: config::config(),
        }
    }
}

/// A running vm86 session.
pub struct Session<'s, 'a> {
    pub(super) ctx: &'s mut Vm86Context<'a>,
    pub(super) regs: Vm86Regs,
    pub(super) int_revectored: RevectorBitmap,
    pub(super) int21_revectored: RevectorBitmap,
    pub(super) plus: Vm86PlusInfo,
    pub(super) vm86plus: bool,
    pub(super) screen_protected: bool,
}

/// Enter vm86 mode and run the guest until it leaves again.
///
/// Returns the encoded reason, which becomes the supervisor's syscall
/// return value.
pub fn enter(
    ctx: &mut Vm86Context<'_>,
    entry: &Vm86Entry,
    control_block: u32,
    caller_eflags: u32,
) -> Result<u32, Vm86Error> {
    Session::begin(ctx, entry, control_block, caller_eflags)?.run()
}

impl<'s, 'a> Session<'s, 'a> {
    /// Entry half of `enter`: set up the thread state and the guest frame
    /// without running the guest.
    pub fn begin(
        ctx: &'s mut Vm86Context<'a>,
        entry: &Vm86Entry,
        control_block: u32,
        caller_eflags: u32,
    ) -> Result<Self, Vm86Error> {
        if ctx.thread.session_active() {
            crate::kwarn!("vm86: tid {} is already in vm86 mode", ctx.thread.tid);
            return Err(Vm86Error::Permission);
        }

        let tier = CpuTier::from_cpu_type(entry.cpu_type);
        let mut regs = entry.regs;
        ctx.thread.vflags = VirtualFlags::new(regs.eflags, tier);
        regs.eflags = flags::entry_frame_flags(regs.eflags, caller_eflags);

        ctx.thread.saved_sp0 = Some(ctx.host.kernel_stack());
        ctx.thread.control_block = Some(control_block);
        ctx.thread.screen_bitmap = entry.screen_bitmap;

        let screen_protected = entry.wants_screen_bitmap();
        if screen_protected {
            let window_len = ctx.config.window_len();
            ctx.host.protect_display_window(ctx.config.window_base, window_len);
        }

        crate::kdebug!(
            "vm86: tid {} enters vm86 mode at {:04x}:{:04x} (cpu type {}, plus={})",
            ctx.thread.tid,
            regs.cs,
            regs.ip(),
            entry.cpu_type,
            entry.is_vm86plus()
        );

        Ok(Self {
            ctx,
            regs,
            int_revectored: entry.int_revectored,
            int21_revectored: entry.int21_revectored,
            plus: entry.plus.unwrap_or_default(),
            vm86plus: entry.is_vm86plus(),
            screen_protected,
        })
    }

    /// Run the guest until an escalation, then leave vm86 mode.
    pub fn run(mut self) -> Result<u32, Vm86Error> {
        loop {
            let event = self.ctx.cpu.run(&mut self.regs);
            let step = match event {
                GuestEvent::GeneralProtection => self.handle_gp_fault(),
                GuestEvent::Exception { vector, .. } => self.handle_exception(vector),
                GuestEvent::PageFault { address, write } => self.handle_page_fault(address, write),
                GuestEvent::SignalPending => Err(EscalationReason::Signal),
            };
            if let Err(reason) = step {
                return self.exit(reason);
            }
        }
    }

    /// Leave vm86 mode: publish the frame to the supervisor's control block
    /// and restore the host stack.
    ///
    /// Losing the control block is fatal; the thread keeps its session
    /// marker and must be terminated by the caller.
    pub fn exit(mut self, reason: EscalationReason) -> Result<u32, Vm86Error> {
        let thread = &mut *self.ctx.thread;
        self.regs.eflags = thread.vflags.merge_for_exit(self.regs.eflags);

        let Some(control_block) = thread.control_block else {
            crate::kfatal!("vm86: tid {} has no vm86 control block", thread.tid);
            return Err(Vm86Error::ControlBlockLost);
        };
        if let Err(errno) =
            self.ctx
                .host
                .write_control_block(control_block, &self.regs, thread.screen_bitmap)
        {
            crate::kfatal!(
                "vm86: tid {} could not write control block at {:#x} (errno {})",
                thread.tid,
                control_block,
                errno
            );
            return Err(Vm86Error::ControlBlockLost);
        }

        if let Some(sp0) = thread.saved_sp0.take() {
            self.ctx.host.set_kernel_stack(sp0);
        }

        crate::kdebug!(
            "vm86: tid {} leaves vm86 mode at {:04x}:{:04x}: {:?}",
            thread.tid,
            self.regs.cs,
            self.regs.ip(),
            reason
        );
        Ok(reason.code())
    }

    pub fn regs(&self) -> &Vm86Regs {
        &self.regs
    }

    pub fn regs_mut(&mut self) -> &mut Vm86Regs {
        &mut self.regs
    }

    pub fn vflags(&self) -> &VirtualFlags {
        &self.ctx.thread.vflags
    }

    // =========================================================================
    // Flag virtualization
    // =========================================================================

    /// Flags as the guest sees them.
    pub fn combine_flags(&self) -> u32 {
        self.ctx.thread.vflags.combine(self.regs.eflags)
    }

    /// Guest wrote `value` to its flags register.
    pub fn apply_flags(&mut self, value: u32, width: Width) -> Emulation {
        let interrupts_on = self
            .ctx
            .thread
            .vflags
            .apply(&mut self.regs.eflags, value, width);
        if interrupts_on {
            self.raise_virtual_if()
        } else {
            self.lower_virtual_if();
            Ok(())
        }
    }

    /// Guest enabled interrupts. Leaves for the supervisor right away if
    /// one is waiting.
    pub fn raise_virtual_if(&mut self) -> Emulation {
        self.ctx.thread.vflags.set_vif();
        if self.interrupt_pending() {
            return Err(EscalationReason::Sti);
        }
        Ok(())
    }

    pub fn lower_virtual_if(&mut self) {
        self.ctx.thread.vflags.clear_vif();
    }

    pub fn clear_trap_bit(&mut self) {
        self.regs.eflags &= !TF_MASK;
    }

    pub fn clear_alignment_check(&mut self) {
        self.regs.eflags &= !AC_MASK;
    }

    /// VIP set by the supervisor, or a passed-through IRQ of this thread
    /// latched and not yet consumed.
    pub fn interrupt_pending(&self) -> bool {
        self.ctx.thread.vflags.vip() || self.ctx.irqs.pending_owned_by(self.ctx.thread.tid) != 0
    }
}
