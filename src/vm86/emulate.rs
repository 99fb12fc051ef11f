//! Fault dispatch and instruction emulation
//!
//! The guest runs with IOPL below 3, so every instruction that reads or
//! writes IF (and INT n) raises #GP. `handle_gp_fault` decodes the faulting
//! instruction, applies it to the virtual frame and the flags shadow, and
//! either resumes the guest or escalates. Only this fixed set of opcodes is
//! understood:
//!
//! | opcode | instruction |
//! |--------|-------------|
//! | 9C     | PUSHF / PUSHFD |
//! | 9D     | POPF / POPFD |
//! | CF     | IRET / IRETD |
//! | FA     | CLI |
//! | FB     | STI |
//! | CD ib  | INT imm8 |

use super::flags::{Width, TF_MASK};
use super::session::{Emulation, EscalationReason, Session};
use super::stack::SegCursor;
use crate::signal::{SIGBUS, SIGFPE, SIGILL, SIGSEGV, SIGTRAP};

const PREFIX_DATA32: u8 = 0x66;
const PREFIX_ADDR32: u8 = 0x67;
const PREFIX_ES: u8 = 0x26;
const PREFIX_CS: u8 = 0x2E;
const PREFIX_SS: u8 = 0x36;
const PREFIX_DS: u8 = 0x3E;
const PREFIX_FS: u8 = 0x64;
const PREFIX_GS: u8 = 0x65;
const PREFIX_REPNZ: u8 = 0xF2;
const PREFIX_REP: u8 = 0xF3;

pub const OP_PUSHF: u8 = 0x9C;
pub const OP_POPF: u8 = 0x9D;
pub const OP_INT: u8 = 0xCD;
pub const OP_IRET: u8 = 0xCF;
pub const OP_CLI: u8 = 0xFA;
pub const OP_STI: u8 = 0xFB;

/// Architectural limit; a longer prefix run is not a valid instruction.
const MAX_INSN_LEN: usize = 15;

pub const VECTOR_DEBUG: u8 = 1;
pub const VECTOR_BREAKPOINT: u8 = 3;

/// What became of a trap the monitor was offered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrapOutcome {
    Handled,
    /// Not a vm86 matter; the default fault path applies.
    NotHandled,
}

/// Signal the generic fault path raises for an exception vector.
pub const fn default_signal(vector: u8) -> u32 {
    match vector {
        0 | 16 | 19 => SIGFPE,
        1 | 3 => SIGTRAP,
        6 => SIGILL,
        17 => SIGBUS,
        _ => SIGSEGV,
    }
}

impl<'s, 'a> Session<'s, 'a> {
    /// Emulate the instruction at CS:IP after a #GP.
    pub fn handle_gp_fault(&mut self) -> Emulation {
        let mut code = SegCursor::new(self.regs.cs, self.regs.ip());
        let mut data32 = false;
        let mut length = 0;
        let opcode = loop {
            length += 1;
            if length > MAX_INSN_LEN {
                return Err(EscalationReason::Unknown);
            }
            match self.fetch(&mut code)? {
                PREFIX_DATA32 => data32 = true,
                PREFIX_ADDR32 | PREFIX_ES | PREFIX_CS | PREFIX_SS | PREFIX_DS | PREFIX_FS
                | PREFIX_GS | PREFIX_REPNZ | PREFIX_REP => {}
                opcode => break opcode,
            }
        };
        let width = if data32 { Width::Dword } else { Width::Word };

        match opcode {
            OP_PUSHF => self.emulate_pushf(code.offset, width)?,
            OP_POPF => self.emulate_popf(code.offset, width)?,
            OP_IRET => self.emulate_iret(width)?,
            OP_CLI => {
                self.regs.set_ip(code.offset);
                self.lower_virtual_if();
            }
            OP_STI => {
                self.regs.set_ip(code.offset);
                self.raise_virtual_if()?;
            }
            OP_INT => {
                let vector = self.fetch(&mut code)?;
                self.regs.set_ip(code.offset);
                if self.vm86plus && self.plus.debug_active && self.plus.debug_intxx.is_set(vector) {
                    return Err(EscalationReason::SoftInt(vector));
                }
                self.do_int(vector)?;
            }
            _ => return Err(EscalationReason::Unknown),
        }
        self.fault_return()
    }

    /// Offer an exception (other than #GP and #PF) raised in vm86 mode.
    pub fn handle_trap(&mut self, vector: u8) -> Result<TrapOutcome, EscalationReason> {
        if self.vm86plus && self.plus.debug_active {
            if vector == VECTOR_DEBUG || vector == VECTOR_BREAKPOINT {
                return Err(EscalationReason::Trap(vector));
            }
            self.do_int(vector)?;
            return Ok(TrapOutcome::Handled);
        }
        if vector != VECTOR_DEBUG {
            return Ok(TrapOutcome::NotHandled);
        }
        // A debugger may have blocked SIGTRAP; the step must still reach it.
        self.ctx.host.unblock_signal(SIGTRAP);
        Err(EscalationReason::DebugStep)
    }

    /// Exceptions the monitor declines get their default signal.
    pub(super) fn handle_exception(&mut self, vector: u8) -> Emulation {
        match self.handle_trap(vector)? {
            TrapOutcome::Handled => Ok(()),
            TrapOutcome::NotHandled => {
                self.ctx.host.force_signal(default_signal(vector));
                Err(EscalationReason::Signal)
            }
        }
    }

    /// Unresolved page fault. Writes into the protected display window are
    /// tracked in the screen bitmap; anything else is a SIGSEGV.
    pub fn handle_page_fault(&mut self, address: u32, write: bool) -> Emulation {
        use super::config::{ScreenWritePolicy, PAGE_SIZE};

        let page = if write && self.screen_protected {
            self.ctx.config.window_page(address)
        } else {
            None
        };
        let Some(page) = page else {
            crate::kdebug!(
                "vm86: tid {} faulted at {:#x} (write={})",
                self.ctx.thread.tid(),
                address,
                write
            );
            self.ctx.host.force_signal(SIGSEGV);
            return Err(EscalationReason::Signal);
        };

        self.ctx.thread.screen_bitmap |= 1 << page;
        let page_base = self.ctx.config.window_base + page as u32 * PAGE_SIZE;
        self.ctx.host.unprotect_page(page_base);

        match self.ctx.config.screen_policy {
            ScreenWritePolicy::Track => Ok(()),
            ScreenWritePolicy::EscalateIfPending if !self.interrupt_pending() => Ok(()),
            _ => Err(EscalationReason::ScreenWrite(page)),
        }
    }

    fn emulate_pushf(&mut self, next_ip: u16, width: Width) -> Emulation {
        let flags = self.combine_flags();
        let mut stack = SegCursor::new(self.regs.ss, self.regs.sp());
        let pushed = match width {
            Width::Word => stack.push_u16(&mut *self.ctx.memory, flags as u16),
            Width::Dword => stack.push_u32(&mut *self.ctx.memory, flags),
        };
        pushed.map_err(|_| EscalationReason::Unknown)?;
        self.regs.set_sp(stack.offset);
        self.regs.set_ip(next_ip);
        Ok(())
    }

    fn emulate_popf(&mut self, next_ip: u16, width: Width) -> Emulation {
        let mut stack = SegCursor::new(self.regs.ss, self.regs.sp());
        let flags = self.pop(&mut stack, width)?;
        self.regs.set_sp(stack.offset);
        self.regs.set_ip(next_ip);
        let flags = self.trace_flags(flags);
        self.apply_flags(flags, width)
    }

    fn emulate_iret(&mut self, width: Width) -> Emulation {
        let mut stack = SegCursor::new(self.regs.ss, self.regs.sp());
        let ip = self.pop(&mut stack, width)?;
        let cs = self.pop(&mut stack, width)?;
        let flags = self.pop(&mut stack, width)?;
        self.regs.set_sp(stack.offset);
        self.regs.set_ip(ip as u16);
        self.regs.cs = cs as u16;
        let flags = self.trace_flags(flags);
        self.apply_flags(flags, width)
    }

    /// A single-stepping debugger keeps TF set across POPF and IRET.
    fn trace_flags(&self, flags: u32) -> u32 {
        if self.plus.debug_active && self.plus.debug_tf_pending {
            flags | TF_MASK
        } else {
            flags
        }
    }

    /// Supervisor asked to get control whenever the guest could take an
    /// interrupt.
    fn fault_return(&self) -> Emulation {
        use super::flags::{IF_MASK, VIF_MASK};

        if self.plus.force_return_for_pic && self.vflags().bits() & (IF_MASK | VIF_MASK) != 0 {
            return Err(EscalationReason::PicReturn);
        }
        Ok(())
    }

    fn fetch(&self, code: &mut SegCursor) -> Result<u8, EscalationReason> {
        code.fetch_u8(&*self.ctx.memory).map_err(|_| EscalationReason::Unknown)
    }

    fn pop(&self, stack: &mut SegCursor, width: Width) -> Result<u32, EscalationReason> {
        let value = match width {
            Width::Word => stack.pop_u16(&*self.ctx.memory).map(u32::from),
            Width::Dword => stack.pop_u32(&*self.ctx.memory),
        };
        value.map_err(|_| EscalationReason::Unknown)
    }
}
