//! Software interrupt reflection
//!
//! `INT n` in the guest is delivered through the guest's own real-mode
//! interrupt vector table at linear address 0, unless the supervisor asked
//! to see vector `n` itself.

use super::regs::BIOS_SEGMENT;
use super::session::{Emulation, EscalationReason, Session};
use super::stack::{read_linear_u32, SegCursor};

/// DOS services; sub-dispatched by AH through `int21_revectored`.
pub const INT_DOS: u8 = 0x21;

impl<'s, 'a> Session<'s, 'a> {
    /// Reflect vector `n` into the guest, or escalate `SoftInt(n)`.
    pub fn do_int(&mut self, vector: u8) -> Emulation {
        let escalate = Err(EscalationReason::SoftInt(vector));

        if self.regs.cs == BIOS_SEGMENT {
            return escalate;
        }
        if self.int_revectored.is_set(vector) {
            return escalate;
        }
        if vector == INT_DOS && self.int21_revectored.is_set(self.regs.ah()) {
            return escalate;
        }
        let Ok(entry) = read_linear_u32(&*self.ctx.memory, vector as u32 * 4) else {
            return escalate;
        };
        let (handler_ip, handler_cs) = (entry as u16, (entry >> 16) as u16);
        if handler_cs == BIOS_SEGMENT {
            return escalate;
        }

        let flags = self.combine_flags() as u16;
        let mut stack = SegCursor::new(self.regs.ss, self.regs.sp());
        if self.push_frame(&mut stack, flags).is_err() {
            return escalate;
        }

        crate::ktrace!(
            "vm86: int {:#04x} -> {:04x}:{:04x}",
            vector,
            handler_cs,
            handler_ip
        );
        self.regs.set_sp(stack.offset);
        self.regs.cs = handler_cs;
        self.regs.set_ip(handler_ip);
        self.clear_trap_bit();
        self.lower_virtual_if();
        self.clear_alignment_check();
        Ok(())
    }

    /// FLAGS, CS, IP: the real-mode interrupt frame.
    fn push_frame(&mut self, stack: &mut SegCursor, flags: u16) -> Result<(), i32> {
        let memory = &mut *self.ctx.memory;
        stack.push_u16(memory, flags)?;
        stack.push_u16(memory, self.regs.cs)?;
        stack.push_u16(memory, self.regs.ip())
    }
}
