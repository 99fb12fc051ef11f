//! Segmented guest memory access
//!
//! Real-mode offsets wrap at 64 KiB inside their segment, so a push at
//! SP=0 lands at SS:FFFF, not below the segment base. All accesses go
//! through `SegCursor` one byte at a time for that reason.

use super::host::GuestMemory;
use super::regs::linear;

/// Segment:offset pointer with 16-bit offset arithmetic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SegCursor {
    pub segment: u16,
    pub offset: u16,
}

impl SegCursor {
    pub const fn new(segment: u16, offset: u16) -> Self {
        Self { segment, offset }
    }

    fn addr(&self) -> u32 {
        linear(self.segment, self.offset)
    }

    /// Read the byte at the cursor and advance (instruction fetch order).
    pub fn fetch_u8(&mut self, mem: &dyn GuestMemory) -> Result<u8, i32> {
        let value = mem.read_u8(self.addr())?;
        self.offset = self.offset.wrapping_add(1);
        Ok(value)
    }

    pub fn push_u8(&mut self, mem: &mut dyn GuestMemory, value: u8) -> Result<(), i32> {
        self.offset = self.offset.wrapping_sub(1);
        mem.write_u8(self.addr(), value)
    }

    pub fn push_u16(&mut self, mem: &mut dyn GuestMemory, value: u16) -> Result<(), i32> {
        self.push_u8(mem, (value >> 8) as u8)?;
        self.push_u8(mem, value as u8)
    }

    pub fn push_u32(&mut self, mem: &mut dyn GuestMemory, value: u32) -> Result<(), i32> {
        self.push_u16(mem, (value >> 16) as u16)?;
        self.push_u16(mem, value as u16)
    }

    pub fn pop_u8(&mut self, mem: &dyn GuestMemory) -> Result<u8, i32> {
        self.fetch_u8(mem)
    }

    pub fn pop_u16(&mut self, mem: &dyn GuestMemory) -> Result<u16, i32> {
        let lo = self.pop_u8(mem)? as u16;
        let hi = self.pop_u8(mem)? as u16;
        Ok(lo | (hi << 8))
    }

    pub fn pop_u32(&mut self, mem: &dyn GuestMemory) -> Result<u32, i32> {
        let lo = self.pop_u16(mem)? as u32;
        let hi = self.pop_u16(mem)? as u32;
        Ok(lo | (hi << 16))
    }
}

/// Read a little-endian dword at a flat linear address (IVT lookups).
pub fn read_linear_u32(mem: &dyn GuestMemory, addr: u32) -> Result<u32, i32> {
    let mut value = 0u32;
    for i in 0..4 {
        value |= (mem.read_u8(addr.wrapping_add(i))? as u32) << (8 * i);
    }
    Ok(value)
}
