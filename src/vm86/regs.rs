//! vm86 register frame and entry structures
//!
//! `Vm86Regs` is the guest-visible register block. It is handed in by the
//! supervisor at entry, mutated in place by the emulator, and copied back
//! into the supervisor's control block at exit.

/// Real-mode segment of the system BIOS. Code running there, or interrupt
/// vectors pointing there, are never reflected inside the monitor.
pub const BIOS_SEGMENT: u16 = 0xF000;

/// `Vm86Entry::flags` bit requesting write protection of the display window.
pub const VM86_SCREEN_BITMAP: u32 = 0x0001;

/// Guest register frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(C)]
pub struct Vm86Regs {
    pub ebx: u32,
    pub ecx: u32,
    pub edx: u32,
    pub esi: u32,
    pub edi: u32,
    pub ebp: u32,
    pub eax: u32,
    pub eip: u32,
    pub cs: u16,
    pub eflags: u32,
    pub esp: u32,
    pub ss: u16,
    pub es: u16,
    pub ds: u16,
    pub fs: u16,
    pub gs: u16,
}

impl Vm86Regs {
    /// 16-bit instruction pointer.
    pub fn ip(&self) -> u16 {
        self.eip as u16
    }

    /// Replace the low word of EIP, leaving the high word untouched.
    pub fn set_ip(&mut self, ip: u16) {
        self.eip = (self.eip & 0xFFFF_0000) | ip as u32;
    }

    /// 16-bit stack pointer.
    pub fn sp(&self) -> u16 {
        self.esp as u16
    }

    /// Replace the low word of ESP, leaving the high word untouched.
    pub fn set_sp(&mut self, sp: u16) {
        self.esp = (self.esp & 0xFFFF_0000) | sp as u32;
    }

    pub fn ah(&self) -> u8 {
        (self.eax >> 8) as u8
    }

    /// Linear address of CS:IP.
    pub fn code_linear(&self) -> u32 {
        linear(self.cs, self.ip())
    }

    /// Linear address of SS:SP.
    pub fn stack_linear(&self) -> u32 {
        linear(self.ss, self.sp())
    }
}

/// Real-mode segment:offset translation.
pub const fn linear(segment: u16, offset: u16) -> u32 {
    ((segment as u32) << 4) + offset as u32
}

/// 256-bit set indexed by interrupt vector (or by AH for INT 21h).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(C)]
pub struct RevectorBitmap {
    bits: [u32; 8],
}

impl RevectorBitmap {
    pub const fn empty() -> Self {
        Self { bits: [0; 8] }
    }

    pub const fn from_words(bits: [u32; 8]) -> Self {
        Self { bits }
    }

    pub fn is_set(&self, index: u8) -> bool {
        self.bits[(index >> 5) as usize] & (1 << (index & 31)) != 0
    }

    pub fn set(&mut self, index: u8) {
        self.bits[(index >> 5) as usize] |= 1 << (index & 31);
    }

    pub fn clear(&mut self, index: u8) {
        self.bits[(index >> 5) as usize] &= !(1 << (index & 31));
    }

    pub fn words(&self) -> &[u32; 8] {
        &self.bits
    }
}

/// Extension block carried by the newer entry form.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Vm86PlusInfo {
    /// Leave the guest after any emulated instruction while interrupts are
    /// (virtually) enabled, so the supervisor can inject a PIC interrupt.
    pub force_return_for_pic: bool,
    /// A DOS debugger is attached to the guest.
    pub debug_active: bool,
    /// The debugger single-steps; popped flags keep TF set.
    pub debug_tf_pending: bool,
    /// INT xx vectors the debugger wants to see before they are reflected.
    pub debug_intxx: RevectorBitmap,
}

/// Structure supplied by the supervisor when entering vm86 mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Vm86Entry {
    pub regs: Vm86Regs,
    pub flags: u32,
    pub screen_bitmap: u32,
    pub cpu_type: u32,
    pub int_revectored: RevectorBitmap,
    pub int21_revectored: RevectorBitmap,
    /// Present only for the newer entry form.
    pub plus: Option<Vm86PlusInfo>,
}

impl Vm86Entry {
    pub fn wants_screen_bitmap(&self) -> bool {
        self.flags & VM86_SCREEN_BITMAP != 0
    }

    pub fn is_vm86plus(&self) -> bool {
        self.plus.is_some()
    }
}
