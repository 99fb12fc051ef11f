//! Flag virtualization
//!
//! A vm86 guest must never change host-wide state through EFLAGS. The
//! monitor therefore keeps two views of the flags register:
//!
//! - the frame flags (`Vm86Regs::eflags`), of which the guest may only touch
//!   the arithmetic bits plus TF and DF (`SAFE_MASK`)
//! - the per-thread shadow (`VirtualFlags`), which records the guest's IF
//!   as VIF and holds every bit the CPU tier declares as virtualized
//!
//! Which bits are virtualized depends only on the declared CPU tier and is
//! decided in `CpuTier::virtualized_mask`.

use x86_64::registers::rflags::RFlags;

pub const TF_MASK: u32 = RFlags::TRAP_FLAG.bits() as u32;
pub const IF_MASK: u32 = RFlags::INTERRUPT_FLAG.bits() as u32;
pub const IOPL_MASK: u32 = (RFlags::IOPL_HIGH.bits() | RFlags::IOPL_LOW.bits()) as u32;
pub const NT_MASK: u32 = RFlags::NESTED_TASK.bits() as u32;
pub const VM_MASK: u32 = RFlags::VIRTUAL_8086_MODE.bits() as u32;
pub const AC_MASK: u32 = RFlags::ALIGNMENT_CHECK.bits() as u32;
pub const VIF_MASK: u32 = RFlags::VIRTUAL_INTERRUPT.bits() as u32;
pub const VIP_MASK: u32 = RFlags::VIRTUAL_INTERRUPT_PENDING.bits() as u32;
pub const ID_MASK: u32 = RFlags::ID.bits() as u32;

/// Frame bits the guest controls directly: CF PF AF ZF SF TF DF OF.
pub const SAFE_MASK: u32 = (RFlags::CARRY_FLAG.bits()
    | RFlags::PARITY_FLAG.bits()
    | RFlags::AUXILIARY_CARRY_FLAG.bits()
    | RFlags::ZERO_FLAG.bits()
    | RFlags::SIGN_FLAG.bits()
    | RFlags::TRAP_FLAG.bits()
    | RFlags::DIRECTION_FLAG.bits()
    | RFlags::OVERFLOW_FLAG.bits()) as u32;

/// Frame bits reported back to the guest: `SAFE_MASK` plus the fixed
/// reserved bits 1, 3 and 5.
pub const RETURN_MASK: u32 = SAFE_MASK | 0x2A;

/// CPU generation declared by the supervisor at entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CpuTier {
    I286,
    I386,
    I486,
    /// 8086/186, Pentium and anything newer or unknown.
    Other(u32),
}

impl CpuTier {
    pub const CPU_086: u32 = 0;
    pub const CPU_186: u32 = 1;
    pub const CPU_286: u32 = 2;
    pub const CPU_386: u32 = 3;
    pub const CPU_486: u32 = 4;
    pub const CPU_586: u32 = 5;

    pub const fn from_cpu_type(cpu_type: u32) -> Self {
        match cpu_type {
            Self::CPU_286 => CpuTier::I286,
            Self::CPU_386 => CpuTier::I386,
            Self::CPU_486 => CpuTier::I486,
            other => CpuTier::Other(other),
        }
    }

    /// Flag bits whose guest-visible value lives in the shadow.
    pub const fn virtualized_mask(self) -> u32 {
        match self {
            CpuTier::I286 => 0,
            CpuTier::I386 => NT_MASK | IOPL_MASK,
            CpuTier::I486 => AC_MASK | NT_MASK | IOPL_MASK,
            CpuTier::Other(_) => ID_MASK | AC_MASK | NT_MASK | IOPL_MASK,
        }
    }
}

/// Operand width of a flags transfer (PUSHF/POPF/IRET with or without 0x66).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Width {
    Word,
    Dword,
}

impl Width {
    pub const fn bytes(self) -> u16 {
        match self {
            Width::Word => 2,
            Width::Dword => 4,
        }
    }
}

/// `(dst & !mask) | (src & mask)`
#[inline]
pub const fn set_flags(dst: u32, src: u32, mask: u32) -> u32 {
    (dst & !mask) | (src & mask)
}

/// Virtual flags shadow of one thread.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VirtualFlags {
    bits: u32,
    mask: u32,
}

impl VirtualFlags {
    pub const fn new(initial: u32, tier: CpuTier) -> Self {
        Self {
            bits: initial,
            mask: tier.virtualized_mask(),
        }
    }

    pub const fn bits(&self) -> u32 {
        self.bits
    }

    pub const fn mask(&self) -> u32 {
        self.mask
    }

    pub const fn vif(&self) -> bool {
        self.bits & VIF_MASK != 0
    }

    pub const fn vip(&self) -> bool {
        self.bits & VIP_MASK != 0
    }

    pub fn set_vif(&mut self) {
        self.bits |= VIF_MASK;
    }

    pub fn clear_vif(&mut self) {
        self.bits &= !VIF_MASK;
    }

    /// Flags value the guest observes for the given frame flags.
    ///
    /// IOPL always reads as 3 so that real-mode code testing for a 286
    /// sees the bits it expects; tiers that virtualize IOPL override it
    /// with the shadow.
    pub const fn combine(&self, frame_flags: u32) -> u32 {
        let mut flags = frame_flags & RETURN_MASK;
        if self.vif() {
            flags |= IF_MASK;
        }
        flags |= IOPL_MASK;
        flags | (self.bits & self.mask)
    }

    /// Split a guest-written flags value between the shadow and the frame.
    ///
    /// Returns the guest's requested IF; the caller turns that into a
    /// raise or lower of VIF, since raising may end the session.
    pub fn apply(&mut self, frame_flags: &mut u32, new_flags: u32, width: Width) -> bool {
        let (value, mask) = match width {
            Width::Word => (new_flags & 0xFFFF, self.mask & 0xFFFF),
            Width::Dword => (new_flags, self.mask),
        };
        self.bits = set_flags(self.bits, value, mask);
        *frame_flags = set_flags(*frame_flags, value, SAFE_MASK);
        value & IF_MASK != 0
    }

    /// Frame flags as reported to the supervisor at exit: VIF and the
    /// virtualized bits come from the shadow.
    pub const fn merge_for_exit(&self, frame_flags: u32) -> u32 {
        set_flags(frame_flags, self.bits, VIF_MASK | self.mask)
    }
}

/// Frame flags a session starts with: the guest's safe bits, the caller's
/// real bits everywhere else, and VM forced on.
pub const fn entry_frame_flags(guest_flags: u32, caller_flags: u32) -> u32 {
    (guest_flags & SAFE_MASK) | (caller_flags & !SAFE_MASK) | VM_MASK
}
