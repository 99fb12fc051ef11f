//! Interrupt line gating
//!
//! `LineGate` tracks which lines have the vm86 handler installed and which
//! handlers are executing. A callback marks itself running before it looks
//! at the attached bit, and `detach` clears the attached bit before it
//! looks at the running bits, so once `detach` returns no callback for
//! the line is inside the IRQ table and none can enter it.

use core::sync::atomic::{AtomicU16, Ordering};

use crate::posix::errno;

pub const NR_LINES: u8 = 16;

pub struct LineGate {
    attached: AtomicU16,
    running: AtomicU16,
}

impl LineGate {
    pub const fn new() -> Self {
        Self {
            attached: AtomicU16::new(0),
            running: AtomicU16::new(0),
        }
    }

    pub fn attach(&self, line: u8) -> Result<(), i32> {
        if line >= NR_LINES {
            return Err(errno::EINVAL);
        }
        let bit = 1u16 << line;
        if self.attached.fetch_or(bit, Ordering::SeqCst) & bit != 0 {
            return Err(errno::EBUSY);
        }
        Ok(())
    }

    /// Clear the attached bit, then wait until no callback for `line` is
    /// running.
    pub fn detach(&self, line: u8) {
        if line >= NR_LINES {
            return;
        }
        let bit = 1u16 << line;
        self.attached.fetch_and(!bit, Ordering::SeqCst);
        while self.running.load(Ordering::SeqCst) & bit != 0 {
            core::hint::spin_loop();
        }
    }

    pub fn is_attached(&self, line: u8) -> bool {
        line < NR_LINES && self.attached.load(Ordering::SeqCst) & (1 << line) != 0
    }

    pub fn is_running(&self, line: u8) -> bool {
        line < NR_LINES && self.running.load(Ordering::SeqCst) & (1 << line) != 0
    }

    /// Callback entry. Returns false (and is already left) when the line
    /// has no handler.
    pub fn enter(&self, line: u8) -> bool {
        if line >= NR_LINES {
            return false;
        }
        let bit = 1u16 << line;
        self.running.fetch_or(bit, Ordering::SeqCst);
        if self.attached.load(Ordering::SeqCst) & bit != 0 {
            return true;
        }
        self.running.fetch_and(!bit, Ordering::SeqCst);
        false
    }

    /// Callback exit; pairs with a successful `enter`.
    pub fn leave(&self, line: u8) {
        if line < NR_LINES {
            self.running.fetch_and(!(1u16 << line), Ordering::SeqCst);
        }
    }
}

impl Default for LineGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Set or clear `line` in the master/slave mask pair.
pub fn update_masks(masks: [u8; 2], line: u8, masked: bool) -> [u8; 2] {
    if line >= NR_LINES {
        return masks;
    }
    let mut masks = masks;
    let chip = (line / 8) as usize;
    let bit = 1u8 << (line % 8);
    if masked {
        masks[chip] |= bit;
    } else {
        masks[chip] &= !bit;
    }
    masks
}
