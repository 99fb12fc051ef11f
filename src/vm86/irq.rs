//! vm86 IRQ passing
//!
//! A privileged vm86 process can take ownership of a hardware interrupt
//! line so that its real-mode drivers see the device. When the line fires
//! the monitor latches it in a shared pending mask, optionally signals the
//! owner, and masks the line until the owner consumes the event with
//! `get_and_reset`.
//!
//! ## Locking
//!
//! The hardware callback may run on any CPU at any time, so it never takes
//! a lock: slot owner, slot signal and the pending mask are atomics.
//! Thread-context mutators (`request`, `free`, reaping) serialize on
//! `update`. A slot's owner is published before its handler is attached
//! (and withdrawn if the attach fails) and is cleared only after the
//! handler is detached, so a callback never sees a half-set slot.

use core::sync::atomic::{AtomicU16, AtomicU32, AtomicU64, Ordering};

use lazy_static::lazy_static;
use spin::Mutex;

use super::host::{IrqLines, IrqReturn, TaskOps, Tid};
use super::Vm86Error;
use crate::signal::{SIGIO, SIGUNUSED, SIGURG, SIGUSR1, SIGUSR2};

/// Lines 0-2 (timer, keyboard, cascade) are never handed out.
pub const FIRST_VM86_IRQ: u8 = 3;
pub const LAST_VM86_IRQ: u8 = 15;
pub const NR_IRQ_SLOTS: usize = 16;

const NO_OWNER: Tid = 0;

/// Signals a vm86 process may ask for; bit 0 means "no signal, poll only".
pub const ALLOWED_SIGNALS: u32 =
    1 | (1 << SIGUSR1) | (1 << SIGUSR2) | (1 << SIGIO) | (1 << SIGURG) | (1 << SIGUNUSED);

pub fn signal_allowed(signal: u32) -> bool {
    signal < 32 && ALLOWED_SIGNALS & (1 << signal) != 0
}

fn valid_line(line: u32) -> Option<u8> {
    if line >= FIRST_VM86_IRQ as u32 && line <= LAST_VM86_IRQ as u32 {
        Some(line as u8)
    } else {
        None
    }
}

struct IrqSlot {
    owner: AtomicU64,
    signal: AtomicU32,
}

impl IrqSlot {
    fn new() -> Self {
        Self {
            owner: AtomicU64::new(NO_OWNER),
            signal: AtomicU32::new(0),
        }
    }

    fn owner(&self) -> Tid {
        self.owner.load(Ordering::Acquire)
    }
}

pub struct IrqTable {
    slots: [IrqSlot; NR_IRQ_SLOTS],
    pending: AtomicU16,
    update: Mutex<()>,
}

impl IrqTable {
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| IrqSlot::new()),
            pending: AtomicU16::new(0),
            update: Mutex::new(()),
        }
    }

    /// Owner of `line`, if any.
    pub fn owner(&self, line: u8) -> Option<Tid> {
        let slot = self.slots.get(line as usize)?;
        match slot.owner() {
            NO_OWNER => None,
            tid => Some(tid),
        }
    }

    /// Claim `line` for the current thread. Returns the line on success.
    pub fn request(
        &self,
        line: u32,
        signal: u32,
        tasks: &dyn TaskOps,
        lines: &dyn IrqLines,
    ) -> Result<u8, Vm86Error> {
        let _guard = self.update.lock();
        self.reap_locked(tasks, lines);

        if !tasks.capable_sys_admin() {
            return Err(Vm86Error::Permission);
        }
        if !signal_allowed(signal) {
            return Err(Vm86Error::Permission);
        }
        let line = valid_line(line).ok_or(Vm86Error::Permission)?;
        let slot = &self.slots[line as usize];
        if slot.owner() != NO_OWNER {
            return Err(Vm86Error::Permission);
        }

        let current = tasks.current();
        slot.signal.store(signal, Ordering::Release);
        slot.owner.store(current, Ordering::Release);
        if let Err(errno) = lines.attach(line) {
            slot.owner.store(NO_OWNER, Ordering::Release);
            slot.signal.store(0, Ordering::Release);
            crate::kerror!("vm86: attaching IRQ {} failed (errno {})", line, errno);
            return Err(Vm86Error::Irq(errno));
        }
        crate::kinfo!(
            "vm86: IRQ {} assigned to tid {} (signal {})",
            line,
            current,
            signal
        );
        Ok(line)
    }

    /// Give `line` back. Freeing an unowned line succeeds.
    pub fn free(
        &self,
        line: u32,
        tasks: &dyn TaskOps,
        lines: &dyn IrqLines,
    ) -> Result<(), Vm86Error> {
        let _guard = self.update.lock();
        self.reap_locked(tasks, lines);

        let line = valid_line(line).ok_or(Vm86Error::Permission)?;
        match self.slots[line as usize].owner() {
            NO_OWNER => Ok(()),
            owner if owner != tasks.current() => Err(Vm86Error::Permission),
            _ => {
                self.release_locked(line, lines);
                Ok(())
            }
        }
    }

    /// Consume the pending event of `line`. Returns 1 if one was latched,
    /// 0 otherwise or when the caller does not own the line.
    pub fn get_and_reset(&self, line: u32, tasks: &dyn TaskOps, lines: &dyn IrqLines) -> u32 {
        let Some(line) = valid_line(line) else {
            return 0;
        };
        if self.slots[line as usize].owner() != tasks.current() {
            return 0;
        }
        let bit = 1u16 << line;
        let previous = self.pending.fetch_and(!bit, Ordering::AcqRel);
        if previous & bit == 0 {
            return 0;
        }
        lines.enable(line);
        1
    }

    /// Pending mask of all lines.
    pub fn pending(&self) -> u16 {
        self.pending.load(Ordering::Acquire)
    }

    /// Pending lines owned by `tid`.
    pub fn pending_owned_by(&self, tid: Tid) -> u16 {
        let pending = self.pending();
        if pending == 0 {
            return 0;
        }
        (FIRST_VM86_IRQ..=LAST_VM86_IRQ)
            .filter(|&line| self.slots[line as usize].owner() == tid)
            .fold(0u16, |mask, line| mask | (pending & (1 << line)))
    }

    /// Hardware callback for an owned line. Runs in interrupt context; the
    /// generic layer sends the EOI afterwards.
    pub fn handle_irq(&self, line: u8, tasks: &dyn TaskOps, lines: &dyn IrqLines) -> IrqReturn {
        let Some(slot) = self.slots.get(line as usize) else {
            return IrqReturn::None;
        };
        let owner = slot.owner();
        if owner == NO_OWNER {
            return IrqReturn::None;
        }
        let bit = 1u16 << line;
        if self.pending.fetch_or(bit, Ordering::AcqRel) & bit != 0 {
            return IrqReturn::None;
        }
        let signal = slot.signal.load(Ordering::Acquire);
        if signal != 0 {
            tasks.send_signal(owner, signal);
        }
        // Unmasked again by get_and_reset.
        lines.disable_nosync(line);
        IrqReturn::Handled
    }

    /// Thread-exit hook: drop every line `tid` still owns.
    pub fn release_owned_by(&self, tid: Tid, lines: &dyn IrqLines) {
        let _guard = self.update.lock();
        for line in FIRST_VM86_IRQ..=LAST_VM86_IRQ {
            if self.slots[line as usize].owner() == tid {
                self.release_locked(line, lines);
            }
        }
    }

    fn reap_locked(&self, tasks: &dyn TaskOps, lines: &dyn IrqLines) {
        for line in FIRST_VM86_IRQ..=LAST_VM86_IRQ {
            let owner = self.slots[line as usize].owner();
            if owner != NO_OWNER && !tasks.is_alive(owner) {
                crate::kwarn!("vm86: reaping IRQ {} of dead tid {}", line, owner);
                self.release_locked(line, lines);
            }
        }
    }

    fn release_locked(&self, line: u8, lines: &dyn IrqLines) {
        lines.detach(line);
        let slot = &self.slots[line as usize];
        slot.owner.store(NO_OWNER, Ordering::Release);
        slot.signal.store(0, Ordering::Release);
        self.pending.fetch_and(!(1u16 << line), Ordering::AcqRel);
        crate::kdebug!("vm86: IRQ {} released", line);
    }
}

impl Default for IrqTable {
    fn default() -> Self {
        Self::new()
    }
}

lazy_static! {
    /// Process-wide vm86 IRQ ownership table.
    pub static ref VM86_IRQS: IrqTable = IrqTable::new();
}
