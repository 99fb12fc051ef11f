//! 8259 PIC backing for vm86 IRQ passing
//!
//! The vector stubs for lines handed to vm86 processes call
//! `vm86_irq_entry`, which forwards to the shared `VM86_IRQS` table and
//! acknowledges the PIC afterwards. Mask updates and EOIs both go through
//! the `PICS` lock, so concurrent mask changes from different CPUs are
//! never lost.

use pic8259::ChainedPics;
use spin::Mutex;
use x86_64::instructions::interrupts::without_interrupts;

use super::host::{IrqLines, IrqReturn, TaskOps};
use super::irq::{FIRST_VM86_IRQ, LAST_VM86_IRQ, VM86_IRQS};
use super::lines::{update_masks, LineGate, NR_LINES};

pub const PIC_1_OFFSET: u8 = 32;
pub const PIC_2_OFFSET: u8 = PIC_1_OFFSET + 8;

pub static PICS: Mutex<ChainedPics> =
    Mutex::new(unsafe { ChainedPics::new(PIC_1_OFFSET, PIC_2_OFFSET) });

/// The 8259 pair as seen by the IRQ table.
pub struct PicLines {
    gate: LineGate,
}

pub static PIC_LINES: PicLines = PicLines::new();

impl PicLines {
    pub const fn new() -> Self {
        Self {
            gate: LineGate::new(),
        }
    }

    fn set_masked(&self, line: u8, masked: bool) {
        if line >= NR_LINES {
            return;
        }
        without_interrupts(|| {
            let mut pics = PICS.lock();
            unsafe {
                let [master, slave] = update_masks(pics.read_masks(), line, masked);
                pics.write_masks(master, slave);
            }
        });
    }
}

impl IrqLines for PicLines {
    fn attach(&self, line: u8) -> Result<(), i32> {
        self.gate.attach(line)?;
        self.set_masked(line, false);
        Ok(())
    }

    fn detach(&self, line: u8) {
        self.set_masked(line, true);
        self.gate.detach(line);
    }

    fn disable_nosync(&self, line: u8) {
        self.set_masked(line, true);
    }

    fn enable(&self, line: u8) {
        if self.gate.is_attached(line) {
            self.set_masked(line, false);
        }
    }
}

/// Remap both PICs and keep every assignable line masked until a vm86
/// process attaches it.
pub fn init() {
    without_interrupts(|| unsafe { PICS.lock().initialize() });
    for line in FIRST_VM86_IRQ..=LAST_VM86_IRQ {
        PIC_LINES.set_masked(line, true);
    }
    crate::kinfo!(
        "vm86: PIC remapped to {}/{}, lines {}-{} reserved for IRQ passing",
        PIC_1_OFFSET,
        PIC_2_OFFSET,
        FIRST_VM86_IRQ,
        LAST_VM86_IRQ
    );
}

const fn vector_of(line: u8) -> u8 {
    if line < 8 {
        PIC_1_OFFSET + line
    } else {
        PIC_2_OFFSET + line - 8
    }
}

/// Body of the interrupt stub for PIC line `line`.
pub fn vm86_irq_entry(line: u8, tasks: &dyn TaskOps) -> IrqReturn {
    let line = line & (NR_LINES - 1);
    let result = if PIC_LINES.gate.enter(line) {
        let result = VM86_IRQS.handle_irq(line, tasks, &PIC_LINES);
        PIC_LINES.gate.leave(line);
        result
    } else {
        IrqReturn::None
    };
    unsafe {
        PICS.lock().notify_end_of_interrupt(vector_of(line));
    }
    result
}
