//! COM1 console used by the logger

use core::fmt::{self, Write};

use spin::Mutex;
use uart_16550::SerialPort;

const COM1_BASE: u16 = 0x3F8;

/// Port is programmed on first use so early log lines are not lost.
static COM1: Mutex<Option<SerialPort>> = Mutex::new(None);

fn with_port<R>(f: impl FnOnce(&mut SerialPort) -> R) -> R {
    x86_64::instructions::interrupts::without_interrupts(|| {
        let mut slot = COM1.lock();
        let port = slot.get_or_insert_with(|| {
            let mut port = unsafe { SerialPort::new(COM1_BASE) };
            port.init();
            port
        });
        f(port)
    })
}

pub fn init() {
    with_port(|_| ());
}

pub(crate) fn _print(args: fmt::Arguments<'_>) {
    with_port(|port| {
        let _ = port.write_fmt(args);
    });
}
