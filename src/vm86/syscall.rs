//! vm86 system calls
//!
//! `vm86old(entry)` enters vm86 mode with the plain entry structure.
//! `vm86(subfunction, arg)` multiplexes the newer entry form and the IRQ
//! passing operations. Both follow the kernel convention: a non-negative
//! result, or `u64::MAX` with errno set.

use super::host::EntryKind;
use super::session::{self, Vm86Context};
use super::Vm86Error;
use crate::posix;
use crate::signal::SIGSEGV;

pub const VM86_PLUS_INSTALL_CHECK: u64 = 0;
pub const VM86_ENTER: u64 = 1;
pub const VM86_ENTER_NO_BYPASS: u64 = 2;
pub const VM86_REQUEST_IRQ: u64 = 3;
pub const VM86_FREE_IRQ: u64 = 4;
pub const VM86_GET_IRQ_BITS: u64 = 5;
pub const VM86_GET_AND_RESET_IRQ: u64 = 6;

/// `vm86old(entry_addr)`
pub fn sys_vm86old(ctx: &mut Vm86Context<'_>, entry_addr: u64, caller_eflags: u32) -> u64 {
    let result = enter_from_user(ctx, entry_addr, EntryKind::Legacy, caller_eflags);
    complete(ctx, result)
}

/// `vm86(subfunction, arg)`
pub fn sys_vm86(
    ctx: &mut Vm86Context<'_>,
    subfunction: u64,
    arg: u64,
    caller_eflags: u32,
) -> u64 {
    let result = match subfunction {
        VM86_PLUS_INSTALL_CHECK => Ok(0),
        VM86_ENTER | VM86_ENTER_NO_BYPASS => {
            enter_from_user(ctx, arg, EntryKind::Plus, caller_eflags)
        }
        VM86_REQUEST_IRQ => {
            let line = (arg & 0xFF) as u32;
            let signal = u32::try_from(arg >> 8).unwrap_or(u32::MAX);
            ctx.irqs
                .request(line, signal, ctx.tasks, ctx.lines)
                .map(u64::from)
        }
        VM86_FREE_IRQ => ctx
            .irqs
            .free(line_arg(arg), ctx.tasks, ctx.lines)
            .map(|()| 0),
        VM86_GET_IRQ_BITS => Ok(ctx.irqs.pending() as u64),
        VM86_GET_AND_RESET_IRQ => {
            let consumed = ctx.irqs.get_and_reset(line_arg(arg), ctx.tasks, ctx.lines);
            Ok(u64::from(consumed))
        }
        other => {
            crate::kdebug!("vm86: unknown subfunction {}", other);
            Err(Vm86Error::Invalid)
        }
    };
    complete(ctx, result)
}

/// Out-of-range values map to a line number every check rejects.
fn line_arg(arg: u64) -> u32 {
    u32::try_from(arg).unwrap_or(u32::MAX)
}

fn enter_from_user(
    ctx: &mut Vm86Context<'_>,
    entry_addr: u64,
    kind: EntryKind,
    caller_eflags: u32,
) -> Result<u64, Vm86Error> {
    if ctx.thread.session_active() {
        return Err(Vm86Error::Permission);
    }
    let addr = u32::try_from(entry_addr).map_err(|_| Vm86Error::Fault)?;
    let mut entry = ctx.host.read_entry(addr, kind).map_err(|errno| {
        crate::kdebug!("vm86: reading entry at {:#x} failed (errno {})", addr, errno);
        Vm86Error::Fault
    })?;
    entry.plus = match kind {
        EntryKind::Legacy => None,
        EntryKind::Plus => Some(entry.plus.unwrap_or_default()),
    };

    // The entry structure doubles as the control block the final state
    // is written back to.
    session::enter(ctx, &entry, addr, caller_eflags).map(u64::from)
}

fn complete(ctx: &mut Vm86Context<'_>, result: Result<u64, Vm86Error>) -> u64 {
    match result {
        Ok(value) => value,
        Err(Vm86Error::ControlBlockLost) => {
            ctx.host.exit_thread(SIGSEGV);
            posix::fail(Vm86Error::ControlBlockLost.errno())
        }
        Err(err) => posix::fail(err.errno()),
    }
}
