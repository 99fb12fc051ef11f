//! IRQ passing tests (src/vm86/irq.rs)

use serial_test::serial;

use crate::mock::signals::SIGKILL;
use crate::mock::{LineOp, MockPic, MockTasks, VM86_TID};
use crate::posix::errno::EBUSY;
use crate::signal::{SIGIO, SIGUNUSED, SIGURG, SIGUSR1, SIGUSR2};
use crate::vm86::irq::{signal_allowed, FIRST_VM86_IRQ, LAST_VM86_IRQ};
use crate::vm86::{on_thread_exit, IrqReturn, IrqTable, Vm86Error, VM86_IRQS};

const OTHER_TID: u64 = 200;

fn setup() -> (IrqTable, MockTasks, MockPic) {
    (IrqTable::new(), MockTasks::new(VM86_TID), MockPic::new())
}

// =========================================================================
// request
// =========================================================================

#[test]
fn test_request_attaches_line() {
    let (irqs, tasks, pic) = setup();

    assert_eq!(irqs.request(5, SIGUSR1, &tasks, &pic), Ok(5));
    assert_eq!(irqs.owner(5), Some(VM86_TID));
    assert!(pic.is_attached(5));
    assert!(!pic.is_masked(5));
}

#[test]
fn test_request_needs_capability() {
    let (irqs, tasks, pic) = setup();
    tasks.set_admin(false);

    assert_eq!(irqs.request(5, 0, &tasks, &pic), Err(Vm86Error::Permission));
    assert_eq!(irqs.owner(5), None);
    assert!(pic.ops().is_empty());
}

#[test]
fn test_request_rejects_signal() {
    let (irqs, tasks, pic) = setup();

    assert_eq!(
        irqs.request(5, SIGKILL, &tasks, &pic),
        Err(Vm86Error::Permission)
    );
    assert_eq!(irqs.request(5, 32, &tasks, &pic), Err(Vm86Error::Permission));
    assert_eq!(
        irqs.request(5, u32::MAX, &tasks, &pic),
        Err(Vm86Error::Permission)
    );
}

#[test]
fn test_allowed_signals() {
    for signal in [0, SIGUSR1, SIGUSR2, SIGIO, SIGURG, SIGUNUSED] {
        assert!(signal_allowed(signal), "signal {}", signal);
    }
    assert!(!signal_allowed(SIGKILL));

    let (irqs, tasks, pic) = setup();
    for (line, signal) in (3u32..).zip([0, SIGUSR1, SIGUSR2, SIGIO, SIGURG, SIGUNUSED]) {
        assert_eq!(irqs.request(line, signal, &tasks, &pic), Ok(line as u8));
    }
}

#[test]
fn test_request_rejects_reserved_lines() {
    let (irqs, tasks, pic) = setup();

    for line in [0, 1, 2, 16, 255] {
        assert_eq!(
            irqs.request(line, 0, &tasks, &pic),
            Err(Vm86Error::Permission),
            "line {}",
            line
        );
    }
    assert_eq!(irqs.request(FIRST_VM86_IRQ as u32, 0, &tasks, &pic), Ok(3));
    assert_eq!(irqs.request(LAST_VM86_IRQ as u32, 0, &tasks, &pic), Ok(15));
}

#[test]
fn test_request_owned_line() {
    let (irqs, tasks, pic) = setup();
    irqs.request(7, 0, &tasks, &pic).unwrap();

    assert_eq!(irqs.request(7, 0, &tasks, &pic), Err(Vm86Error::Permission));

    tasks.switch_to(OTHER_TID);
    assert_eq!(irqs.request(7, 0, &tasks, &pic), Err(Vm86Error::Permission));
    assert_eq!(irqs.owner(7), Some(VM86_TID));
}

#[test]
fn test_failed_attach_leaves_line_free() {
    let (irqs, tasks, pic) = setup();
    pic.fail_next_attach(EBUSY);

    assert_eq!(irqs.request(9, SIGIO, &tasks, &pic), Err(Vm86Error::Irq(EBUSY)));
    assert_eq!(irqs.owner(9), None);

    // Nothing is delivered for a line that was never installed.
    assert_eq!(irqs.handle_irq(9, &tasks, &pic), IrqReturn::None);
    assert!(tasks.sent().is_empty());

    assert_eq!(irqs.request(9, SIGIO, &tasks, &pic), Ok(9));
}

// =========================================================================
// delivery
// =========================================================================

#[test]
fn test_irq_latched_once() {
    let (irqs, tasks, pic) = setup();
    irqs.request(5, SIGUSR1, &tasks, &pic).unwrap();

    assert_eq!(irqs.handle_irq(5, &tasks, &pic), IrqReturn::Handled);
    assert_eq!(irqs.handle_irq(5, &tasks, &pic), IrqReturn::None);

    assert_eq!(irqs.pending(), 1 << 5);
    assert_eq!(tasks.sent(), vec![(VM86_TID, SIGUSR1)]);
    assert!(pic.is_masked(5));
}

#[test]
fn test_get_and_reset_reenables() {
    let (irqs, tasks, pic) = setup();
    irqs.request(5, SIGUSR1, &tasks, &pic).unwrap();
    irqs.handle_irq(5, &tasks, &pic);

    assert_eq!(irqs.get_and_reset(5, &tasks, &pic), 1);
    assert_eq!(irqs.pending(), 0);
    assert!(!pic.is_masked(5));

    assert_eq!(irqs.get_and_reset(5, &tasks, &pic), 0);
    assert_eq!(
        pic.ops(),
        vec![LineOp::Attach(5), LineOp::Disable(5), LineOp::Enable(5)]
    );

    // The line fires again after being consumed.
    assert_eq!(irqs.handle_irq(5, &tasks, &pic), IrqReturn::Handled);
    assert_eq!(tasks.sent().len(), 2);
}

#[test]
fn test_poll_only_line_sends_nothing() {
    let (irqs, tasks, pic) = setup();
    irqs.request(6, 0, &tasks, &pic).unwrap();

    assert_eq!(irqs.handle_irq(6, &tasks, &pic), IrqReturn::Handled);
    assert!(tasks.sent().is_empty());
    assert_eq!(irqs.pending(), 1 << 6);
}

#[test]
fn test_unowned_line_not_handled() {
    let (irqs, tasks, pic) = setup();

    assert_eq!(irqs.handle_irq(5, &tasks, &pic), IrqReturn::None);
    assert_eq!(irqs.handle_irq(200, &tasks, &pic), IrqReturn::None);
    assert_eq!(irqs.pending(), 0);
}

#[test]
fn test_get_and_reset_by_other_thread() {
    let (irqs, tasks, pic) = setup();
    irqs.request(5, 0, &tasks, &pic).unwrap();
    irqs.handle_irq(5, &tasks, &pic);

    tasks.switch_to(OTHER_TID);
    assert_eq!(irqs.get_and_reset(5, &tasks, &pic), 0);
    // The pending mask is readable by anyone.
    assert_eq!(irqs.pending(), 1 << 5);
    assert_eq!(irqs.get_and_reset(2, &tasks, &pic), 0);
    assert_eq!(irqs.get_and_reset(u32::MAX, &tasks, &pic), 0);
}

#[test]
fn test_pending_owned_by() {
    let (irqs, tasks, pic) = setup();
    irqs.request(5, 0, &tasks, &pic).unwrap();
    tasks.switch_to(OTHER_TID);
    irqs.request(10, 0, &tasks, &pic).unwrap();

    irqs.handle_irq(5, &tasks, &pic);
    irqs.handle_irq(10, &tasks, &pic);

    assert_eq!(irqs.pending_owned_by(VM86_TID), 1 << 5);
    assert_eq!(irqs.pending_owned_by(OTHER_TID), 1 << 10);
    assert_eq!(irqs.pending_owned_by(300), 0);
}

// =========================================================================
// free and reaping
// =========================================================================

#[test]
fn test_free() {
    let (irqs, tasks, pic) = setup();
    irqs.request(5, SIGUSR1, &tasks, &pic).unwrap();
    irqs.handle_irq(5, &tasks, &pic);

    assert_eq!(irqs.free(5, &tasks, &pic), Ok(()));
    assert_eq!(irqs.owner(5), None);
    assert_eq!(irqs.pending(), 0);
    assert!(!pic.is_attached(5));
    assert!(pic.is_masked(5));
}

#[test]
fn test_free_unowned_line() {
    let (irqs, tasks, pic) = setup();

    assert_eq!(irqs.free(5, &tasks, &pic), Ok(()));
    assert!(pic.ops().is_empty());
    assert_eq!(irqs.free(1, &tasks, &pic), Err(Vm86Error::Permission));
    assert_eq!(irqs.free(16, &tasks, &pic), Err(Vm86Error::Permission));
}

#[test]
fn test_free_by_other_thread() {
    let (irqs, tasks, pic) = setup();
    irqs.request(5, 0, &tasks, &pic).unwrap();

    tasks.switch_to(OTHER_TID);
    assert_eq!(irqs.free(5, &tasks, &pic), Err(Vm86Error::Permission));
    assert_eq!(irqs.owner(5), Some(VM86_TID));
}

#[test]
fn test_dead_owner_reaped() {
    let (irqs, tasks, pic) = setup();
    irqs.request(5, 0, &tasks, &pic).unwrap();

    tasks.switch_to(OTHER_TID);
    tasks.kill(VM86_TID);
    assert_eq!(irqs.request(5, SIGIO, &tasks, &pic), Ok(5));
    assert_eq!(irqs.owner(5), Some(OTHER_TID));
    assert_eq!(
        pic.ops(),
        vec![LineOp::Attach(5), LineOp::Detach(5), LineOp::Attach(5)]
    );
}

#[test]
fn test_thread_exit_releases_lines() {
    let (irqs, tasks, pic) = setup();
    irqs.request(4, 0, &tasks, &pic).unwrap();
    irqs.request(11, 0, &tasks, &pic).unwrap();
    tasks.switch_to(OTHER_TID);
    irqs.request(12, 0, &tasks, &pic).unwrap();

    on_thread_exit(VM86_TID, &irqs, &pic);

    assert_eq!(irqs.owner(4), None);
    assert_eq!(irqs.owner(11), None);
    assert_eq!(irqs.owner(12), Some(OTHER_TID));
    assert!(!pic.is_attached(4));
    assert!(pic.is_attached(12));
}

#[test]
#[serial]
fn test_global_table_starts_unowned() {
    for line in FIRST_VM86_IRQ..=LAST_VM86_IRQ {
        assert_eq!(VM86_IRQS.owner(line), None);
    }
    assert_eq!(VM86_IRQS.pending(), 0);
}
