//! Line gating tests (src/vm86/lines.rs)

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::posix::errno::{EBUSY, EINVAL};
use crate::vm86::lines::{update_masks, LineGate};

// =========================================================================
// Gate
// =========================================================================

#[test]
fn test_attach_once() {
    let gate = LineGate::new();
    assert_eq!(gate.attach(5), Ok(()));
    assert_eq!(gate.attach(5), Err(EBUSY));
    assert_eq!(gate.attach(16), Err(EINVAL));
    assert!(gate.is_attached(5));
}

#[test]
fn test_enter_unattached_line() {
    let gate = LineGate::new();
    assert!(!gate.enter(5));
    // A refused callback leaves no running mark behind.
    assert!(!gate.is_running(5));
    assert!(!gate.enter(200));
}

#[test]
fn test_enter_and_leave() {
    let gate = LineGate::new();
    gate.attach(9).unwrap();

    assert!(gate.enter(9));
    assert!(gate.is_running(9));
    gate.leave(9);
    assert!(!gate.is_running(9));
}

#[test]
fn test_no_entry_after_detach() {
    let gate = LineGate::new();
    gate.attach(9).unwrap();
    gate.detach(9);

    assert!(!gate.is_attached(9));
    assert!(!gate.enter(9));
    assert_eq!(gate.attach(9), Ok(()));
}

#[test]
fn test_detach_waits_for_running_callback() {
    let gate = Arc::new(LineGate::new());
    gate.attach(7).unwrap();
    let finished = Arc::new(AtomicBool::new(false));

    assert!(gate.enter(7));
    let callback = {
        let gate = Arc::clone(&gate);
        let finished = Arc::clone(&finished);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            finished.store(true, Ordering::SeqCst);
            gate.leave(7);
        })
    };

    gate.detach(7);
    assert!(finished.load(Ordering::SeqCst));
    assert!(!gate.is_running(7));
    callback.join().unwrap();
}

#[test]
fn test_callbacks_racing_detach_never_run_after_it() {
    let gate = Arc::new(LineGate::new());
    gate.attach(4).unwrap();
    let detached = Arc::new(AtomicBool::new(false));
    let late_entry = Arc::new(AtomicBool::new(false));

    let callback = {
        let gate = Arc::clone(&gate);
        let detached = Arc::clone(&detached);
        let late_entry = Arc::clone(&late_entry);
        thread::spawn(move || {
            for _ in 0..100_000 {
                let was_detached = detached.load(Ordering::SeqCst);
                if gate.enter(4) {
                    if was_detached {
                        late_entry.store(true, Ordering::SeqCst);
                    }
                    gate.leave(4);
                }
            }
        })
    };

    thread::sleep(Duration::from_millis(1));
    gate.detach(4);
    detached.store(true, Ordering::SeqCst);
    callback.join().unwrap();

    assert!(!late_entry.load(Ordering::SeqCst));
}

// =========================================================================
// Mask updates
// =========================================================================

#[test]
fn test_update_masks() {
    assert_eq!(update_masks([0x00, 0x00], 3, true), [0x08, 0x00]);
    assert_eq!(update_masks([0xFF, 0xFF], 3, false), [0xF7, 0xFF]);
    assert_eq!(update_masks([0x00, 0x00], 12, true), [0x00, 0x10]);
    assert_eq!(update_masks([0xFF, 0xFF], 15, false), [0xFF, 0x7F]);
    assert_eq!(update_masks([0x12, 0x34], 16, true), [0x12, 0x34]);
}

#[test]
fn test_mask_updates_compose() {
    // Unmask 5 then mask 6: both changes survive because each update
    // starts from the current pair.
    let masks = update_masks([0xFF, 0xFF], 5, false);
    let masks = update_masks(masks, 6, true);
    let masks = update_masks(masks, 10, false);
    assert_eq!(masks, [0xDF, 0xFB]);
}
