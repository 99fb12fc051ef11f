//! Monitor configuration tests (src/vm86/config.rs)

use serial_test::serial;

use crate::mock::Machine;
use crate::vm86::config::{self, ScreenWritePolicy, Vm86Config, PAGE_SIZE};
use crate::vm86::Vm86Context;

#[test]
fn test_defaults() {
    let config = Vm86Config::default();
    assert_eq!(config.window_base, 0xA0000);
    assert_eq!(config.window_pages, 8);
    assert_eq!(config.window_len(), 0x8000);
    assert_eq!(config.screen_policy, ScreenWritePolicy::EscalateIfPending);
}

#[test]
fn test_window_page() {
    let config = Vm86Config::default();
    assert_eq!(config.window_page(0x9FFFF), None);
    assert_eq!(config.window_page(0xA0000), Some(0));
    assert_eq!(config.window_page(0xA0000 + PAGE_SIZE), Some(1));
    assert_eq!(config.window_page(0xA7FFF), Some(7));
    assert_eq!(config.window_page(0xA8000), None);
    assert_eq!(config.window_page(0), None);
}

#[test]
fn test_cmdline() {
    let config = Vm86Config::default()
        .with_cmdline("root=/dev/vda vm86.screen=track vm86.window_pages=4 quiet");
    assert_eq!(config.screen_policy, ScreenWritePolicy::Track);
    assert_eq!(config.window_pages, 4);
    assert_eq!(config.window_page(0xA4000), None);

    let config = Vm86Config::default().with_cmdline("VM86.SCREEN=Escalate");
    assert_eq!(config.screen_policy, ScreenWritePolicy::Escalate);
}

#[test]
fn test_cmdline_ignores_invalid_values() {
    let config = Vm86Config::default().with_cmdline(
        "vm86.screen=sometimes vm86.window_pages=0 vm86.window_pages=33 vm86.window_pages=x vm86",
    );
    assert_eq!(config, Vm86Config::default());
}

#[test]
fn test_policy_names() {
    assert_eq!(ScreenWritePolicy::from_str("track"), Some(ScreenWritePolicy::Track));
    assert_eq!(
        ScreenWritePolicy::from_str("pending"),
        Some(ScreenWritePolicy::EscalateIfPending)
    );
    assert_eq!(ScreenWritePolicy::from_str("escalate"), Some(ScreenWritePolicy::Escalate));
    assert_eq!(ScreenWritePolicy::from_str(""), None);
}

#[test]
#[serial]
fn test_global_config() {
    let saved = config::config();
    assert_eq!(saved, Vm86Config::default());

    let custom = Vm86Config::default().with_cmdline("vm86.screen=escalate vm86.window_pages=2");
    config::set_config(&custom);
    assert_eq!(config::config(), custom);

    config::set_config(&saved);
    assert_eq!(config::config(), Vm86Config::default());
}

#[test]
fn test_oversized_window_is_clamped() {
    let config = Vm86Config {
        window_pages: 200,
        ..Vm86Config::default()
    };
    assert_eq!(config.effective_pages(), 32);
    assert_eq!(config.window_len(), 32 * PAGE_SIZE);
    assert_eq!(config.window_page(0xA0000 + 31 * PAGE_SIZE), Some(31));
    assert_eq!(config.window_page(0xA0000 + 32 * PAGE_SIZE), None);
    assert_eq!(config.window_page(0xA0000 + 199 * PAGE_SIZE), None);
}

#[test]
#[serial]
fn test_new_context_uses_boot_config() {
    let saved = config::config();
    let custom = Vm86Config::default().with_cmdline("vm86.screen=track vm86.window_pages=3");
    config::set_config(&custom);

    let mut machine = Machine::new();
    let ctx = Vm86Context::new(
        &mut machine.thread,
        &mut machine.host,
        &mut machine.cpu,
        &mut machine.memory,
        &machine.tasks,
        &machine.pic,
        &machine.irqs,
    );
    assert_eq!(ctx.config, custom);

    config::set_config(&saved);
}
