#![no_std]

use core::panic::PanicInfo;

pub mod logger;
pub mod posix;
pub mod serial;
pub mod signal;
pub mod vm86;

/// Bring up the console, the logger and the vm86 monitor configuration
/// from the boot command line.
pub fn init(cmdline: &str) {
    serial::init();
    let tsc_hz = logger::init();
    if let Some(level) = logger::parse_level_directive(cmdline) {
        logger::set_max_level(level);
    }

    let config = vm86::Vm86Config::default().with_cmdline(cmdline);
    vm86::config::set_config(&config);
    #[cfg(target_os = "none")]
    vm86::hw::init();

    kinfo!(
        "vm86 monitor ready: TSC {} MHz, display window {:#x}+{} pages, screen policy {:?}",
        tsc_hz / 1_000_000,
        config.window_base,
        config.window_pages,
        config.screen_policy
    );
}

pub fn panic(info: &PanicInfo) -> ! {
    kpanic!("{}", info);
}

/// Park the CPU for good.
pub fn halt_loop() -> ! {
    loop {
        x86_64::instructions::interrupts::disable();
        x86_64::instructions::hlt();
    }
}

#[macro_export]
macro_rules! klog {
    ($level:expr, $($arg:tt)*) => {{
        $crate::logger::log($level, format_args!($($arg)*));
    }};
}

#[macro_export]
macro_rules! kpanic {
    ($($arg:tt)*) => {{
        let loc = core::panic::Location::caller();
        $crate::klog!(
            $crate::logger::LogLevel::PANIC,
            "------------[ cut here ]------------"
        );
        $crate::klog!(
            $crate::logger::LogLevel::PANIC,
            "Kernel panic - not syncing: {}",
            format_args!($($arg)*)
        );
        $crate::klog!(
            $crate::logger::LogLevel::PANIC,
            "Call Trace: <panic> at {}:{}:{}",
            loc.file(),
            loc.line(),
            loc.column()
        );
        $crate::halt_loop()
    }};
}

#[macro_export]
macro_rules! kfatal {
    ($($arg:tt)*) => {{
        $crate::klog!($crate::logger::LogLevel::FATAL, $($arg)*);
    }};
}

#[macro_export]
macro_rules! kerror {
    ($($arg:tt)*) => {{
        $crate::klog!($crate::logger::LogLevel::ERROR, $($arg)*);
    }};
}

#[macro_export]
macro_rules! kwarn {
    ($($arg:tt)*) => {{
        $crate::klog!($crate::logger::LogLevel::WARN, $($arg)*);
    }};
}

#[macro_export]
macro_rules! kinfo {
    ($($arg:tt)*) => {{
        $crate::klog!($crate::logger::LogLevel::INFO, $($arg)*);
    }};
}

#[macro_export]
macro_rules! kdebug {
    ($($arg:tt)*) => {{
        $crate::klog!($crate::logger::LogLevel::DEBUG, $($arg)*);
    }};
}

#[macro_export]
macro_rules! ktrace {
    ($($arg:tt)*) => {{
        $crate::klog!($crate::logger::LogLevel::TRACE, $($arg)*);
    }};
}
