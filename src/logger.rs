//! Kernel log sink
//!
//! Lines go to COM1 with a boot-relative timestamp taken from the TSC. The
//! threshold is a single global level set from `log=<level>` on the boot
//! command line.

use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};

use crate::serial;

static LOGGER_INITIALIZED: AtomicBool = AtomicBool::new(false);
static BOOT_TSC: AtomicU64 = AtomicU64::new(0);
static TSC_FREQUENCY_HZ: AtomicU64 = AtomicU64::new(FALLBACK_TSC_HZ);
static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::INFO as u8);

const FALLBACK_TSC_HZ: u64 = 1_000_000_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    PANIC = 0,
    FATAL = 1,
    ERROR = 2,
    WARN = 3,
    INFO = 4,
    DEBUG = 5,
    TRACE = 6,
}

impl LogLevel {
    const ALL: [LogLevel; 7] = [
        LogLevel::PANIC,
        LogLevel::FATAL,
        LogLevel::ERROR,
        LogLevel::WARN,
        LogLevel::INFO,
        LogLevel::DEBUG,
        LogLevel::TRACE,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            LogLevel::PANIC => "PANIC",
            LogLevel::FATAL => "FATAL",
            LogLevel::ERROR => "ERROR",
            LogLevel::WARN => "WARN",
            LogLevel::INFO => "INFO",
            LogLevel::DEBUG => "DEBUG",
            LogLevel::TRACE => "TRACE",
        }
    }

    const fn ansi(self) -> &'static str {
        match self {
            LogLevel::PANIC | LogLevel::FATAL => "\x1b[1;37;41m",
            LogLevel::ERROR => "\x1b[1;31m",
            LogLevel::WARN => "\x1b[33m",
            LogLevel::INFO => "\x1b[32m",
            LogLevel::DEBUG => "\x1b[36m",
            LogLevel::TRACE => "\x1b[90m",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        if value.eq_ignore_ascii_case("warning") {
            return Some(LogLevel::WARN);
        }
        Self::ALL
            .iter()
            .copied()
            .find(|level| level.as_str().eq_ignore_ascii_case(value))
    }
}

/// Latch the boot TSC. Returns the TSC frequency used for timestamps.
pub fn init() -> u64 {
    if LOGGER_INITIALIZED.swap(true, Ordering::SeqCst) {
        return TSC_FREQUENCY_HZ.load(Ordering::Relaxed);
    }
    BOOT_TSC.store(read_tsc(), Ordering::Relaxed);
    let frequency = tsc_frequency_from_cpuid().unwrap_or(FALLBACK_TSC_HZ);
    TSC_FREQUENCY_HZ.store(frequency, Ordering::Relaxed);
    frequency
}

pub fn log(level: LogLevel, args: fmt::Arguments<'_>) {
    if level > max_level() {
        return;
    }
    serial::_print(format_args!(
        "{}[{}] [{:<5}] {}\x1b[0m\n",
        level.ansi(),
        Timestamp(boot_time_us()),
        level.as_str(),
        args
    ));
}

pub fn set_max_level(level: LogLevel) {
    LOG_LEVEL.store(level as u8, Ordering::Relaxed);
}

pub fn max_level() -> LogLevel {
    let raw = LOG_LEVEL.load(Ordering::Relaxed) as usize;
    LogLevel::ALL[raw.min(LogLevel::ALL.len() - 1)]
}

/// `log=<level>` (or `loglevel=<level>`) from a boot command line.
pub fn parse_level_directive(cmdline: &str) -> Option<LogLevel> {
    cmdline
        .split_whitespace()
        .filter_map(|token| token.split_once('='))
        .filter(|(key, _)| key.eq_ignore_ascii_case("log") || key.eq_ignore_ascii_case("loglevel"))
        .find_map(|(_, value)| LogLevel::from_str(value))
}

pub fn boot_time_us() -> u64 {
    let start = BOOT_TSC.load(Ordering::Relaxed);
    let frequency = TSC_FREQUENCY_HZ.load(Ordering::Relaxed);
    if start == 0 || frequency == 0 {
        return 0;
    }
    read_tsc().saturating_sub(start).saturating_mul(1_000_000) / frequency
}

fn read_tsc() -> u64 {
    unsafe { core::arch::x86_64::_rdtsc() }
}

/// CPUID leaf 0x15 (TSC/crystal ratio), falling back to the leaf 0x16 base
/// frequency.
fn tsc_frequency_from_cpuid() -> Option<u64> {
    use core::arch::x86_64::{__cpuid, __cpuid_count};

    let highest_leaf = unsafe { __cpuid(0) }.eax;
    if highest_leaf >= 0x15 {
        let leaf = unsafe { __cpuid_count(0x15, 0) };
        let (denominator, numerator, crystal) = (leaf.eax as u64, leaf.ebx as u64, leaf.ecx as u64);
        if denominator != 0 && numerator != 0 && crystal != 0 {
            return Some(crystal * numerator / denominator);
        }
    }
    if highest_leaf >= 0x16 {
        let base_mhz = unsafe { __cpuid(0x16) }.eax as u64;
        if base_mhz != 0 {
            return Some(base_mhz * 1_000_000);
        }
    }
    None
}

struct Timestamp(u64);

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>5}.{:06}", self.0 / 1_000_000, self.0 % 1_000_000)
    }
}
