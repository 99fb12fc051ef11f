//! Monitor configuration
//!
//! Policy knobs that depend on the emulated hardware rather than on the
//! monitor itself. Values come from boot command-line directives:
//!
//! - `vm86.screen=track|pending|escalate` selects the `ScreenWritePolicy`
//! - `vm86.window_pages=N` sizes the write-protected display window

use core::sync::atomic::{AtomicU8, Ordering};

/// Page size of the display window granularity.
pub const PAGE_SIZE: u32 = 4096;

/// Start of legacy display memory.
pub const DISPLAY_WINDOW_BASE: u32 = 0xA0000;

/// Default window: 0xA0000..0xA8000.
pub const DEFAULT_WINDOW_PAGES: u8 = 8;

/// The screen bitmap is a u32, one bit per page.
pub const MAX_WINDOW_PAGES: u8 = 32;

/// What a guest write into the protected display window does.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScreenWritePolicy {
    /// Record the page in the screen bitmap and keep running.
    Track,
    /// Record the page; return to the supervisor only when a virtual
    /// interrupt is pending.
    EscalateIfPending,
    /// Record the page and always return to the supervisor.
    Escalate,
}

impl ScreenWritePolicy {
    pub fn from_str(value: &str) -> Option<Self> {
        if value.eq_ignore_ascii_case("track") {
            Some(ScreenWritePolicy::Track)
        } else if value.eq_ignore_ascii_case("pending") {
            Some(ScreenWritePolicy::EscalateIfPending)
        } else if value.eq_ignore_ascii_case("escalate") {
            Some(ScreenWritePolicy::Escalate)
        } else {
            None
        }
    }

    const fn to_raw(self) -> u8 {
        match self {
            ScreenWritePolicy::Track => 0,
            ScreenWritePolicy::EscalateIfPending => 1,
            ScreenWritePolicy::Escalate => 2,
        }
    }

    const fn from_raw(raw: u8) -> Self {
        match raw {
            0 => ScreenWritePolicy::Track,
            2 => ScreenWritePolicy::Escalate,
            _ => ScreenWritePolicy::EscalateIfPending,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Vm86Config {
    pub window_base: u32,
    pub window_pages: u8,
    pub screen_policy: ScreenWritePolicy,
}

impl Vm86Config {
    pub const fn default() -> Self {
        Self {
            window_base: DISPLAY_WINDOW_BASE,
            window_pages: DEFAULT_WINDOW_PAGES,
            screen_policy: ScreenWritePolicy::EscalateIfPending,
        }
    }

    /// Pages actually covered; the screen bitmap has room for 32.
    pub const fn effective_pages(&self) -> u8 {
        if self.window_pages > MAX_WINDOW_PAGES {
            MAX_WINDOW_PAGES
        } else {
            self.window_pages
        }
    }

    pub const fn window_len(&self) -> u32 {
        self.effective_pages() as u32 * PAGE_SIZE
    }

    /// Page index inside the display window, if `address` falls in it.
    pub fn window_page(&self, address: u32) -> Option<u8> {
        let offset = address.checked_sub(self.window_base)?;
        if offset >= self.window_len() {
            return None;
        }
        Some((offset / PAGE_SIZE) as u8)
    }

    /// Apply `vm86.*` directives from a boot command line on top of `self`.
    pub fn with_cmdline(mut self, cmdline: &str) -> Self {
        for token in cmdline.split_whitespace() {
            let Some((key, value)) = token.split_once('=') else {
                continue;
            };
            if key.eq_ignore_ascii_case("vm86.screen") {
                if let Some(policy) = ScreenWritePolicy::from_str(value) {
                    self.screen_policy = policy;
                }
            } else if key.eq_ignore_ascii_case("vm86.window_pages") {
                if let Ok(pages) = value.parse::<u8>() {
                    if pages > 0 && pages <= MAX_WINDOW_PAGES {
                        self.window_pages = pages;
                    }
                }
            }
        }
        self
    }
}

static WINDOW_PAGES: AtomicU8 = AtomicU8::new(DEFAULT_WINDOW_PAGES);
static SCREEN_POLICY: AtomicU8 = AtomicU8::new(ScreenWritePolicy::EscalateIfPending.to_raw());

/// Install the boot-time configuration.
pub fn set_config(config: &Vm86Config) {
    WINDOW_PAGES.store(config.window_pages, Ordering::Relaxed);
    SCREEN_POLICY.store(config.screen_policy.to_raw(), Ordering::Relaxed);
}

/// Configuration in effect for new sessions.
pub fn config() -> Vm86Config {
    Vm86Config {
        window_base: DISPLAY_WINDOW_BASE,
        window_pages: WINDOW_PAGES.load(Ordering::Relaxed),
        screen_policy: ScreenWritePolicy::from_raw(SCREEN_POLICY.load(Ordering::Relaxed)),
    }
}
