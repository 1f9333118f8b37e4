//! Switches read by every operation invocation.
//!
//! Each thread carries its own configuration, values are bound to the thread
//! that created them, so an override on one thread never leaks into another.
//! Switches are changed only through [`ConfigGuard`] (or the closures built
//! on top of it), which restores the previous value when dropped, including
//! when the body returns early with an error or unwinds with a panic.

use std::cell::Cell;

/// Configuration switch
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Flag {
    /// Record operations into the graph so that backward can walk them.
    /// Enabled by default.
    EnableBackprop,
}

#[derive(Clone, Copy, Debug)]
struct Config {
    enable_backprop: bool,
}

impl Config {
    const fn new() -> Self {
        Self { enable_backprop: true }
    }

    fn get(self, flag: Flag) -> bool {
        match flag {
            Flag::EnableBackprop => self.enable_backprop,
        }
    }

    fn set(&mut self, flag: Flag, value: bool) {
        match flag {
            Flag::EnableBackprop => self.enable_backprop = value,
        }
    }
}

thread_local! {
    static CONFIG: Cell<Config> = const { Cell::new(Config::new()) };
}

/// Current value of flag
#[must_use]
pub fn is_enabled(flag: Flag) -> bool {
    CONFIG.with(|c| c.get().get(flag))
}

fn set(flag: Flag, value: bool) {
    CONFIG.with(|c| {
        let mut config = c.get();
        config.set(flag, value);
        c.set(config);
    });
}

/// Overrides flag until dropped.
///
/// Guards nest, each one restores exactly the value it saw when it was created.
#[must_use = "the override ends as soon as the guard is dropped"]
pub struct ConfigGuard {
    flag: Flag,
    previous: bool,
}

impl ConfigGuard {
    /// Set flag to value, remembering the current value
    pub fn new(flag: Flag, value: bool) -> Self {
        let previous = is_enabled(flag);
        if previous != value {
            log::debug!("Config override {flag:?}: {previous} -> {value}");
        }
        set(flag, value);
        Self { flag, previous }
    }
}

impl Drop for ConfigGuard {
    fn drop(&mut self) {
        set(self.flag, self.previous);
    }
}

/// Run body with flag set to value, then restore the previous value
pub fn using_config<R>(flag: Flag, value: bool, body: impl FnOnce() -> R) -> R {
    let _guard = ConfigGuard::new(flag, value);
    body()
}

/// Run body without recording the graph. Values created inside are detached leaves.
pub fn no_grad<R>(body: impl FnOnce() -> R) -> R {
    using_config(Flag::EnableBackprop, false, body)
}

/// Run body with graph recording, even inside of [`no_grad`]
pub fn enable_grad<R>(body: impl FnOnce() -> R) -> R {
    using_config(Flag::EnableBackprop, true, body)
}
