//! Log targets and one-shot warnings.
//!
//! Every module logs under a `vat::*` target so filtering happens per category
//! through the `env_logger` builder instead of by message text.

use crate::config::LoggingConfig;
use std::cell::RefCell;
use std::collections::HashSet;

pub const ATLAS: &str = "vat::atlas";
pub const COMPUTE: &str = "vat::compute";
pub const ASSEMBLY: &str = "vat::assembly";
pub const TRIGGER: &str = "vat::trigger";
pub const GPU: &str = "vat::gpu";
pub const APP: &str = "vat::app";

/// Installs the global logger. `RUST_LOG` takes precedence over the config.
pub fn init(config: &LoggingConfig) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(config.level);
    for (target, level) in &config.filters {
        builder.filter_module(target, *level);
    }
    if let Ok(spec) = std::env::var("RUST_LOG") {
        builder.parse_filters(&spec);
    }
    builder.format_timestamp_millis();
    if let Err(err) = builder.try_init() {
        log::debug!(target: APP, "logger already installed: {err}");
    }
}

thread_local! {
    static WARNED: RefCell<HashSet<String>> = RefCell::new(HashSet::new());
}

/// Emits `message` at warn level the first time `key` is seen on this thread.
/// Returns whether the warning was emitted.
pub fn warn_once(target: &str, key: &str, message: impl FnOnce() -> String) -> bool {
    let first = WARNED.with(|seen| seen.borrow_mut().insert(key.to_string()));
    if first {
        log::warn!(target: target, "{}", message());
    }
    first
}
