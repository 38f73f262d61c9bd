//! Leveled stderr logging for bal
//!
//! Every line is written under the stderr lock so output from the poller
//! thread and caller threads never interleaves mid-line. Lines carry the
//! level, the emitting thread and the module:
//!
//! ```text
//! [DEBUG] (bal-poller) bal_select::poller: added socket 7 (mask = 0000005d)
//! ```
//!
//! # Environment Variables
//!
//! - `BAL_LOG_LEVEL=<level>` - off, error, warn, info, debug, trace (or 0-5). Default: warn
//! - `BAL_LOG_FLUSH=1` - Flush stderr after each line
//!
//! # Usage
//!
//! ```ignore
//! use bal_core::{bal_debug, bal_warn};
//!
//! bal_debug!("added socket {} to list", sd);
//! bal_warn!("socket {} not found; ignoring removal request", sd);
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Log levels
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => LogLevel::Off,
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }

    /// Parse a level name or digit. Unknown strings yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "0" => Some(LogLevel::Off),
            "error" | "1" => Some(LogLevel::Error),
            "warn" | "warning" | "2" => Some(LogLevel::Warn),
            "info" | "3" => Some(LogLevel::Info),
            "debug" | "4" => Some(LogLevel::Debug),
            "trace" | "5" => Some(LogLevel::Trace),
            _ => None,
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            LogLevel::Off => "",
            LogLevel::Error => "[ERROR]",
            LogLevel::Warn => "[WARN] ",
            LogLevel::Info => "[INFO] ",
            LogLevel::Debug => "[DEBUG]",
            LogLevel::Trace => "[TRACE]",
        }
    }
}

static FLUSH_ENABLED: AtomicBool = AtomicBool::new(false);
static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Warn as u8);
static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Initialize logging from environment variables.
///
/// Runs on first use; call it explicitly to pin the moment env is read.
pub fn init() {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    if let Ok(val) = std::env::var("BAL_LOG_FLUSH") {
        let flush = matches!(val.to_lowercase().as_str(), "1" | "true" | "yes" | "on");
        FLUSH_ENABLED.store(flush, Ordering::Relaxed);
    }

    if let Some(level) = std::env::var("BAL_LOG_LEVEL").ok().and_then(|v| LogLevel::parse(&v)) {
        LOG_LEVEL.store(level as u8, Ordering::Relaxed);
    }
}

#[inline]
pub fn flush_enabled() -> bool {
    if !INITIALIZED.load(Ordering::Relaxed) {
        init();
    }
    FLUSH_ENABLED.load(Ordering::Relaxed)
}

#[inline]
pub fn log_level() -> LogLevel {
    if !INITIALIZED.load(Ordering::Relaxed) {
        init();
    }
    LogLevel::from_u8(LOG_LEVEL.load(Ordering::Relaxed))
}

/// Set log level programmatically (overrides env).
pub fn set_log_level(level: LogLevel) {
    init();
    LOG_LEVEL.store(level as u8, Ordering::Relaxed);
}

/// Set flush mode programmatically (overrides env).
pub fn set_flush_enabled(enabled: bool) {
    init();
    FLUSH_ENABLED.store(enabled, Ordering::Relaxed);
}

#[inline]
pub fn level_enabled(level: LogLevel) -> bool {
    level != LogLevel::Off && level as u8 <= log_level() as u8
}

#[doc(hidden)]
pub fn _log_impl(level: LogLevel, module: &str, args: std::fmt::Arguments<'_>) {
    if !level_enabled(level) {
        return;
    }
    let current = std::thread::current();
    let thread = current.name().unwrap_or("unnamed");

    let stderr = std::io::stderr();
    let mut handle = stderr.lock();
    let _ = write!(handle, "{} ({}) {}: ", level.prefix(), thread, module);
    let _ = handle.write_fmt(args);
    let _ = handle.write_all(b"\n");
    if flush_enabled() {
        let _ = handle.flush();
    }
}

/// Error level log (shown unless logging is off)
#[macro_export]
macro_rules! bal_error {
    ($($arg:tt)*) => {{
        $crate::log::_log_impl(
            $crate::log::LogLevel::Error,
            module_path!(),
            format_args!($($arg)*)
        );
    }};
}

/// Warning level log
#[macro_export]
macro_rules! bal_warn {
    ($($arg:tt)*) => {{
        $crate::log::_log_impl(
            $crate::log::LogLevel::Warn,
            module_path!(),
            format_args!($($arg)*)
        );
    }};
}

/// Info level log
#[macro_export]
macro_rules! bal_info {
    ($($arg:tt)*) => {{
        $crate::log::_log_impl(
            $crate::log::LogLevel::Info,
            module_path!(),
            format_args!($($arg)*)
        );
    }};
}

/// Debug level log
#[macro_export]
macro_rules! bal_debug {
    ($($arg:tt)*) => {{
        $crate::log::_log_impl(
            $crate::log::LogLevel::Debug,
            module_path!(),
            format_args!($($arg)*)
        );
    }};
}

/// Trace level log (per-cycle noise)
#[macro_export]
macro_rules! bal_trace {
    ($($arg:tt)*) => {{
        $crate::log::_log_impl(
            $crate::log::LogLevel::Trace,
            module_path!(),
            format_args!($($arg)*)
        );
    }};
}
