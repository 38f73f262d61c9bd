//! Poller configuration
//!
//! Library defaults with runtime environment overrides.
//!
//! # Example
//!
//! ```rust,ignore
//! use bal_select::config::{SelectConfig, IdleStrategy};
//!
//! // Defaults with env overrides
//! let config = SelectConfig::from_env();
//!
//! // Or customize programmatically
//! let config = SelectConfig::new()
//!     .max_entries(256)
//!     .idle(IdleStrategy::Sleep(Duration::from_micros(50)));
//! ```

pub mod defaults;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use bal_core::env::{env_get, env_get_str};
use bal_core::ConfigError;

/// What the poller thread does between two poll cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleStrategy {
    /// `thread::yield_now()`
    Yield,
    /// A single spin-loop hint; lowest latency, one core busy.
    Spin,
    /// Fixed sleep.
    Sleep(Duration),
}

impl IdleStrategy {
    /// Parse "yield", "spin" or "sleep"; `sleep` uses `sleep_for`.
    pub fn parse(name: &str, sleep_for: Duration) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "yield" => Some(IdleStrategy::Yield),
            "spin" => Some(IdleStrategy::Spin),
            "sleep" => Some(IdleStrategy::Sleep(sleep_for)),
            _ => None,
        }
    }

    pub(crate) fn pause(&self) {
        match self {
            IdleStrategy::Yield => std::thread::yield_now(),
            IdleStrategy::Spin => std::hint::spin_loop(),
            IdleStrategy::Sleep(d) => std::thread::sleep(*d),
        }
    }
}

/// Readiness multiplexer used by `SystemMux`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Select,
    Poll,
}

impl FromStr for Backend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "select" => Ok(Backend::Select),
            "poll" => Ok(Backend::Poll),
            _ => Err(ConfigError::InvalidValue("backend must be select or poll")),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Select => write!(f, "select"),
            Backend::Poll => write!(f, "poll"),
        }
    }
}

/// Poller configuration with builder pattern.
#[derive(Debug, Clone)]
pub struct SelectConfig {
    /// Watch list bound (also limited by the multiplexer)
    pub max_entries: usize,
    /// Pause between poll cycles
    pub idle: IdleStrategy,
    /// Park timeout while nothing is registered
    pub empty_park: Duration,
    /// Multiplexer backend
    pub backend: Backend,
    /// Poller thread name
    pub thread_name: String,
    /// Poller thread stack size
    pub stack_size: usize,
}

impl Default for SelectConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl SelectConfig {
    /// Create config from library defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `BAL_MAX_ENTRIES` - Watch list bound
    /// - `BAL_IDLE` - yield, spin or sleep
    /// - `BAL_IDLE_SLEEP_US` - Sleep between cycles for `sleep`
    /// - `BAL_EMPTY_PARK_MS` - Park timeout while the list is empty
    /// - `BAL_BACKEND` - select or poll
    /// - `BAL_THREAD_NAME` - Poller thread name
    /// - `BAL_STACK_SIZE` - Poller thread stack size
    ///
    /// Unparsable values fall back to the default.
    pub fn from_env() -> Self {
        let sleep_for = Duration::from_micros(env_get("BAL_IDLE_SLEEP_US", defaults::IDLE_SLEEP_US));
        let idle = IdleStrategy::parse(&env_get_str("BAL_IDLE", defaults::IDLE), sleep_for)
            .unwrap_or(IdleStrategy::Yield);
        let backend = env_get_str("BAL_BACKEND", defaults::BACKEND)
            .parse()
            .unwrap_or(Backend::Select);

        Self {
            max_entries: env_get("BAL_MAX_ENTRIES", defaults::MAX_ENTRIES),
            idle,
            empty_park: Duration::from_millis(env_get("BAL_EMPTY_PARK_MS", defaults::EMPTY_PARK_MS)),
            backend,
            thread_name: env_get_str("BAL_THREAD_NAME", defaults::THREAD_NAME),
            stack_size: env_get("BAL_STACK_SIZE", defaults::STACK_SIZE),
        }
    }

    /// Create config with explicit defaults (no env override).
    pub fn new() -> Self {
        Self {
            max_entries: defaults::MAX_ENTRIES,
            idle: IdleStrategy::Yield,
            empty_park: Duration::from_millis(defaults::EMPTY_PARK_MS),
            backend: Backend::Select,
            thread_name: defaults::THREAD_NAME.to_string(),
            stack_size: defaults::STACK_SIZE,
        }
    }

    // Builder methods

    pub fn max_entries(mut self, n: usize) -> Self {
        self.max_entries = n;
        self
    }

    pub fn idle(mut self, idle: IdleStrategy) -> Self {
        self.idle = idle;
        self
    }

    pub fn empty_park(mut self, d: Duration) -> Self {
        self.empty_park = d;
        self
    }

    pub fn backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = size;
        self
    }

    /// Validate configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_entries == 0 {
            return Err(ConfigError::InvalidValue("max_entries must be > 0"));
        }
        if self.empty_park.is_zero() {
            return Err(ConfigError::InvalidValue("empty_park must be > 0"));
        }
        if self.thread_name.is_empty() {
            return Err(ConfigError::InvalidValue("thread_name must not be empty"));
        }
        if self.thread_name.contains('\0') {
            return Err(ConfigError::InvalidValue("thread_name must not contain NUL"));
        }
        if self.stack_size < 64 * 1024 {
            return Err(ConfigError::InvalidValue("stack_size must be >= 64KB"));
        }
        Ok(())
    }

    /// Print configuration (for debugging)
    pub fn print(&self) {
        eprintln!("bal poller configuration:");
        eprintln!("  max_entries:  {}", self.max_entries);
        eprintln!("  idle:         {:?}", self.idle);
        eprintln!("  empty_park:   {:?}", self.empty_park);
        eprintln!("  backend:      {}", self.backend);
        eprintln!("  thread_name:  {}", self.thread_name);
        eprintln!("  stack_size:   {}", self.stack_size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_env() {
        let config = SelectConfig::from_env();
        assert!(config.max_entries >= 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = SelectConfig::new()
            .max_entries(8)
            .idle(IdleStrategy::Sleep(Duration::from_micros(10)))
            .backend(Backend::Poll)
            .thread_name("poller-x");

        assert_eq!(config.max_entries, 8);
        assert_eq!(config.idle, IdleStrategy::Sleep(Duration::from_micros(10)));
        assert_eq!(config.backend, Backend::Poll);
        assert_eq!(config.thread_name, "poller-x");
    }

    #[test]
    fn test_validation() {
        assert!(SelectConfig::new().max_entries(0).validate().is_err());
        assert!(SelectConfig::new().stack_size(1024).validate().is_err());
        assert!(SelectConfig::new().thread_name("").validate().is_err());
        assert!(SelectConfig::new().empty_park(Duration::ZERO).validate().is_err());
    }

    #[test]
    fn test_parse_idle_and_backend() {
        let d = Duration::from_micros(7);
        assert_eq!(IdleStrategy::parse("SPIN", d), Some(IdleStrategy::Spin));
        assert_eq!(IdleStrategy::parse("sleep", d), Some(IdleStrategy::Sleep(d)));
        assert_eq!(IdleStrategy::parse("nap", d), None);

        assert_eq!("poll".parse::<Backend>().unwrap(), Backend::Poll);
        assert!("epoll".parse::<Backend>().is_err());
    }

    #[test]
    fn test_env_override() {
        std::env::set_var("BAL_BACKEND", "poll");
        std::env::set_var("BAL_IDLE", "sleep");
        std::env::set_var("BAL_IDLE_SLEEP_US", "250");
        let config = SelectConfig::from_env();
        assert_eq!(config.backend, Backend::Poll);
        assert_eq!(config.idle, IdleStrategy::Sleep(Duration::from_micros(250)));
        std::env::remove_var("BAL_BACKEND");
        std::env::remove_var("BAL_IDLE");
        std::env::remove_var("BAL_IDLE_SLEEP_US");
    }
}
