//! Library defaults for `SelectConfig`.
//!
//! Every value can be overridden at runtime through the matching `BAL_*`
//! environment variable (see `SelectConfig::from_env`).

/// Watch list bound. Clamped to the multiplexer's own bound at start.
pub const MAX_ENTRIES: usize = 1023;

/// Inter-cycle pause: "yield", "spin" or "sleep".
pub const IDLE: &str = "yield";

/// Sleep between cycles when `IDLE` is "sleep".
pub const IDLE_SLEEP_US: u64 = 100;

/// Park timeout while the watch list is empty.
pub const EMPTY_PARK_MS: u64 = 100;

/// Multiplexer: "select" or "poll".
pub const BACKEND: &str = "select";

/// Bound used by the poll backend.
pub const POLL_CAPACITY: usize = 65535;

/// Poller thread name.
pub const THREAD_NAME: &str = "bal-poller";

/// Poller thread stack size.
pub const STACK_SIZE: usize = 256 * 1024;
