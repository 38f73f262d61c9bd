//! # bal - Basic Abstraction Layer for sockets
//!
//! Thin socket handles plus a callback-driven readiness notifier: register
//! a socket with an interest mask and a callback, and a single background
//! poller thread tells you when it can accept, read, write, finished
//! connecting, or was closed by the peer.
//!
//! ## Features
//!
//! - **One thread for all sockets**: a zero-timeout `select(2)` (or
//!   `poll(2)`) loop over every registered socket
//! - **Semantic events**: `ACCEPT`, `CLOSE`, `CONNECT` and `CONNECT_FAILED`
//!   are derived from raw readiness, not left to the caller
//! - **Re-entrant**: callbacks may register, update, release and shut
//!   down; the change takes effect when the current cycle ends
//! - **Lazy**: nothing runs until the first registration
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use bal::{async_select, cleanup, Event, Interest, Socket};
//!
//! let listener = Arc::new(Socket::auto("localhost", "7777", bal::Type::STREAM)?.0);
//! listener.listen(16)?;
//!
//! async_select(&listener, |s, ev| {
//!     if ev == Event::Accept {
//!         if let Ok((client, peer)) = s.accept() {
//!             bal::bal_info!("connection from {}", peer);
//!             // async_select(&Arc::new(client), ..., Interest::NORMAL)
//!         }
//!     }
//! }, Interest::NORMAL)?;
//!
//! // ...
//! cleanup()?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     bal (this crate)                         │
//! │    async_select / async_release / cleanup (process-wide)     │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!               ┌───────────────┴───────────────┐
//!               ▼                               ▼
//! ┌─────────────────────────────┐ ┌─────────────────────────────┐
//! │         bal-select          │ │         bal-socket          │
//! │  AsyncSelect, WatchList,    │ │  Socket (socket2), probes,  │
//! │  Multiplexer, dispatcher    │ │  resolve_host, AddrList     │
//! └─────────────────────────────┘ └─────────────────────────────┘
//!               │                               │
//!               └───────────────┬───────────────┘
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         bal-core                             │
//! │   Event, Interest, AsyncSocket, BalError, logging, env       │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod facade;

pub use facade::{
    async_add_interest,
    async_is_watched,
    async_release,
    async_remove_interest,
    async_select,
    async_state,
    async_stats,
    cleanup,
    configure,
    init,
};

// Re-export core types
pub use bal_core::{
    AsyncSocket,
    BalError,
    BalResult,
    ConfigError,
    Descriptor,
    Event,
    Interest,
    PeekStatus,
    SocketFlags,
    INVALID_DESCRIPTOR,
};

// Re-export logging macros
pub use bal_core::{bal_debug, bal_error, bal_info, bal_trace, bal_warn};
pub use bal_core::log::{LogLevel, set_flush_enabled, set_log_level};
pub use bal_core::{env_get, env_get_bool, env_get_opt, env_get_str};

// Re-export sockets
pub use bal_socket::{resolve_host, AddrList, AddrStrings, Domain, Protocol, Shutdown, Socket, Type};

// Re-export the poller for callers that want their own instance
pub use bal_select::{
    AsyncSelect,
    Backend,
    IdleStrategy,
    Multiplexer,
    PollerState,
    SelectConfig,
    StatsSnapshot,
};
