//! # bal-select - asynchronous socket notification
//!
//! Register a socket with an interest mask and a callback; a background
//! poller thread reports readiness as semantic events, one callback call
//! per event, without a thread per socket.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │  caller threads                                             │
//! │   register_or_update / unregister / add_interest / shutdown │
//! └──────────────────────┬─────────────────────────────────────┘
//!                        │ lock (or deferred queue from callbacks)
//!                        ▼
//! ┌────────────────────────────────────────────────────────────┐
//! │  WatchList  (arena, one entry per descriptor, cursor)       │
//! └──────────────────────┬─────────────────────────────────────┘
//!                        │ same lock, held for a whole cycle
//! ┌──────────────────────▼─────────────────────────────────────┐
//! │  poller thread                                              │
//! │   build read/write/except sets → Multiplexer::poll(0)       │
//! │   dispatch read → write → except → callbacks                │
//! │   apply deferred calls → unlock → IdleStrategy pause        │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use bal_core::{Event, Interest};
//! use bal_select::{AsyncSelect, SelectConfig};
//! use bal_socket::Socket;
//!
//! let poller: AsyncSelect<Socket> = AsyncSelect::new(SelectConfig::from_env());
//! let listener = Arc::new(listener_socket);
//! poller.register_or_update(&listener, |s, ev| {
//!     if ev == Event::Accept {
//!         let (client, _) = s.accept().unwrap();
//!         // ...
//!     }
//! }, Interest::NORMAL)?;
//! // ...
//! poller.shutdown()?;
//! ```
//!
//! ## Modules
//!
//! - `watch_list` - Registered sockets, generational arena with a cursor
//! - `fdset` - Portable descriptor sets
//! - `mux` - Multiplexer trait, `select(2)` and `poll(2)` backends
//! - `dispatch` - Readiness to event classification
//! - `poller` - `AsyncSelect` handle and the poller thread
//! - `config` - `SelectConfig` with env overrides
//! - `stats` - Poller counters

#[cfg(not(unix))]
compile_error!("bal-select currently supports unix targets only");

pub mod config;
pub mod fdset;
pub mod mux;
pub mod poller;
pub mod stats;
pub mod watch_list;
mod dispatch;

#[cfg(test)]
mod testing;

pub use config::{Backend, IdleStrategy, SelectConfig};
pub use fdset::{DescriptorSet, ReadySets, SetKind};
pub use mux::{Multiplexer, PollMux, SelectMux, SystemMux};
pub use poller::{AsyncSelect, PollerState};
pub use stats::{PollerStats, StatsSnapshot};
pub use watch_list::{Callback, EntryKey, WatchEntry, WatchList};
