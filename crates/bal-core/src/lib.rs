//! # bal-core
//!
//! Core types for the bal sockets abstraction layer.
//!
//! This crate is platform-agnostic and performs no I/O. The socket
//! wrappers live in `bal-socket`; the asynchronous notification
//! subsystem lives in `bal-select`.
//!
//! ## Modules
//!
//! - `event` - Event codes delivered to callbacks, interest masks
//! - `socket` - The contract a socket handle offers the poller
//! - `error` - Error types
//! - `log` - Leveled stderr logging macros
//! - `env` - Environment variable utilities

pub mod event;
pub mod socket;
pub mod error;
pub mod log;
pub mod env;

// Re-exports for convenience
pub use event::{Event, Interest};
pub use socket::{AsyncSocket, Descriptor, PeekStatus, SocketFlags, INVALID_DESCRIPTOR};
pub use error::{BalError, BalResult, ConfigError};
pub use env::{env_get, env_get_bool, env_get_opt, env_get_str};
