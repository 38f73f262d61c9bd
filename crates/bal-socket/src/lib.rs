//! # bal-socket - socket handles for bal
//!
//! One-call-per-syscall wrappers over BSD sockets, built on `socket2`.
//! A [`Socket`] carries the descriptor, its family/type/protocol and the
//! [`SocketFlags`](bal_core::SocketFlags) the poller reads. It implements
//! [`AsyncSocket`](bal_core::AsyncSocket), so an `Arc<Socket>` can be
//! registered with `bal-select` directly.
//!
//! ```ignore
//! use bal_socket::{Socket, resolve_host};
//!
//! let s = Socket::stream_for(&resolve_host("localhost", "8080")?)?;
//! s.set_reuse_addr(true)?;
//! s.bind_all(8080)?;
//! s.listen(libc::SOMAXCONN)?;
//! ```

pub mod socket;
pub mod addr;
mod probe;

pub use socket::Socket;
pub use addr::{resolve_host, name_info, AddrList, AddrStrings};
pub use socket2::{Domain, Protocol, Type};
pub use std::net::Shutdown;
