//! The socket contract consumed by the poller.
//!
//! The poller never creates, closes or frees sockets. It needs only the
//! handful of capabilities in [`AsyncSocket`]: the descriptor, the flag
//! bits, a non-consuming receive probe, the blocking-mode toggle and the
//! pending socket error.
//!
//! # Implementors
//!
//! - `bal_socket::Socket` (default): a `socket2` socket with atomic flags.
//! - Test doubles in `bal-select` that script peek results.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::error::BalResult;

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        /// OS socket descriptor.
        pub type Descriptor = i32;
        /// Value of a descriptor that refers to nothing.
        pub const INVALID_DESCRIPTOR: Descriptor = -1;
    } else if #[cfg(windows)] {
        /// OS socket descriptor (`SOCKET`).
        pub type Descriptor = usize;
        /// `INVALID_SOCKET`.
        pub const INVALID_DESCRIPTOR: Descriptor = !0;
    }
}

/// Flag bits shared between the socket layer and the poller.
///
/// The socket layer sets `PENDING_CONNECT` when it issues a non-blocking
/// connect and `LISTENING` on listen. The poller consumes
/// `PENDING_CONNECT` at the first poll cycle after it is set.
#[derive(Debug, Default)]
pub struct SocketFlags(AtomicU32);

impl SocketFlags {
    /// A non-blocking connect was issued and has not been resolved.
    pub const PENDING_CONNECT: u32 = 0x0000_0001;
    /// The socket is listening for connections.
    pub const LISTENING: u32 = 0x0000_0002;

    pub const fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    #[inline]
    pub fn bits(&self) -> u32 {
        self.0.load(Ordering::Acquire)
    }

    #[inline]
    pub fn contains(&self, bits: u32) -> bool {
        self.bits() & bits == bits
    }

    #[inline]
    pub fn set(&self, bits: u32) {
        self.0.fetch_or(bits, Ordering::AcqRel);
    }

    #[inline]
    pub fn clear(&self, bits: u32) {
        self.0.fetch_and(!bits, Ordering::AcqRel);
    }

    /// Clear `bits`, returning whether all of them were set.
    #[inline]
    pub fn take(&self, bits: u32) -> bool {
        self.0.fetch_and(!bits, Ordering::AcqRel) & bits == bits
    }
}

/// Result of a non-consuming, non-blocking one-byte receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeekStatus {
    /// At least one byte is waiting.
    Readable,
    /// Nothing to read yet; the connection is fine.
    WouldBlock,
    /// Zero-length receive: the peer performed an orderly shutdown.
    PeerClosed,
    /// The connection is no longer valid (not connected, bad descriptor,
    /// not a socket, reset, aborted, network down). Carries the OS code.
    Broken(i32),
    /// Any other receive error. Carries the OS code.
    Failed(i32),
}

impl PeekStatus {
    /// Whether the probe means the circuit is closed.
    #[inline]
    pub fn is_closed(self) -> bool {
        matches!(self, PeekStatus::PeerClosed | PeekStatus::Broken(_))
    }
}

/// Capabilities the poller requires from a socket handle.
///
/// Handles are shared (`Arc<S>`) between the caller and the poller, so
/// every method takes `&self`.
pub trait AsyncSocket: Send + Sync + 'static {
    /// The OS descriptor. Unique while the socket is open.
    fn descriptor(&self) -> Descriptor;

    /// Flag bits for pending-connect / listening state.
    fn flags(&self) -> &SocketFlags;

    /// Probe the receive queue without consuming data.
    fn peek(&self) -> PeekStatus;

    /// Toggle non-blocking mode.
    fn set_nonblocking(&self, nonblocking: bool) -> BalResult<()>;

    /// Consume the pending socket error (`SO_ERROR`), if any.
    fn take_error(&self) -> Option<i32> {
        None
    }

    #[inline]
    fn is_listening(&self) -> bool {
        self.flags().contains(SocketFlags::LISTENING)
    }

    /// Consume the pending-connect flag; true if it was set.
    #[inline]
    fn take_pending_connect(&self) -> bool {
        self.flags().take(SocketFlags::PENDING_CONNECT)
    }
}
