//! The socket handle.
//!
//! Every method is a thin wrapper over one socket call. Methods take
//! `&self` so a handle can live in an `Arc` shared with the poller while
//! the owner keeps using it from callbacks.

use std::io::{self, Read, Write};
use std::mem::MaybeUninit;
use std::net::{Ipv4Addr, Ipv6Addr, Shutdown, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::time::Duration;

use socket2::{Domain, Protocol, SockAddr, Type};

use bal_core::{bal_debug, bal_warn};
use bal_core::{AsyncSocket, BalError, BalResult, Descriptor, PeekStatus, SocketFlags};

use crate::addr::{resolve_host, AddrList, AddrStrings};
use crate::probe;

/// A socket descriptor plus the state the poller cares about.
pub struct Socket {
    inner: socket2::Socket,
    domain: Domain,
    ty: Type,
    protocol: Option<Protocol>,
    flags: SocketFlags,
}

impl Socket {
    /// Create a socket (`socket(2)`).
    pub fn new(domain: Domain, ty: Type, protocol: Option<Protocol>) -> BalResult<Self> {
        let inner = socket2::Socket::new(domain, ty, protocol)?;
        Ok(Self::wrap(inner, domain, ty, protocol))
    }

    /// Create a stream socket matching the family of the first resolved
    /// address.
    pub fn stream_for(addrs: &AddrList) -> BalResult<Self> {
        let first = addrs
            .first()
            .ok_or(BalError::InvalidArgument("empty address list"))?;
        Self::new(Domain::for_address(*first), Type::STREAM, Some(Protocol::TCP))
    }

    /// Resolve `host`/`port` and create a socket of type `ty` whose
    /// family matches the first result.
    pub fn auto(host: &str, port: &str, ty: Type) -> BalResult<(Self, AddrList)> {
        let addrs = resolve_host(host, port)?;
        let first = addrs
            .first()
            .ok_or(BalError::InvalidArgument("empty address list"))?;
        let protocol = if ty == Type::DGRAM { Protocol::UDP } else { Protocol::TCP };
        let s = Self::new(Domain::for_address(*first), ty, Some(protocol))?;
        Ok((s, addrs))
    }

    fn wrap(inner: socket2::Socket, domain: Domain, ty: Type, protocol: Option<Protocol>) -> Self {
        Self {
            inner,
            domain,
            ty,
            protocol,
            flags: SocketFlags::new(),
        }
    }

    pub fn domain(&self) -> Domain {
        self.domain
    }

    pub fn socket_type(&self) -> Type {
        self.ty
    }

    pub fn protocol(&self) -> Option<Protocol> {
        self.protocol
    }

    /// Borrow the underlying `socket2` socket for calls not wrapped here.
    pub fn as_socket2(&self) -> &socket2::Socket {
        &self.inner
    }

    // ── Connection setup ─────────────────────────────────────────────

    pub fn bind(&self, addr: &SocketAddr) -> BalResult<()> {
        self.inner.bind(&SockAddr::from(*addr))?;
        Ok(())
    }

    /// Bind to the first address `host`/`port` resolves to.
    pub fn bind_host(&self, host: &str, port: &str) -> BalResult<()> {
        let mut addrs = resolve_host(host, port)?;
        let mut last = BalError::InvalidArgument("no address to bind");
        while let Some(addr) = addrs.next_addr() {
            match self.bind(&addr) {
                Ok(()) => return Ok(()),
                Err(e) => last = e,
            }
        }
        Err(last)
    }

    /// Bind to the wildcard address of this socket's family.
    pub fn bind_all(&self, port: u16) -> BalResult<()> {
        let addr = if self.domain == Domain::IPV6 {
            SocketAddr::V6(SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, port, 0, 0))
        } else {
            SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port))
        };
        self.bind(&addr)
    }

    /// `listen(2)`; marks the socket as listening.
    pub fn listen(&self, backlog: i32) -> BalResult<()> {
        self.inner.listen(backlog)?;
        self.flags.set(SocketFlags::LISTENING);
        Ok(())
    }

    /// Accept one pending connection.
    pub fn accept(&self) -> BalResult<(Socket, SocketAddr)> {
        let (inner, addr) = self.inner.accept()?;
        let addr = addr
            .as_socket()
            .ok_or(BalError::InvalidArgument("peer address is not an IP address"))?;
        Ok((Self::wrap(inner, self.domain, self.ty, self.protocol), addr))
    }

    /// Blocking connect.
    pub fn connect(&self, addr: &SocketAddr) -> BalResult<()> {
        self.inner.connect(&SockAddr::from(*addr))?;
        Ok(())
    }

    /// Resolve `host`/`port` and connect to the first address that accepts.
    pub fn connect_host(&self, host: &str, port: &str) -> BalResult<()> {
        let mut addrs = resolve_host(host, port)?;
        let mut last = BalError::InvalidArgument("no address to connect to");
        while let Some(addr) = addrs.next_addr() {
            match self.connect(&addr) {
                Ok(()) => return Ok(()),
                Err(e) => last = e,
            }
        }
        Err(last)
    }

    /// Non-blocking connect.
    ///
    /// Puts the socket in non-blocking mode and starts the connect. When
    /// it is in progress (or completed at once) the pending-connect flag
    /// is set; the poller reports the outcome as `Connect` or
    /// `ConnectFailed`.
    pub fn connect_nonblocking(&self, addr: &SocketAddr) -> BalResult<()> {
        self.inner.set_nonblocking(true)?;
        match self.inner.connect(&SockAddr::from(*addr)) {
            Ok(()) => {}
            Err(e) if in_progress(&e) => {}
            Err(e) => return Err(e.into()),
        }
        self.flags.set(SocketFlags::PENDING_CONNECT);
        bal_debug!("socket {} connecting to {}", self.descriptor(), addr);
        Ok(())
    }

    /// Try each remaining address in `addrs` with a non-blocking connect
    /// until one is started.
    pub fn connect_addr_list(&self, addrs: &mut AddrList) -> BalResult<SocketAddr> {
        let mut last = BalError::InvalidArgument("address list exhausted");
        while let Some(addr) = addrs.next_addr() {
            match self.connect_nonblocking(&addr) {
                Ok(()) => return Ok(addr),
                Err(e) => {
                    bal_debug!("connect to {} failed: {}", addr, e);
                    last = e;
                }
            }
        }
        Err(last)
    }

    pub fn shutdown(&self, how: Shutdown) -> BalResult<()> {
        self.inner.shutdown(how)?;
        Ok(())
    }

    /// Close the descriptor, reporting any error from `close(2)`.
    ///
    /// Dropping a `Socket` also closes it, silently.
    #[cfg(unix)]
    pub fn close(self) -> BalResult<()> {
        use std::os::unix::io::IntoRawFd;

        let fd = self.inner.into_raw_fd();
        if unsafe { libc::close(fd) } != 0 {
            return Err(BalError::last_os_error());
        }
        Ok(())
    }

    // ── Data transfer ────────────────────────────────────────────────

    pub fn send(&self, buf: &[u8]) -> BalResult<usize> {
        Ok((&self.inner).write(buf)?)
    }

    /// Send with explicit `MSG_*` flags.
    pub fn send_with_flags(&self, buf: &[u8], flags: i32) -> BalResult<usize> {
        Ok(self.inner.send_with_flags(buf, flags)?)
    }

    pub fn recv(&self, buf: &mut [u8]) -> BalResult<usize> {
        Ok((&self.inner).read(buf)?)
    }

    pub fn send_to(&self, buf: &[u8], addr: &SocketAddr) -> BalResult<usize> {
        Ok(self.inner.send_to(buf, &SockAddr::from(*addr))?)
    }

    pub fn recv_from(&self, buf: &mut [u8]) -> BalResult<(usize, Option<SocketAddr>)> {
        let (n, from) = self.inner.recv_from(as_uninit(buf))?;
        Ok((n, from.as_socket()))
    }

    /// Resolve `host`/`port` and send one datagram to the first address.
    pub fn send_to_host(&self, buf: &[u8], host: &str, port: &str) -> BalResult<usize> {
        let addrs = resolve_host(host, port)?;
        let addr = addrs
            .first()
            .ok_or(BalError::InvalidArgument("empty address list"))?;
        self.send_to(buf, addr)
    }

    // ── Options ──────────────────────────────────────────────────────

    pub fn set_reuse_addr(&self, on: bool) -> BalResult<()> {
        Ok(self.inner.set_reuse_address(on)?)
    }

    pub fn reuse_addr(&self) -> BalResult<bool> {
        Ok(self.inner.reuse_address()?)
    }

    pub fn set_keepalive(&self, on: bool) -> BalResult<()> {
        Ok(self.inner.set_keepalive(on)?)
    }

    pub fn keepalive(&self) -> BalResult<bool> {
        Ok(self.inner.keepalive()?)
    }

    pub fn set_broadcast(&self, on: bool) -> BalResult<()> {
        Ok(self.inner.set_broadcast(on)?)
    }

    pub fn broadcast(&self) -> BalResult<bool> {
        Ok(self.inner.broadcast()?)
    }

    pub fn set_oob_inline(&self, on: bool) -> BalResult<()> {
        Ok(self.inner.set_out_of_band_inline(on)?)
    }

    pub fn oob_inline(&self) -> BalResult<bool> {
        Ok(self.inner.out_of_band_inline()?)
    }

    /// `None` disables lingering.
    pub fn set_linger(&self, linger: Option<Duration>) -> BalResult<()> {
        Ok(self.inner.set_linger(linger)?)
    }

    pub fn linger(&self) -> BalResult<Option<Duration>> {
        Ok(self.inner.linger()?)
    }

    pub fn set_send_buffer_size(&self, size: usize) -> BalResult<()> {
        Ok(self.inner.set_send_buffer_size(size)?)
    }

    pub fn send_buffer_size(&self) -> BalResult<usize> {
        Ok(self.inner.send_buffer_size()?)
    }

    pub fn set_recv_buffer_size(&self, size: usize) -> BalResult<()> {
        Ok(self.inner.set_recv_buffer_size(size)?)
    }

    pub fn recv_buffer_size(&self) -> BalResult<usize> {
        Ok(self.inner.recv_buffer_size()?)
    }

    pub fn set_send_timeout(&self, timeout: Option<Duration>) -> BalResult<()> {
        Ok(self.inner.set_write_timeout(timeout)?)
    }

    pub fn send_timeout(&self) -> BalResult<Option<Duration>> {
        Ok(self.inner.write_timeout()?)
    }

    pub fn set_recv_timeout(&self, timeout: Option<Duration>) -> BalResult<()> {
        Ok(self.inner.set_read_timeout(timeout)?)
    }

    pub fn recv_timeout(&self) -> BalResult<Option<Duration>> {
        Ok(self.inner.read_timeout()?)
    }

    pub fn set_nodelay(&self, on: bool) -> BalResult<()> {
        Ok(self.inner.set_nodelay(on)?)
    }

    /// Pending socket error (`SO_ERROR`) as a raw OS code; reading it
    /// clears it.
    pub fn pending_error(&self) -> BalResult<Option<i32>> {
        Ok(self
            .inner
            .take_error()?
            .map(|e| e.raw_os_error().unwrap_or(-1)))
    }

    // ── Addresses ────────────────────────────────────────────────────

    pub fn local_addr(&self) -> BalResult<SocketAddr> {
        self.inner
            .local_addr()?
            .as_socket()
            .ok_or(BalError::InvalidArgument("local address is not an IP address"))
    }

    pub fn peer_addr(&self) -> BalResult<SocketAddr> {
        self.inner
            .peer_addr()?
            .as_socket()
            .ok_or(BalError::InvalidArgument("peer address is not an IP address"))
    }

    pub fn local_strings(&self, dns: bool) -> BalResult<AddrStrings> {
        Ok(AddrStrings::new(&self.local_addr()?, dns))
    }

    pub fn peer_strings(&self, dns: bool) -> BalResult<AddrStrings> {
        Ok(AddrStrings::new(&self.peer_addr()?, dns))
    }
}

impl AsyncSocket for Socket {
    fn descriptor(&self) -> Descriptor {
        raw_descriptor(&self.inner)
    }

    fn flags(&self) -> &SocketFlags {
        &self.flags
    }

    fn peek(&self) -> PeekStatus {
        let mut byte = [MaybeUninit::<u8>::uninit(); 1];
        probe::classify(self.inner.recv_with_flags(&mut byte, PEEK_FLAGS))
    }

    fn set_nonblocking(&self, nonblocking: bool) -> BalResult<()> {
        Ok(self.inner.set_nonblocking(nonblocking)?)
    }

    fn take_error(&self) -> Option<i32> {
        match self.pending_error() {
            Ok(code) => code,
            Err(e) => {
                bal_warn!("SO_ERROR query failed on socket {}: {}", self.descriptor(), e);
                e.os_code()
            }
        }
    }
}

impl std::fmt::Debug for Socket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Socket")
            .field("sd", &self.descriptor())
            .field("domain", &self.domain)
            .field("type", &self.ty)
            .field("protocol", &self.protocol)
            .field("flags", &format_args!("{:08x}", self.flags.bits()))
            .finish()
    }
}

fn in_progress(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock || e.raw_os_error() == Some(EINPROGRESS)
}

// A u8 buffer viewed as possibly-uninitialized bytes; recv only writes.
fn as_uninit(buf: &mut [u8]) -> &mut [MaybeUninit<u8>] {
    unsafe { &mut *(buf as *mut [u8] as *mut [MaybeUninit<u8>]) }
}

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        const PEEK_FLAGS: i32 = libc::MSG_PEEK | libc::MSG_DONTWAIT;
        const EINPROGRESS: i32 = libc::EINPROGRESS;

        fn raw_descriptor(s: &socket2::Socket) -> Descriptor {
            use std::os::unix::io::AsRawFd;
            s.as_raw_fd()
        }
    } else if #[cfg(windows)] {
        // MSG_PEEK; registered sockets are already non-blocking
        const PEEK_FLAGS: i32 = 0x2;
        // WSAEWOULDBLOCK is already mapped to WouldBlock
        const EINPROGRESS: i32 = 10036;

        fn raw_descriptor(s: &socket2::Socket) -> Descriptor {
            use std::os::windows::io::AsRawSocket;
            s.as_raw_socket() as Descriptor
        }
    }
}
