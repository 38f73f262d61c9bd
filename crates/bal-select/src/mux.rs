//! Readiness multiplexing abstraction.
//!
//! A `Multiplexer` answers one question per cycle: which of these
//! descriptors are readable, writable or exceptional *right now*. It never
//! waits; the poller calls it with what amounts to a zero timeout.
//!
//! # Implementors
//!
//! - `SelectMux` (default): `select(2)`. Portable, bounded by
//!   `FD_SETSIZE`; descriptors at or above it are rejected at
//!   registration.
//! - `PollMux`: `poll(2)`. No descriptor bound. `POLLHUP` is reported as
//!   readable so peer shutdown surfaces on the read pass; `POLLERR`,
//!   `POLLPRI` and `POLLNVAL` are reported as exceptional.
//! - `SystemMux`: either of the above, chosen from `SelectConfig`.
//!
//! Tests substitute a scripted implementation.

use std::io;

use bal_core::{Descriptor, INVALID_DESCRIPTOR};

use crate::config::Backend;
use crate::fdset::ReadySets;

/// Zero-timeout readiness check.
///
/// `Clone` because every poller start takes its own copy; `Send` because
/// that copy moves to the poller thread.
pub trait Multiplexer: Clone + Send + 'static {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Most entries the watch list may hold with this backend.
    fn capacity(&self) -> usize;

    /// Whether `sd` can be represented in this backend's native sets.
    fn accepts(&self, sd: Descriptor) -> bool;

    /// Check `interest` without blocking and write the ready descriptors
    /// into `ready` (cleared first). `max_sd` is the largest descriptor in
    /// any interest set.
    ///
    /// Returns the number of ready descriptors, counting a descriptor
    /// once per set it appears in.
    fn poll(
        &mut self,
        interest: &ReadySets,
        max_sd: Descriptor,
        ready: &mut ReadySets,
    ) -> io::Result<usize>;
}

// ── select(2) ────────────────────────────────────────────────────────

/// `select(2)` with a zero `timeval`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectMux;

impl SelectMux {
    pub fn new() -> Self {
        SelectMux
    }
}

impl Multiplexer for SelectMux {
    fn name(&self) -> &'static str {
        "select"
    }

    /// One slot of headroom below `FD_SETSIZE`.
    fn capacity(&self) -> usize {
        libc::FD_SETSIZE - 1
    }

    fn accepts(&self, sd: Descriptor) -> bool {
        sd >= 0 && (sd as usize) < libc::FD_SETSIZE
    }

    fn poll(
        &mut self,
        interest: &ReadySets,
        max_sd: Descriptor,
        ready: &mut ReadySets,
    ) -> io::Result<usize> {
        ready.clear();
        if max_sd == INVALID_DESCRIPTOR {
            return Ok(0);
        }

        let mut rd = native::FdSet::from_set(&interest.read);
        let mut wr = native::FdSet::from_set(&interest.write);
        let mut ex = native::FdSet::from_set(&interest.except);
        let mut tv = libc::timeval { tv_sec: 0, tv_usec: 0 };

        let rc = unsafe {
            libc::select(max_sd + 1, rd.as_mut_ptr(), wr.as_mut_ptr(), ex.as_mut_ptr(), &mut tv)
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        if rc == 0 {
            return Ok(0);
        }

        rd.collect_into(&interest.read, &mut ready.read);
        wr.collect_into(&interest.write, &mut ready.write);
        ex.collect_into(&interest.except, &mut ready.except);
        Ok(rc as usize)
    }
}

mod native {
    use std::mem::MaybeUninit;

    use crate::fdset::DescriptorSet;

    /// A `libc::fd_set` filled from a [`DescriptorSet`].
    pub(super) struct FdSet(libc::fd_set);

    impl FdSet {
        pub(super) fn from_set(set: &DescriptorSet) -> Self {
            let mut raw = MaybeUninit::<libc::fd_set>::zeroed();
            unsafe {
                libc::FD_ZERO(raw.as_mut_ptr());
                for sd in set.iter() {
                    libc::FD_SET(sd, raw.as_mut_ptr());
                }
                FdSet(raw.assume_init())
            }
        }

        pub(super) fn as_mut_ptr(&mut self) -> *mut libc::fd_set {
            &mut self.0
        }

        /// Copy the members of `asked` that the kernel left set.
        pub(super) fn collect_into(&self, asked: &DescriptorSet, out: &mut DescriptorSet) {
            for sd in asked.iter() {
                if unsafe { libc::FD_ISSET(sd, &self.0) } {
                    out.insert(sd);
                }
            }
        }
    }
}

// ── poll(2) ──────────────────────────────────────────────────────────

/// `poll(2)` with a zero timeout.
#[derive(Clone)]
pub struct PollMux {
    capacity: usize,
    fds: Vec<libc::pollfd>,
}

impl PollMux {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            fds: Vec::new(),
        }
    }
}

impl std::fmt::Debug for PollMux {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollMux").field("capacity", &self.capacity).finish()
    }
}

impl Default for PollMux {
    fn default() -> Self {
        Self::new(crate::config::defaults::POLL_CAPACITY)
    }
}

impl Multiplexer for PollMux {
    fn name(&self) -> &'static str {
        "poll"
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn accepts(&self, sd: Descriptor) -> bool {
        sd >= 0
    }

    fn poll(
        &mut self,
        interest: &ReadySets,
        _max_sd: Descriptor,
        ready: &mut ReadySets,
    ) -> io::Result<usize> {
        ready.clear();

        let mut all = interest.read.clone();
        all.union_with(&interest.write);
        all.union_with(&interest.except);

        self.fds.clear();
        for sd in all.iter() {
            let mut events: libc::c_short = 0;
            if interest.read.contains(sd) {
                events |= libc::POLLIN;
            }
            if interest.write.contains(sd) {
                events |= libc::POLLOUT;
            }
            if interest.except.contains(sd) {
                events |= libc::POLLPRI;
            }
            self.fds.push(libc::pollfd { fd: sd, events, revents: 0 });
        }
        if self.fds.is_empty() {
            return Ok(0);
        }

        let rc = unsafe { libc::poll(self.fds.as_mut_ptr(), self.fds.len() as libc::nfds_t, 0) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }

        let mut count = 0;
        for p in self.fds.iter().filter(|p| p.revents != 0) {
            if interest.read.contains(p.fd) && p.revents & (libc::POLLIN | libc::POLLHUP) != 0 {
                ready.read.insert(p.fd);
                count += 1;
            }
            if interest.write.contains(p.fd) && p.revents & libc::POLLOUT != 0 {
                ready.write.insert(p.fd);
                count += 1;
            }
            if interest.except.contains(p.fd)
                && p.revents & (libc::POLLPRI | libc::POLLERR | libc::POLLNVAL) != 0
            {
                ready.except.insert(p.fd);
                count += 1;
            }
        }
        Ok(count)
    }
}

// ── configured backend ───────────────────────────────────────────────

/// The backend named by `SelectConfig::backend`.
#[derive(Debug, Clone)]
pub enum SystemMux {
    Select(SelectMux),
    Poll(PollMux),
}

impl SystemMux {
    pub fn new(backend: Backend, max_entries: usize) -> Self {
        match backend {
            Backend::Select => SystemMux::Select(SelectMux::new()),
            Backend::Poll => SystemMux::Poll(PollMux::new(max_entries)),
        }
    }
}

impl Default for SystemMux {
    fn default() -> Self {
        SystemMux::Select(SelectMux::new())
    }
}

impl Multiplexer for SystemMux {
    fn name(&self) -> &'static str {
        match self {
            SystemMux::Select(m) => m.name(),
            SystemMux::Poll(m) => m.name(),
        }
    }

    fn capacity(&self) -> usize {
        match self {
            SystemMux::Select(m) => m.capacity(),
            SystemMux::Poll(m) => m.capacity(),
        }
    }

    fn accepts(&self, sd: Descriptor) -> bool {
        match self {
            SystemMux::Select(m) => m.accepts(sd),
            SystemMux::Poll(m) => m.accepts(sd),
        }
    }

    fn poll(
        &mut self,
        interest: &ReadySets,
        max_sd: Descriptor,
        ready: &mut ReadySets,
    ) -> io::Result<usize> {
        match self {
            SystemMux::Select(m) => m.poll(interest, max_sd, ready),
            SystemMux::Poll(m) => m.poll(interest, max_sd, ready),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::{TcpListener, TcpStream};
    use std::os::unix::io::AsRawFd;

    fn pair() -> (TcpStream, TcpStream) {
        let l = TcpListener::bind("127.0.0.1:0").unwrap();
        let c = TcpStream::connect(l.local_addr().unwrap()).unwrap();
        let (s, _) = l.accept().unwrap();
        (c, s)
    }

    fn check_backend<M: Multiplexer>(mut mux: M) {
        let (mut c, s) = pair();
        let sd = s.as_raw_fd();

        let mut interest = ReadySets::new();
        interest.read.insert(sd);
        interest.write.insert(sd);
        interest.except.insert(sd);
        let mut ready = ReadySets::new();

        // fresh connection: writable, not readable
        mux.poll(&interest, sd, &mut ready).unwrap();
        assert!(!ready.read.contains(sd));
        assert!(ready.write.contains(sd));

        c.write_all(b"hi").unwrap();
        let mut seen = false;
        for _ in 0..200 {
            mux.poll(&interest, sd, &mut ready).unwrap();
            if ready.read.contains(sd) {
                seen = true;
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        assert!(seen, "{} never reported readable", mux.name());
    }

    #[test]
    fn test_select_reports_readiness() {
        check_backend(SelectMux::new());
    }

    #[test]
    fn test_poll_reports_readiness() {
        check_backend(PollMux::new(64));
    }

    #[test]
    fn test_select_bounds() {
        let m = SelectMux::new();
        assert_eq!(m.capacity(), libc::FD_SETSIZE - 1);
        assert!(m.accepts(0));
        assert!(!m.accepts(-1));
        assert!(!m.accepts(libc::FD_SETSIZE as Descriptor));
    }

    #[test]
    fn test_empty_interest() {
        let mut ready = ReadySets::new();
        let n = SelectMux::new().poll(&ReadySets::new(), INVALID_DESCRIPTOR, &mut ready).unwrap();
        assert_eq!(n, 0);
        let n = PollMux::new(8).poll(&ReadySets::new(), INVALID_DESCRIPTOR, &mut ready).unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn test_system_mux_backend() {
        assert_eq!(SystemMux::new(Backend::Select, 10).name(), "select");
        let m = SystemMux::new(Backend::Poll, 10);
        assert_eq!(m.name(), "poll");
        assert_eq!(m.capacity(), 10);
    }
}
