//! Event codes and interest masks.
//!
//! An [`Event`] is what a callback receives. An [`Interest`] is what a
//! caller asks for when registering a socket. Interest bits share their
//! values with the event codes, so `Interest::from(Event::Read)` is the
//! bit a caller sets to be told about reads.
//!
//! Events group into three classes, one per readiness set:
//!
//! | class  | events                               | readiness set |
//! |--------|--------------------------------------|---------------|
//! | read   | `Read`, `Accept`, `Close`            | read          |
//! | write  | `Write`, `Connect`, `ConnectFailed`  | write         |
//! | except | `Exception`, `ConnectFailed`         | except        |

use core::fmt;
use core::ops::{BitAnd, BitOr, BitOrAssign, Not, Sub};

/// A classified readiness event for one socket.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    /// Data is available to read.
    Read = 0x0000_0001,
    /// The socket can be written without blocking.
    Write = 0x0000_0002,
    /// A non-blocking connect completed.
    Connect = 0x0000_0004,
    /// A listening socket has a connection waiting in its backlog.
    Accept = 0x0000_0008,
    /// The peer closed the connection, or it is no longer valid.
    Close = 0x0000_0010,
    /// A non-blocking connect failed.
    ConnectFailed = 0x0000_0020,
    /// An exceptional condition (out-of-band data, error state).
    Exception = 0x0000_0040,
}

impl Event {
    /// All events, in code order.
    pub const ALL: [Event; 7] = [
        Event::Read,
        Event::Write,
        Event::Connect,
        Event::Accept,
        Event::Close,
        Event::ConnectFailed,
        Event::Exception,
    ];

    /// Numeric event code.
    #[inline]
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Reverse of [`code`](Self::code).
    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|e| e.code() == code)
    }

    pub fn name(self) -> &'static str {
        match self {
            Event::Read => "READ",
            Event::Write => "WRITE",
            Event::Connect => "CONNECT",
            Event::Accept => "ACCEPT",
            Event::Close => "CLOSE",
            Event::ConnectFailed => "CONNECT_FAILED",
            Event::Exception => "EXCEPTION",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Bitmask of event classes a caller wants reported for a socket.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Interest(u32);

impl Interest {
    pub const NONE: Self = Self(0);
    pub const READ: Self = Self(Event::Read as u32);
    pub const WRITE: Self = Self(Event::Write as u32);
    pub const CONNECT: Self = Self(Event::Connect as u32);
    pub const ACCEPT: Self = Self(Event::Accept as u32);
    pub const CLOSE: Self = Self(Event::Close as u32);
    pub const CONNECT_FAILED: Self = Self(Event::ConnectFailed as u32);
    pub const EXCEPTION: Self = Self(Event::Exception as u32);
    pub const ALL: Self = Self(0x0000_007F);

    /// Everything except plain write readiness (servers, idle clients).
    pub const NORMAL: Self = Self(Self::ALL.0 & !Self::WRITE.0);

    const READ_CLASS: u32 = Self::READ.0 | Self::ACCEPT.0 | Self::CLOSE.0;

    /// Build from raw bits; bits outside [`ALL`](Self::ALL) are dropped.
    #[inline]
    pub const fn from_bits_truncate(bits: u32) -> Self {
        Self(bits & Self::ALL.0)
    }

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Whether the read readiness set is of interest.
    #[inline]
    pub const fn wants_read_class(self) -> bool {
        self.0 & Self::READ_CLASS != 0
    }

    #[inline]
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    #[inline]
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl From<Event> for Interest {
    fn from(e: Event) -> Self {
        Self(e.code())
    }
}

impl BitOr for Interest {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Interest {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Interest {
    type Output = Self;
    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl Sub for Interest {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self(self.0 & !rhs.0)
    }
}

impl Not for Interest {
    type Output = Self;
    fn not(self) -> Self {
        Self(!self.0 & Self::ALL.0)
    }
}

impl fmt::Debug for Interest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "Interest(NONE)");
        }
        write!(f, "Interest(")?;
        let mut first = true;
        for e in Event::ALL {
            if self.contains(Interest::from(e)) {
                if !first {
                    write!(f, " | ")?;
                }
                write!(f, "{}", e.name())?;
                first = false;
            }
        }
        write!(f, ")")
    }
}

impl fmt::Display for Interest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_codes_roundtrip() {
        for e in Event::ALL {
            assert_eq!(Event::from_code(e.code()), Some(e));
        }
        assert_eq!(Event::from_code(0x80), None);
    }

    #[test]
    fn test_interest_classes() {
        assert!(Interest::READ.wants_read_class());
        assert!(Interest::ACCEPT.wants_read_class());
        assert!(!Interest::CONNECT.wants_read_class());
        assert!(!Interest::EXCEPTION.wants_read_class());
    }

    #[test]
    fn test_normal_excludes_write() {
        assert!(!Interest::NORMAL.contains(Interest::WRITE));
        assert!(Interest::NORMAL.contains(Interest::READ | Interest::CONNECT));
        assert!(Interest::NORMAL.wants_read_class());
    }

    #[test]
    fn test_insert_remove() {
        let mut i = Interest::READ;
        i.insert(Interest::WRITE);
        assert!(i.contains(Interest::READ | Interest::WRITE));
        i.remove(Interest::READ);
        assert_eq!(i, Interest::WRITE);
        assert_eq!(Interest::ALL - Interest::ALL, Interest::NONE);
        assert_eq!(!Interest::ALL, Interest::NONE);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(Interest::from_bits_truncate(0xFFFF_FFFF), Interest::ALL);
    }

    #[test]
    fn test_debug_format() {
        let s = format!("{:?}", Interest::READ | Interest::CLOSE);
        assert_eq!(s, "Interest(READ | CLOSE)");
        assert_eq!(format!("{:?}", Interest::NONE), "Interest(NONE)");
    }
}
