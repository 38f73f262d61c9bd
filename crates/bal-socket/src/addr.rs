//! Name resolution and address lists.
//!
//! [`resolve_host`] turns a host/port pair into an [`AddrList`], which
//! keeps a cursor so callers can try addresses one at a time and start
//! over with [`AddrList::reset`].

use std::net::{SocketAddr, ToSocketAddrs};

use bal_core::{BalError, BalResult};

/// Resolved addresses with a resettable enumeration cursor.
#[derive(Debug, Clone, Default)]
pub struct AddrList {
    addrs: Vec<SocketAddr>,
    cursor: usize,
}

impl AddrList {
    pub fn new(addrs: Vec<SocketAddr>) -> Self {
        Self { addrs, cursor: 0 }
    }

    /// Next address, or `None` once the list is exhausted.
    pub fn next_addr(&mut self) -> Option<SocketAddr> {
        let addr = self.addrs.get(self.cursor).copied();
        if addr.is_some() {
            self.cursor += 1;
        }
        addr
    }

    /// Rewind the cursor to the first address.
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    pub fn len(&self) -> usize {
        self.addrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }

    pub fn first(&self) -> Option<&SocketAddr> {
        self.addrs.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SocketAddr> {
        self.addrs.iter()
    }
}

impl From<Vec<SocketAddr>> for AddrList {
    fn from(addrs: Vec<SocketAddr>) -> Self {
        Self::new(addrs)
    }
}

/// Resolve `host` and `port` (numeric) to every matching address.
pub fn resolve_host(host: &str, port: &str) -> BalResult<AddrList> {
    let port: u16 = port
        .trim()
        .parse()
        .map_err(|_| BalError::InvalidArgument("port must be numeric"))?;

    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|e| BalError::Resolve {
            host: host.to_string(),
            reason: e.to_string(),
        })?
        .collect();

    if addrs.is_empty() {
        return Err(BalError::Resolve {
            host: host.to_string(),
            reason: "no addresses".into(),
        });
    }
    Ok(AddrList::new(addrs))
}

/// Printable forms of a socket address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddrStrings {
    /// Host name when reverse lookup was requested and succeeded,
    /// otherwise the numeric address.
    pub host: String,
    /// Numeric address.
    pub addr: String,
    /// Port number.
    pub port: String,
    /// "IPv4" or "IPv6".
    pub family: &'static str,
}

impl AddrStrings {
    pub fn new(addr: &SocketAddr, dns: bool) -> Self {
        let numeric = addr.ip().to_string();
        let host = if dns {
            name_info(addr, true).map(|(h, _)| h).unwrap_or_else(|_| numeric.clone())
        } else {
            numeric.clone()
        };
        Self {
            host,
            addr: numeric,
            port: addr.port().to_string(),
            family: if addr.is_ipv4() { "IPv4" } else { "IPv6" },
        }
    }
}

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        use std::ffi::CStr;
        use socket2::SockAddr;

        const MAX_HOST: usize = 1025;
        const MAX_SERV: usize = 32;

        /// `getnameinfo` for one address: (host, service).
        ///
        /// With `dns == false` both parts are numeric.
        pub fn name_info(addr: &SocketAddr, dns: bool) -> BalResult<(String, String)> {
            let sa = SockAddr::from(*addr);
            let mut host = [0 as libc::c_char; MAX_HOST];
            let mut serv = [0 as libc::c_char; MAX_SERV];
            let flags = libc::NI_NUMERICSERV | if dns { 0 } else { libc::NI_NUMERICHOST };

            let rc = unsafe {
                libc::getnameinfo(
                    sa.as_ptr() as *const libc::sockaddr,
                    sa.len() as libc::socklen_t,
                    host.as_mut_ptr(),
                    MAX_HOST as libc::socklen_t,
                    serv.as_mut_ptr(),
                    MAX_SERV as libc::socklen_t,
                    flags,
                )
            };
            if rc != 0 {
                let reason = unsafe { CStr::from_ptr(libc::gai_strerror(rc)) }
                    .to_string_lossy()
                    .into_owned();
                return Err(BalError::Resolve { host: addr.ip().to_string(), reason });
            }

            let host = unsafe { CStr::from_ptr(host.as_ptr()) }.to_string_lossy().into_owned();
            let serv = unsafe { CStr::from_ptr(serv.as_ptr()) }.to_string_lossy().into_owned();
            Ok((host, serv))
        }
    } else {
        /// Numeric-only fallback.
        pub fn name_info(addr: &SocketAddr, _dns: bool) -> BalResult<(String, String)> {
            Ok((addr.ip().to_string(), addr.port().to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_numeric() {
        let list = resolve_host("127.0.0.1", "8080").unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list.first().unwrap(), &"127.0.0.1:8080".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn test_resolve_bad_port() {
        let err = resolve_host("127.0.0.1", "http").unwrap_err();
        assert_eq!(err, BalError::InvalidArgument("port must be numeric"));
    }

    #[test]
    fn test_cursor_and_reset() {
        let mut list = AddrList::new(vec![
            "127.0.0.1:1".parse().unwrap(),
            "127.0.0.1:2".parse().unwrap(),
        ]);
        assert_eq!(list.next_addr().unwrap().port(), 1);
        assert_eq!(list.next_addr().unwrap().port(), 2);
        assert!(list.next_addr().is_none());
        assert!(list.next_addr().is_none());
        list.reset();
        assert_eq!(list.next_addr().unwrap().port(), 1);
    }

    #[test]
    fn test_addr_strings_numeric() {
        let addr: SocketAddr = "10.1.2.3:4242".parse().unwrap();
        let s = AddrStrings::new(&addr, false);
        assert_eq!(s.host, "10.1.2.3");
        assert_eq!(s.addr, "10.1.2.3");
        assert_eq!(s.port, "4242");
        assert_eq!(s.family, "IPv4");
    }

    #[cfg(unix)]
    #[test]
    fn test_name_info_numeric() {
        let addr: SocketAddr = "[::1]:80".parse().unwrap();
        let (host, serv) = name_info(&addr, false).unwrap();
        assert_eq!(host, "::1");
        assert_eq!(serv, "80");
    }
}
