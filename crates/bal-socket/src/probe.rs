//! Classification of peek-receive results.
//!
//! A zero-length peek means orderly shutdown. Errors that mean the
//! connection no longer exists map to [`PeekStatus::Broken`]; the set is
//! platform-specific, so the io::ErrorKind check is backed by raw errno
//! matching on unix.

use std::io;

use bal_core::PeekStatus;

pub(crate) fn classify(res: io::Result<usize>) -> PeekStatus {
    match res {
        Ok(0) => PeekStatus::PeerClosed,
        Ok(_) => PeekStatus::Readable,
        Err(e) => classify_error(&e),
    }
}

fn classify_error(e: &io::Error) -> PeekStatus {
    match e.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => return PeekStatus::WouldBlock,
        _ => {}
    }

    let code = e.raw_os_error().unwrap_or(-1);
    match e.kind() {
        io::ErrorKind::NotConnected
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::BrokenPipe => PeekStatus::Broken(code),
        _ if is_gone(code) => PeekStatus::Broken(code),
        _ => PeekStatus::Failed(code),
    }
}

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        fn is_gone(code: i32) -> bool {
            use nix::errno::Errno;

            matches!(
                Errno::from_raw(code),
                Errno::EBADF
                    | Errno::ENOTSOCK
                    | Errno::ENOTCONN
                    | Errno::ENETDOWN
                    | Errno::ENETRESET
                    | Errno::ENETUNREACH
                    | Errno::ESHUTDOWN
                    | Errno::EHOSTDOWN
                    | Errno::EHOSTUNREACH
                    | Errno::ECONNRESET
                    | Errno::ECONNABORTED
            )
        }
    } else {
        fn is_gone(code: i32) -> bool {
            // WSAENETDOWN, WSAENOTSOCK, WSAEOPNOTSUPP, WSAECONNABORTED,
            // WSAECONNRESET, WSAENOTCONN, WSAESHUTDOWN
            matches!(code, 10050 | 10038 | 10045 | 10053 | 10054 | 10057 | 10058)
        }
    }
}
