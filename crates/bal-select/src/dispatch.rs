//! Event classification and callback dispatch.
//!
//! One pass per readiness set, in the order read, write, except. Each
//! pass walks the whole watch list with the list cursor and gives every
//! entry whose descriptor is in the set at most one event:
//!
//! | set    | condition                              | event            |
//! |--------|----------------------------------------|------------------|
//! | read   | socket is listening                    | `Accept`         |
//! | read   | peek reports orderly close or broken   | `Close`, removed |
//! | read   | otherwise                              | `Read`           |
//! | write  | connect pending, `SO_ERROR` set        | `ConnectFailed`  |
//! | write  | connect pending                        | `Connect`        |
//! | write  | `WRITE` in the interest                | `Write`          |
//! | except | connect pending                        | `ConnectFailed`  |
//! | except | otherwise                              | `Exception`      |
//!
//! An entry with an unresolved connect is in the write set whatever its
//! interest, and never in the read set. `CONNECT` and `CONNECT_FAILED`
//! come from that state; they cannot be requested on their own. The
//! except set is always classified, so a connect resolved by the write
//! pass may still see `Exception` in the same cycle.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use bal_core::{bal_error, bal_trace};
use bal_core::{AsyncSocket, Event, Interest, PeekStatus};

use crate::fdset::{ReadySets, SetKind};
use crate::poller::{Deferred, Shared};
use crate::watch_list::{Callback, WatchEntry, WatchList};

/// Pick the event for `entry`, already known to be in set `kind`.
///
/// Resolving a pending connect clears it.
pub(crate) fn classify<S: AsyncSocket>(entry: &mut WatchEntry<S>, kind: SetKind) -> Option<Event> {
    match kind {
        SetKind::Read => {
            if entry.connect_pending || !entry.interest.wants_read_class() {
                return None;
            }
            if entry.socket.is_listening() {
                return Some(Event::Accept);
            }
            match entry.socket.peek() {
                status if status.is_closed() => Some(Event::Close),
                PeekStatus::Failed(code) => {
                    bal_trace!("peek on socket {} failed: error {}", entry.descriptor(), code);
                    Some(Event::Read)
                }
                _ => Some(Event::Read),
            }
        }
        SetKind::Write => {
            if entry.connect_pending {
                entry.connect_pending = false;
                return match entry.socket.take_error() {
                    Some(code) if code != 0 => {
                        bal_trace!("connect on socket {} failed: error {}", entry.descriptor(), code);
                        Some(Event::ConnectFailed)
                    }
                    _ => Some(Event::Connect),
                };
            }
            if entry.interest.contains(Interest::WRITE) {
                Some(Event::Write)
            } else {
                None
            }
        }
        SetKind::Except => {
            if entry.connect_pending {
                entry.connect_pending = false;
                return Some(Event::ConnectFailed);
            }
            Some(Event::Exception)
        }
    }
}

/// Run one pass over `list` for set `kind`.
///
/// Facade calls made by callbacks arrive on `shared.deferred`; they are
/// moved to `ops` after each callback, and an unregister mutes its entry
/// for the rest of the cycle. The caller applies `ops` afterwards.
pub(crate) fn dispatch<S: AsyncSocket>(
    shared: &Shared<S>,
    list: &mut WatchList<S>,
    ready: &ReadySets,
    kind: SetKind,
    ops: &mut Vec<Deferred<S>>,
) {
    let set = ready.get(kind);
    if set.is_empty() {
        return;
    }

    list.reset_cursor();
    while let Some(key) = list.advance() {
        if shared.die.load(Ordering::Acquire) {
            break;
        }

        let (socket, callback, event) = {
            let Some(entry) = list.get_mut(key) else { continue };
            if entry.muted || !set.contains(entry.descriptor()) {
                continue;
            }
            let Some(event) = classify(entry, kind) else { continue };
            (entry.socket.clone(), entry.callback.clone(), event)
        };

        invoke(&socket, &callback, event);
        shared.stats.event();

        if event == Event::Close {
            list.remove_key(key);
            shared.reserved().release(socket.descriptor());
            shared.stats.close();
            bal_trace!("socket {} closed; removed from list", socket.descriptor());
        }

        while let Some(op) = shared.deferred.pop() {
            if let Deferred::Unregister(sd) = op {
                if let Some(entry) = list.find_mut(sd) {
                    entry.muted = true;
                }
            }
            ops.push(op);
        }
    }
}

fn invoke<S: AsyncSocket>(socket: &Arc<S>, callback: &Callback<S>, event: Event) {
    let res = panic::catch_unwind(AssertUnwindSafe(|| callback(socket, event)));
    if res.is_err() {
        bal_error!("callback for socket {} panicked on {}", socket.descriptor(), event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeSocket;
    use bal_core::SocketFlags;

    fn entry(sock: FakeSocket, interest: Interest) -> WatchEntry<FakeSocket> {
        WatchEntry::new(Arc::new(sock), interest, Arc::new(|_, _| {}))
    }

    #[test]
    fn test_read_set_classification() {
        let mut e = entry(FakeSocket::new(3), Interest::READ);
        e.socket.set_peek(PeekStatus::Readable);
        assert_eq!(classify(&mut e, SetKind::Read), Some(Event::Read));

        e.socket.set_peek(PeekStatus::PeerClosed);
        assert_eq!(classify(&mut e, SetKind::Read), Some(Event::Close));

        e.socket.set_peek(PeekStatus::Broken(107));
        assert_eq!(classify(&mut e, SetKind::Read), Some(Event::Close));

        // a hard error that does not mean closed still reports READ
        e.socket.set_peek(PeekStatus::Failed(12));
        assert_eq!(classify(&mut e, SetKind::Read), Some(Event::Read));
    }

    #[test]
    fn test_listening_is_accept() {
        let s = FakeSocket::new(4);
        s.flags().set(SocketFlags::LISTENING);
        // a listener's peek looks broken; listening wins
        s.set_peek(PeekStatus::Broken(107));
        let mut e = entry(s, Interest::READ | Interest::ACCEPT);
        assert_eq!(classify(&mut e, SetKind::Read), Some(Event::Accept));
    }

    #[test]
    fn test_read_needs_read_class_interest() {
        let mut e = entry(FakeSocket::new(5), Interest::WRITE);
        assert_eq!(classify(&mut e, SetKind::Read), None);
    }

    #[test]
    fn test_connect_resolution_on_write() {
        let mut e = entry(FakeSocket::new(6), Interest::WRITE);
        e.connect_pending = true;
        assert_eq!(classify(&mut e, SetKind::Write), Some(Event::Connect));
        assert!(!e.connect_pending);
        assert_eq!(classify(&mut e, SetKind::Write), Some(Event::Write));
    }

    #[test]
    fn test_except_after_connect_in_same_cycle() {
        let mut e = entry(FakeSocket::new(11), Interest::WRITE);
        e.connect_pending = true;
        assert_eq!(classify(&mut e, SetKind::Write), Some(Event::Connect));
        // out-of-band or error condition alongside the completed connect
        assert_eq!(classify(&mut e, SetKind::Except), Some(Event::Exception));
    }

    #[test]
    fn test_connect_failure_on_write() {
        let mut e = entry(FakeSocket::new(7), Interest::WRITE);
        e.socket.set_error(Some(111));
        e.connect_pending = true;
        assert_eq!(classify(&mut e, SetKind::Write), Some(Event::ConnectFailed));
        assert!(!e.connect_pending);
    }

    #[test]
    fn test_except_classification() {
        let mut e = entry(FakeSocket::new(8), Interest::READ);
        e.connect_pending = true;
        assert_eq!(classify(&mut e, SetKind::Except), Some(Event::ConnectFailed));
        assert!(!e.connect_pending);
        assert_eq!(classify(&mut e, SetKind::Except), Some(Event::Exception));
    }

    #[test]
    fn test_pending_connect_skips_read() {
        let mut e = entry(FakeSocket::new(9), Interest::READ | Interest::WRITE);
        e.connect_pending = true;
        assert_eq!(classify(&mut e, SetKind::Read), None);
        assert!(e.connect_pending);
    }

    #[test]
    fn test_write_without_write_interest() {
        let mut e = entry(FakeSocket::new(10), Interest::READ);
        assert_eq!(classify(&mut e, SetKind::Write), None);
    }
}
