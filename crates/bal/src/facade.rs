//! Process-wide poller.
//!
//! One [`AsyncSelect`] over [`Socket`] per process, created on first use
//! from [`SelectConfig::from_env`] (or whatever [`configure`] installed).
//! The poller thread itself starts with the first registration and stops
//! in [`cleanup`]; a registration after `cleanup` starts a fresh one.
//!
//! Every function here may be called from inside a callback.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bal_core::{bal_debug, BalError, BalResult, Event, Interest};
use bal_select::{AsyncSelect, PollerState, SelectConfig, StatsSnapshot};
use bal_socket::Socket;

static GLOBAL: Mutex<Option<Arc<AsyncSelect<Socket>>>> = Mutex::new(None);

fn global() -> MutexGuard<'static, Option<Arc<AsyncSelect<Socket>>>> {
    GLOBAL.lock().unwrap_or_else(PoisonError::into_inner)
}

fn instance() -> Arc<AsyncSelect<Socket>> {
    global()
        .get_or_insert_with(|| Arc::new(AsyncSelect::new(SelectConfig::from_env())))
        .clone()
}

fn existing() -> Option<Arc<AsyncSelect<Socket>>> {
    global().clone()
}

/// Initialize logging from the environment. Optional; the first log line
/// does the same.
pub fn init() {
    bal_core::log::init();
}

/// Replace the configuration used by the process-wide poller.
///
/// Fails while a poller thread is running; call [`cleanup`] first.
pub fn configure(config: SelectConfig) -> BalResult<()> {
    if let Err(e) = config.validate() {
        bal_core::bal_error!("rejected poller configuration: {}", e);
        return Err(BalError::InvalidArgument("invalid poller configuration"));
    }
    let mut slot = global();
    if let Some(current) = slot.as_ref() {
        if current.state() == PollerState::Running {
            return Err(BalError::InvalidArgument("poller already running"));
        }
    }
    *slot = Some(Arc::new(AsyncSelect::new(config)));
    bal_debug!("process poller reconfigured");
    Ok(())
}

/// Watch `socket` for `interest` and deliver events to `callback`.
///
/// Registers the socket or, when it is already watched, replaces its
/// interest and callback. An empty `interest` releases it.
pub fn async_select<F>(socket: &Arc<Socket>, callback: F, interest: Interest) -> BalResult<()>
where
    F: Fn(&Arc<Socket>, Event) + Send + Sync + 'static,
{
    instance().register_or_update(socket, callback, interest)
}

/// Stop watching `socket`.
pub fn async_release(socket: &Arc<Socket>) -> BalResult<()> {
    match existing() {
        Some(sel) => sel.unregister(socket),
        None => Err(BalError::NotInitialized),
    }
}

/// Add event bits to a watched socket.
pub fn async_add_interest(socket: &Arc<Socket>, add: Interest) -> BalResult<()> {
    existing().ok_or(BalError::NotInitialized)?.add_interest(socket, add)
}

/// Remove event bits from a watched socket; the last bit releases it.
pub fn async_remove_interest(socket: &Arc<Socket>, remove: Interest) -> BalResult<()> {
    existing().ok_or(BalError::NotInitialized)?.remove_interest(socket, remove)
}

/// Whether `socket` is currently watched. `false` from inside a callback.
pub fn async_is_watched(socket: &Arc<Socket>) -> bool {
    use bal_core::AsyncSocket;
    existing().is_some_and(|sel| sel.is_registered(socket.descriptor()))
}

pub fn async_state() -> PollerState {
    existing().map_or(PollerState::NotStarted, |sel| sel.state())
}

/// Poller counters, zero before first use.
pub fn async_stats() -> StatsSnapshot {
    existing().map(|sel| sel.stats()).unwrap_or_default()
}

/// Stop the poller thread and forget every watched socket.
///
/// Safe to call repeatedly and before anything was registered.
pub fn cleanup() -> BalResult<()> {
    match existing() {
        Some(sel) => sel.shutdown(),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bal_core::AsyncSocket;
    use bal_socket::{Domain, Protocol, Type};
    use std::io::Write;
    use std::net::TcpStream;
    use std::time::{Duration, Instant};

    // the facade is process-wide; tests take turns
    static SERIAL: Mutex<()> = Mutex::new(());

    fn serial() -> MutexGuard<'static, ()> {
        SERIAL.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        cond()
    }

    fn listener() -> (Arc<Socket>, std::net::SocketAddr) {
        let s = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP)).unwrap();
        s.bind(&"127.0.0.1:0".parse().unwrap()).unwrap();
        s.listen(8).unwrap();
        let addr = s.local_addr().unwrap();
        (Arc::new(s), addr)
    }

    #[test]
    fn test_cleanup_is_idempotent() {
        let _g = serial();
        assert!(cleanup().is_ok());
        assert!(cleanup().is_ok());
        assert_ne!(async_state(), PollerState::Running);
    }

    #[test]
    fn test_release_without_poller() {
        let _g = serial();
        cleanup().unwrap();
        let (l, _) = listener();
        assert_eq!(async_release(&l), Err(BalError::NotInitialized));
    }

    #[test]
    fn test_accept_and_read_through_facade() {
        let _g = serial();
        let (l, addr) = listener();
        let got = Arc::new(Mutex::new(Vec::new()));

        let got2 = got.clone();
        async_select(
            &l,
            move |s, ev| {
                if ev != Event::Accept {
                    return;
                }
                let Ok((client, _)) = s.accept() else { return };
                let got = got2.clone();
                async_select(
                    &Arc::new(client),
                    move |c, ev| {
                        if ev == Event::Read {
                            let mut buf = [0u8; 16];
                            if let Ok(n) = c.recv(&mut buf) {
                                got.lock().unwrap().extend_from_slice(&buf[..n]);
                            }
                        }
                    },
                    Interest::NORMAL,
                )
                .unwrap();
            },
            Interest::NORMAL,
        )
        .unwrap();
        assert_eq!(async_state(), PollerState::Running);
        assert!(async_is_watched(&l));

        let mut peer = TcpStream::connect(addr).unwrap();
        peer.write_all(b"ping").unwrap();
        assert!(wait_until(|| got.lock().unwrap().as_slice() == b"ping"));
        assert!(async_stats().events >= 2);

        async_remove_interest(&l, Interest::ALL).unwrap();
        assert!(!async_is_watched(&l));

        cleanup().unwrap();
        assert_eq!(async_state(), PollerState::Stopped);
        assert_eq!(async_release(&l), Err(BalError::NotInitialized));
    }

    #[test]
    fn test_configure_rejected_while_running() {
        let _g = serial();
        cleanup().unwrap();
        assert!(configure(SelectConfig::new().max_entries(64)).is_ok());

        let (l, _) = listener();
        async_select(&l, |_, _| {}, Interest::READ).unwrap();
        assert_eq!(
            configure(SelectConfig::new()),
            Err(BalError::InvalidArgument("poller already running"))
        );
        async_add_interest(&l, Interest::EXCEPTION).unwrap();

        cleanup().unwrap();
        assert!(configure(SelectConfig::new()).is_ok());
        assert!(l.descriptor() >= 0);
    }
}
