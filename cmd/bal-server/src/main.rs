//! bal sample server
//!
//! Listens on a TCP port through the process-wide poller. Every accepted
//! connection is registered from inside the listener's callback; the first
//! thing a client sends is answered once with "O, HELO 2 U".
//!
//! Usage:
//!     ./target/release/bal-server [port] [host]
//!
//! Defaults come from `BAL_PORT` (7777) and `BAL_HOST` (0.0.0.0).
//!
//! Test with:
//!     ./target/release/bal-client 7777 localhost
//!     echo "HELO" | nc -q1 localhost 7777

use std::os::raw::c_int;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bal::{bal_error, bal_info, bal_warn};
use bal::{AsyncSocket, Event, Interest, Socket, Type};
use nix::sys::signal::{signal, SigHandler, Signal};

const REPLY: &[u8] = b"O, HELO 2 U";
const BACKLOG: i32 = 128;
const TICK: Duration = Duration::from_millis(100);
const STATS_EVERY: Duration = Duration::from_secs(5);

static RUNNING: AtomicBool = AtomicBool::new(true);
static ACCEPTED: AtomicU64 = AtomicU64::new(0);
static CLOSED: AtomicU64 = AtomicU64::new(0);

extern "C" fn handle_sigint(_: c_int) {
    RUNNING.store(false, Ordering::Relaxed);
}

fn on_listener(listener: &Arc<Socket>, ev: Event) {
    if ev != Event::Accept {
        bal_warn!("[{}] unexpected {} on listener", listener.descriptor(), ev);
        return;
    }

    let (client, peer) = match listener.accept() {
        Ok(pair) => pair,
        Err(e) => {
            bal_error!("[{}] accept failed: {}", listener.descriptor(), e);
            return;
        }
    };
    let client = Arc::new(client);
    let replied = Arc::new(AtomicBool::new(false));

    if let Err(e) = bal::async_select(&client, move |s, ev| on_client(s, ev, &replied), Interest::NORMAL) {
        bal_error!("[{}] cannot watch client {}: {}", listener.descriptor(), peer, e);
        return;
    }
    ACCEPTED.fetch_add(1, Ordering::Relaxed);
    bal_info!("[{}] got connection from {} -> [{}]", listener.descriptor(), peer, client.descriptor());
}

fn on_client(s: &Arc<Socket>, ev: Event, replied: &AtomicBool) {
    let sd = s.descriptor();
    match ev {
        Event::Read => {
            let mut buf = [0u8; 2048];
            match s.recv(&mut buf) {
                Ok(0) => bal_info!("[{}] read EOF", sd),
                Ok(n) => {
                    bal_info!("[{}] read {} bytes: '{}'", sd, n, String::from_utf8_lossy(&buf[..n]));
                    if !replied.load(Ordering::Relaxed) {
                        want_write(s, true);
                    }
                }
                Err(e) => bal_warn!("[{}] read error: {}", sd, e),
            }
        }
        Event::Write => {
            if replied.load(Ordering::Relaxed) {
                want_write(s, false);
                return;
            }
            match s.send(REPLY) {
                Ok(n) => {
                    bal_info!("[{}] wrote {} bytes", sd, n);
                    if n == REPLY.len() {
                        replied.store(true, Ordering::Relaxed);
                        want_write(s, false);
                    }
                }
                Err(e) => bal_warn!("[{}] write error: {}", sd, e),
            }
        }
        Event::Close => {
            CLOSED.fetch_add(1, Ordering::Relaxed);
            bal_info!("[{}] connection closed", sd);
        }
        Event::Exception => bal_warn!("[{}] exceptional condition", sd),
        other => bal_warn!("[{}] unexpected {}", sd, other),
    }
}

/// Toggle WRITE interest; false when the change was refused.
fn want_write(s: &Arc<Socket>, on: bool) -> bool {
    let res = if on {
        bal::async_add_interest(s, Interest::WRITE)
    } else {
        bal::async_remove_interest(s, Interest::WRITE)
    };
    if let Err(e) = res {
        bal_warn!("[{}] cannot change write interest: {}", s.descriptor(), e);
        return false;
    }
    true
}

fn main() {
    bal::init();

    let args: Vec<String> = std::env::args().collect();
    let port = args.get(1).cloned().unwrap_or_else(|| bal::env_get_str("BAL_PORT", "7777"));
    let host = args.get(2).cloned().unwrap_or_else(|| bal::env_get_str("BAL_HOST", "0.0.0.0"));

    unsafe {
        let _ = signal(Signal::SIGINT, SigHandler::Handler(handle_sigint));
        let _ = signal(Signal::SIGTERM, SigHandler::Handler(handle_sigint));
        let _ = signal(Signal::SIGPIPE, SigHandler::SigIgn);
    }

    let listener = match listen(&host, &port) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            bal_error!("cannot listen on {}:{}: {}", host, port, e);
            std::process::exit(1);
        }
    };

    if let Err(e) = bal::async_select(&listener, on_listener, Interest::NORMAL) {
        bal_error!("cannot watch listener: {}", e);
        std::process::exit(1);
    }
    bal_info!("listening on {}:{}; ctrl+c to exit...", host, port);

    let mut last_stats = Instant::now();
    while RUNNING.load(Ordering::Relaxed) {
        std::thread::sleep(TICK);
        if last_stats.elapsed() >= STATS_EVERY {
            let st = bal::async_stats();
            bal_info!(
                "accepted={} closed={} cycles={} events={} poll_errors={}",
                ACCEPTED.load(Ordering::Relaxed),
                CLOSED.load(Ordering::Relaxed),
                st.cycles,
                st.events,
                st.poll_errors
            );
            last_stats = Instant::now();
        }
    }

    bal_info!("got ctrl+c; exiting...");
    if let Err(e) = bal::async_release(&listener) {
        bal_warn!("release listener: {}", e);
    }
    if let Err(e) = bal::cleanup() {
        bal_error!("cleanup: {}", e);
    }
}

fn listen(host: &str, port: &str) -> bal::BalResult<Socket> {
    let (s, _) = Socket::auto(host, port, Type::STREAM)?;
    s.set_reuse_addr(true)?;
    s.bind_host(host, port)?;
    s.listen(BACKLOG)?;
    Ok(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bal::{Domain, Protocol};

    #[test]
    fn test_want_write_on_unwatched_socket() {
        let s = Arc::new(Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP)).unwrap());
        assert!(!want_write(&s, true));
        assert!(!want_write(&s, false));
        assert!(!bal::async_is_watched(&s));
    }
}
