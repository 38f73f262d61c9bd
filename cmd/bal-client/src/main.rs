//! bal sample client
//!
//! Connects without blocking, lets the poller report the outcome, sends
//! "HELO" once the socket is writable and prints whatever comes back.
//! Exits when the server closes the connection, the connect fails, or on
//! ctrl+c.
//!
//! Usage:
//!     ./target/release/bal-client [port] [host]
//!
//! Defaults come from `BAL_PORT` (7777) and `BAL_HOST` (localhost).

use std::os::raw::c_int;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bal::{bal_error, bal_info, bal_warn};
use bal::{AsyncSocket, Event, Interest, Socket, Type};
use nix::sys::signal::{signal, SigHandler, Signal};

const GREETING: &[u8] = b"HELO";
const TICK: Duration = Duration::from_millis(100);

static RUNNING: AtomicBool = AtomicBool::new(true);
static SENT: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_sigint(_: c_int) {
    RUNNING.store(false, Ordering::Relaxed);
}

fn quit() {
    RUNNING.store(false, Ordering::Relaxed);
}

fn on_event(s: &Arc<Socket>, ev: Event) {
    let sd = s.descriptor();
    match ev {
        Event::Connect => {
            match s.peer_addr() {
                Ok(peer) => bal_info!("[{}] connected to {}", sd, peer),
                Err(_) => bal_info!("[{}] connected", sd),
            }
            want_write(s, true);
        }
        Event::ConnectFailed => {
            bal_error!("[{}] failed to connect", sd);
            quit();
        }
        Event::Write => {
            if SENT.load(Ordering::Relaxed) {
                want_write(s, false);
                return;
            }
            match s.send(GREETING) {
                Ok(n) => {
                    bal_info!("[{}] wrote {} bytes", sd, n);
                    SENT.store(true, Ordering::Relaxed);
                    want_write(s, false);
                }
                Err(e) => bal_warn!("[{}] write error: {}", sd, e),
            }
        }
        Event::Read => {
            let mut buf = [0u8; 2048];
            match s.recv(&mut buf) {
                Ok(0) => bal_info!("[{}] read EOF", sd),
                Ok(n) => {
                    let reply = String::from_utf8_lossy(&buf[..n]);
                    bal_info!("[{}] read {} bytes: '{}'", sd, n, reply);
                    println!("{}", reply);
                }
                Err(e) => bal_warn!("[{}] read error: {}", sd, e),
            }
        }
        Event::Close => {
            bal_info!("[{}] connection closed", sd);
            quit();
        }
        Event::Exception => bal_warn!("[{}] exceptional condition", sd),
        Event::Accept => bal_warn!("[{}] unexpected {}", sd, ev),
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
    let host = args.get(2).cloned().unwrap_or_else(|| bal::env_get_str("BAL_HOST", "localhost"));

    unsafe {
        let _ = signal(Signal::SIGINT, SigHandler::Handler(handle_sigint));
        let _ = signal(Signal::SIGPIPE, SigHandler::SigIgn);
    }

    let (sock, mut addrs) = match Socket::auto(&host, &port, Type::STREAM) {
        Ok(pair) => pair,
        Err(e) => {
            bal_error!("cannot create socket for {}:{}: {}", host, port, e);
            std::process::exit(1);
        }
    };
    let Some(addr) = addrs.next_addr() else {
        bal_error!("{}:{} resolved to nothing", host, port);
        std::process::exit(1);
    };
    let sock = Arc::new(sock);

    if let Err(e) = sock.connect_nonblocking(&addr) {
        bal_error!("connect to {} failed: {}", addr, e);
        std::process::exit(1);
    }
    if let Err(e) = bal::async_select(&sock, on_event, Interest::ALL) {
        bal_error!("cannot watch socket: {}", e);
        std::process::exit(1);
    }
    bal_info!("connecting to {}; ctrl+c to exit...", addr);

    while RUNNING.load(Ordering::Relaxed) {
        std::thread::sleep(TICK);
    }

    if bal::async_is_watched(&sock) {
        if let Err(e) = bal::async_release(&sock) {
            bal_warn!("release socket: {}", e);
        }
    }
    if let Err(e) = bal::cleanup() {
        bal_error!("cleanup: {}", e);
    }
}
