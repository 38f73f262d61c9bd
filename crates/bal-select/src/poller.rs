//! # Poller - the readiness loop and its registration handle
//!
//! [`AsyncSelect`] owns at most one poller thread at a time. The thread
//! is spawned by the first registration and runs until [`shutdown`]:
//!
//! ```text
//! NotStarted ──register──▶ Running ──shutdown──▶ Stopping ──join──▶ Stopped
//!                              ▲                                       │
//!                              └──────────────register─────────────────┘
//! ```
//!
//! Each cycle the thread:
//! 1. Locks the watch list (skips to 5 when it is empty)
//! 2. Builds the read/write/except interest sets, moving each socket's
//!    pending-connect flag into its entry
//! 3. Polls the multiplexer without waiting
//! 4. Dispatches read, then write, then except, invoking callbacks with
//!    the list still locked, then applies facade calls the callbacks made
//! 5. Unlocks and pauses per [`IdleStrategy`] (parks while the list is
//!    empty; a registration unparks it)
//!
//! Facade calls from other threads lock the list, so they land strictly
//! between two cycles. Facade calls from a callback cannot lock it; they
//! go on a deferred queue instead and take effect when the cycle ends.
//!
//! [`shutdown`]: AsyncSelect::shutdown

use std::cell::Cell;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle, Thread};
use std::time::Duration;

use crossbeam_queue::SegQueue;

use bal_core::{bal_debug, bal_error, bal_info, bal_trace, bal_warn};
use bal_core::{AsyncSocket, BalError, BalResult, Descriptor, Event, Interest, INVALID_DESCRIPTOR};

use crate::config::{IdleStrategy, SelectConfig};
use crate::dispatch::dispatch;
use crate::fdset::{DescriptorSet, ReadySets, SetKind};
use crate::mux::{Multiplexer, SystemMux};
use crate::stats::{PollerStats, StatsSnapshot};
use crate::watch_list::{Callback, WatchEntry, WatchList};

/// Lifecycle state of an [`AsyncSelect`].
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    NotStarted = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl PollerState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => PollerState::NotStarted,
            1 => PollerState::Running,
            2 => PollerState::Stopping,
            _ => PollerState::Stopped,
        }
    }
}

/// Facade call made from inside a callback, applied at the end of the
/// cycle in arrival order.
pub(crate) enum Deferred<S> {
    Register {
        socket: Arc<S>,
        callback: Callback<S>,
        interest: Interest,
    },
    Unregister(Descriptor),
    Modify {
        sd: Descriptor,
        add: Interest,
        remove: Interest,
    },
}

/// Descriptors the list will hold once every queued call is applied.
///
/// Callbacks run with the list locked, so a registration made from one
/// claims its slot here. Updated together with the list, under its lock.
#[derive(Default)]
pub(crate) struct Reservations {
    set: DescriptorSet,
    len: usize,
}

impl Reservations {
    fn contains(&self, sd: Descriptor) -> bool {
        self.set.contains(sd)
    }

    fn hold(&mut self, sd: Descriptor) {
        if !self.set.contains(sd) {
            self.set.insert(sd);
            self.len += 1;
        }
    }

    pub(crate) fn release(&mut self, sd: Descriptor) {
        if self.set.contains(sd) {
            self.set.remove(sd);
            self.len -= 1;
        }
    }

    fn clear(&mut self) {
        self.set.clear();
        self.len = 0;
    }
}

/// State shared between the handle and one poller thread.
pub(crate) struct Shared<S> {
    pub(crate) list: Mutex<WatchList<S>>,
    pub(crate) die: AtomicBool,
    pub(crate) deferred: SegQueue<Deferred<S>>,
    pub(crate) stats: Arc<PollerStats>,
    reserved: Mutex<Reservations>,
    /// Entry count as of the last mutation; readable without the lock.
    entries: AtomicUsize,
}

impl<S: AsyncSocket> Shared<S> {
    fn new(capacity: usize, stats: Arc<PollerStats>) -> Self {
        Self {
            list: Mutex::new(WatchList::with_capacity(capacity)),
            die: AtomicBool::new(false),
            deferred: SegQueue::new(),
            stats,
            reserved: Mutex::new(Reservations::default()),
            entries: AtomicUsize::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, WatchList<S>> {
        self.list.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn reserved(&self) -> MutexGuard<'_, Reservations> {
        self.reserved.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

thread_local! {
    /// Address of the `Shared` whose poller runs on this thread, or 0.
    static CURRENT_POLLER: Cell<usize> = const { Cell::new(0) };
}

fn shared_addr<S>(shared: &Arc<Shared<S>>) -> usize {
    Arc::as_ptr(shared) as *const () as usize
}

fn on_poller_thread<S>(shared: &Arc<Shared<S>>) -> bool {
    CURRENT_POLLER.with(|c| c.get()) == shared_addr(shared)
}

struct Running<S> {
    shared: Arc<Shared<S>>,
    handle: JoinHandle<()>,
    thread: Thread,
}

/// Handle to the asynchronous notification subsystem.
///
/// `S` is the socket type; `M` the readiness multiplexer. Dropping the
/// handle shuts the poller down.
pub struct AsyncSelect<S: AsyncSocket, M: Multiplexer = SystemMux> {
    config: SelectConfig,
    mux: M,
    capacity: usize,
    state: AtomicU8,
    running: Mutex<Option<Running<S>>>,
    stats: Arc<PollerStats>,
}

impl<S: AsyncSocket> AsyncSelect<S, SystemMux> {
    /// Handle using the backend named in `config`. Nothing is started.
    pub fn new(config: SelectConfig) -> Self {
        let mux = SystemMux::new(config.backend, config.max_entries);
        Self::with_multiplexer(config, mux)
    }

    pub fn from_env() -> Self {
        Self::new(SelectConfig::from_env())
    }
}

impl<S: AsyncSocket, M: Multiplexer> AsyncSelect<S, M> {
    /// Handle using `mux`. Nothing is started.
    pub fn with_multiplexer(config: SelectConfig, mux: M) -> Self {
        let capacity = config.max_entries.min(mux.capacity());
        Self {
            config,
            mux,
            capacity,
            state: AtomicU8::new(PollerState::NotStarted as u8),
            running: Mutex::new(None),
            stats: Arc::new(PollerStats::new()),
        }
    }

    pub fn state(&self) -> PollerState {
        PollerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Most entries the watch list accepts.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn config(&self) -> &SelectConfig {
        &self.config
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Registered entries as of the last completed mutation.
    pub fn len(&self) -> usize {
        self.current()
            .map(|s| s.entries.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Interest currently registered for `sd`.
    ///
    /// Returns `None` when called from a callback; the list is locked by
    /// the dispatch in progress.
    pub fn interest_of(&self, sd: Descriptor) -> Option<Interest> {
        let shared = self.current()?;
        if on_poller_thread(&shared) {
            bal_warn!("interest_of({}) called from a callback", sd);
            return None;
        }
        let list = shared.lock();
        list.find(sd).map(|e| e.interest())
    }

    pub fn is_registered(&self, sd: Descriptor) -> bool {
        self.interest_of(sd).is_some()
    }

    fn lock_running(&self) -> MutexGuard<'_, Option<Running<S>>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current(&self) -> Option<Arc<Shared<S>>> {
        self.lock_running().as_ref().map(|r| r.shared.clone())
    }

    /// Running poller, started on demand.
    fn ensure_running(&self) -> BalResult<(Arc<Shared<S>>, Thread)> {
        let mut guard = self.lock_running();
        if let Some(r) = guard.as_ref() {
            return Ok((r.shared.clone(), r.thread.clone()));
        }
        if self.state() == PollerState::Stopping {
            return Err(BalError::ShuttingDown);
        }
        if let Err(e) = self.config.validate() {
            bal_error!("cannot start poller: {}", e);
            return Err(BalError::InvalidArgument("invalid poller configuration"));
        }

        let shared = Arc::new(Shared::new(self.capacity, self.stats.clone()));
        let thread_shared = shared.clone();
        let mux = self.mux.clone();
        let idle = self.config.idle;
        let empty_park = self.config.empty_park;

        let handle = thread::Builder::new()
            .name(self.config.thread_name.clone())
            .stack_size(self.config.stack_size)
            .spawn(move || poller_loop(thread_shared, mux, idle, empty_park))
            .map_err(|e| {
                bal_error!("failed to spawn poller thread: {}", e);
                BalError::SpawnFailed(e.raw_os_error())
            })?;

        let thread = handle.thread().clone();
        *guard = Some(Running {
            shared: shared.clone(),
            handle,
            thread: thread.clone(),
        });
        self.state.store(PollerState::Running as u8, Ordering::Release);
        bal_info!(
            "poller thread '{}' started ({} backend, {} entries max)",
            self.config.thread_name,
            self.mux.name(),
            self.capacity
        );
        Ok((shared, thread))
    }

    /// Watch `socket` for `interest`, replacing interest and callback if it
    /// is already watched. An empty `interest` unregisters.
    ///
    /// The first registration starts the poller thread and every new
    /// entry switches its socket to non-blocking mode. Called from a
    /// callback, the registration is queued and applied when the current
    /// cycle ends; failures at that point are logged.
    pub fn register_or_update<F>(&self, socket: &Arc<S>, callback: F, interest: Interest) -> BalResult<()>
    where
        F: Fn(&Arc<S>, Event) + Send + Sync + 'static,
    {
        self.register_callback(socket, Arc::new(callback), interest)
    }

    /// [`register_or_update`](Self::register_or_update) with a shared callback.
    pub fn register_callback(&self, socket: &Arc<S>, callback: Callback<S>, interest: Interest) -> BalResult<()> {
        if interest.is_empty() {
            return self.unregister(socket);
        }
        let sd = socket.descriptor();
        if sd == INVALID_DESCRIPTOR {
            return Err(BalError::InvalidArgument("socket has no descriptor"));
        }
        if !self.mux.accepts(sd) {
            return Err(BalError::DescriptorOutOfRange(sd));
        }

        let (shared, thread) = self.ensure_running()?;
        if on_poller_thread(&shared) {
            self.claim(&shared, socket)?;
            shared.deferred.push(Deferred::Register {
                socket: socket.clone(),
                callback,
                interest,
            });
            return Ok(());
        }

        let mut list = shared.lock();
        if shared.die.load(Ordering::Acquire) {
            return Err(BalError::ShuttingDown);
        }
        let inserted = register_locked(&shared, &mut list, socket, callback, interest)?;
        shared.entries.store(list.len(), Ordering::Release);
        let wake = inserted && list.len() == 1;
        drop(list);

        if wake {
            thread.unpark();
        }
        Ok(())
    }

    /// Claim a slot for a registration queued by a callback.
    ///
    /// A descriptor already held (registered, or queued earlier) is an
    /// update and needs no new slot.
    fn claim(&self, shared: &Shared<S>, socket: &Arc<S>) -> BalResult<()> {
        let sd = socket.descriptor();
        let mut reserved = shared.reserved();
        if reserved.contains(sd) {
            return Ok(());
        }
        if reserved.len >= self.capacity {
            bal_warn!("watch list full ({} entries); socket {} rejected", self.capacity, sd);
            return Err(BalError::CapacityExceeded { limit: self.capacity });
        }
        socket.set_nonblocking(true)?;
        reserved.hold(sd);
        Ok(())
    }

    /// Stop watching `socket`. No callback for it starts after this
    /// returns (from a callback: after the current callback returns).
    pub fn unregister(&self, socket: &Arc<S>) -> BalResult<()> {
        self.unregister_descriptor(socket.descriptor())
    }

    pub fn unregister_descriptor(&self, sd: Descriptor) -> BalResult<()> {
        let shared = self.current().ok_or(BalError::NotInitialized)?;
        if on_poller_thread(&shared) {
            shared.reserved().release(sd);
            shared.deferred.push(Deferred::Unregister(sd));
            return Ok(());
        }

        let mut list = shared.lock();
        let removed = list.remove(sd);
        shared.entries.store(list.len(), Ordering::Release);
        if removed {
            shared.reserved().release(sd);
            bal_debug!("removed socket {} from list", sd);
            Ok(())
        } else {
            bal_warn!("socket {} not found; ignoring removal request", sd);
            Err(BalError::NotRegistered(sd))
        }
    }

    /// Add bits to the interest of an already-watched socket.
    pub fn add_interest(&self, socket: &Arc<S>, add: Interest) -> BalResult<()> {
        self.modify(socket.descriptor(), add, Interest::NONE)
    }

    /// Remove bits from the interest of a watched socket; removing the
    /// last bit unregisters it.
    pub fn remove_interest(&self, socket: &Arc<S>, remove: Interest) -> BalResult<()> {
        self.modify(socket.descriptor(), Interest::NONE, remove)
    }

    fn modify(&self, sd: Descriptor, add: Interest, remove: Interest) -> BalResult<()> {
        let shared = self.current().ok_or(BalError::NotInitialized)?;
        if on_poller_thread(&shared) {
            shared.deferred.push(Deferred::Modify { sd, add, remove });
            return Ok(());
        }

        let mut list = shared.lock();
        let res = modify_locked(&shared, &mut list, sd, add, remove);
        shared.entries.store(list.len(), Ordering::Release);
        res
    }

    /// Stop the poller thread and drop every entry.
    ///
    /// Waits for the thread to exit, so no callback runs once this
    /// returns. Returns `Ok` when nothing is running. Called from a
    /// callback, the thread stops after the current callback and is not
    /// waited for. A later registration starts a fresh poller.
    pub fn shutdown(&self) -> BalResult<()> {
        let running = {
            let mut guard = self.lock_running();
            match guard.take() {
                Some(r) => {
                    self.state.store(PollerState::Stopping as u8, Ordering::Release);
                    r
                }
                None => return Ok(()),
            }
        };

        running.shared.die.store(true, Ordering::Release);
        running.thread.unpark();

        if on_poller_thread(&running.shared) {
            bal_debug!("shutdown requested from a callback; not waiting for the poller");
        } else if running.handle.join().is_err() {
            bal_error!("poller thread panicked");
            let mut list = running.shared.lock();
            report_dangling(&list);
            list.clear();
            running.shared.reserved().clear();
        }

        running.shared.entries.store(0, Ordering::Release);
        self.state.store(PollerState::Stopped as u8, Ordering::Release);
        bal_info!("poller stopped");
        Ok(())
    }
}

impl<S: AsyncSocket, M: Multiplexer> Drop for AsyncSelect<S, M> {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

/// Insert or update under the lock. Returns whether an entry was added.
fn register_locked<S: AsyncSocket>(
    shared: &Shared<S>,
    list: &mut WatchList<S>,
    socket: &Arc<S>,
    callback: Callback<S>,
    interest: Interest,
) -> BalResult<bool> {
    let sd = socket.descriptor();
    if let Some(entry) = list.find_mut(sd) {
        entry.update(socket.clone(), interest, callback);
        bal_debug!("updated socket {} (mask = {:08x})", sd, interest.bits());
        return Ok(false);
    }
    if list.is_full() {
        bal_warn!("watch list full ({} entries); socket {} rejected", list.capacity(), sd);
        return Err(BalError::CapacityExceeded { limit: list.capacity() });
    }
    socket.set_nonblocking(true)?;
    list.add(WatchEntry::new(socket.clone(), interest, callback))?;
    shared.reserved().hold(sd);
    bal_debug!("added socket {} to list (mask = {:08x})", sd, interest.bits());
    Ok(true)
}

fn modify_locked<S: AsyncSocket>(
    shared: &Shared<S>,
    list: &mut WatchList<S>,
    sd: Descriptor,
    add: Interest,
    remove: Interest,
) -> BalResult<()> {
    let Some(entry) = list.find_mut(sd) else {
        return Err(BalError::NotRegistered(sd));
    };
    let interest = (entry.interest | add) - remove;
    if interest.is_empty() {
        list.remove(sd);
        shared.reserved().release(sd);
        bal_debug!("socket {} has no interest left; removed", sd);
    } else {
        entry.interest = interest;
        bal_trace!("socket {} mask now {:08x}", sd, interest.bits());
    }
    Ok(())
}

fn apply<S: AsyncSocket>(shared: &Shared<S>, list: &mut WatchList<S>, op: Deferred<S>) {
    let res = match op {
        Deferred::Register { socket, callback, interest } => {
            let sd = socket.descriptor();
            let res = register_locked(shared, list, &socket, callback, interest).map(|_| ());
            if res.is_err() && !list.contains(sd) {
                shared.reserved().release(sd);
            }
            res
        }
        Deferred::Unregister(sd) => {
            if list.remove(sd) {
                shared.reserved().release(sd);
                bal_debug!("removed socket {} from list", sd);
            } else {
                // already gone, typically removed on CLOSE
                bal_debug!("socket {} not found; ignoring removal request", sd);
            }
            Ok(())
        }
        Deferred::Modify { sd, add, remove } => modify_locked(shared, list, sd, add, remove),
    };
    if let Err(e) = res {
        bal_warn!("deferred registration change failed: {}", e);
    }
}

fn report_dangling<S: AsyncSocket>(list: &WatchList<S>) {
    for entry in list.iter() {
        bal_warn!(
            "dangling socket {} at shutdown (mask = {:08x})",
            entry.descriptor(),
            entry.interest().bits()
        );
    }
}

/// Scratch state reused across cycles.
struct Cycle<S> {
    interest: ReadySets,
    ready: ReadySets,
    ops: Vec<Deferred<S>>,
}

impl<S: AsyncSocket> Cycle<S> {
    fn new() -> Self {
        Self {
            interest: ReadySets::new(),
            ready: ReadySets::new(),
            ops: Vec::new(),
        }
    }

    /// Fill the interest sets and return the largest descriptor seen.
    fn build_sets(&mut self, list: &mut WatchList<S>) -> Descriptor {
        self.interest.clear();
        let mut max_sd = INVALID_DESCRIPTOR;

        list.reset_cursor();
        while let Some(key) = list.advance() {
            let Some(entry) = list.get_mut(key) else { continue };
            entry.muted = false;
            if entry.socket.take_pending_connect() {
                entry.connect_pending = true;
            }

            let sd = entry.descriptor();
            if entry.interest.wants_read_class() && !entry.connect_pending {
                self.interest.read.insert(sd);
            }
            if entry.interest.contains(Interest::WRITE) || entry.connect_pending {
                self.interest.write.insert(sd);
            }
            self.interest.except.insert(sd);

            if max_sd == INVALID_DESCRIPTOR || sd > max_sd {
                max_sd = sd;
            }
        }
        max_sd
    }

    fn run<M: Multiplexer>(&mut self, shared: &Shared<S>, list: &mut WatchList<S>, mux: &mut M) {
        shared.stats.cycle();
        let max_sd = self.build_sets(list);

        shared.stats.poll();
        match mux.poll(&self.interest, max_sd, &mut self.ready) {
            Err(e) => {
                shared.stats.poll_error();
                bal_trace!("{} failed: {}", mux.name(), e);
            }
            Ok(0) => {}
            Ok(_) => {
                for kind in SetKind::ORDER {
                    dispatch(shared, list, &self.ready, kind, &mut self.ops);
                    if shared.die.load(Ordering::Acquire) {
                        break;
                    }
                }
            }
        }

        if shared.die.load(Ordering::Acquire) {
            self.ops.clear();
            return;
        }
        for op in self.ops.drain(..) {
            apply(shared, list, op);
        }
    }
}

/// The poller loop; runs on a dedicated OS thread.
fn poller_loop<S: AsyncSocket, M: Multiplexer>(
    shared: Arc<Shared<S>>,
    mut mux: M,
    idle: IdleStrategy,
    empty_park: Duration,
) {
    CURRENT_POLLER.with(|c| c.set(shared_addr(&shared)));
    bal_debug!("poller running");

    let mut cycle = Cycle::new();
    while !shared.die.load(Ordering::Acquire) {
        let polled = {
            let mut list = shared.lock();
            if list.is_empty() {
                false
            } else {
                cycle.run(&shared, &mut list, &mut mux);
                shared.entries.store(list.len(), Ordering::Release);
                true
            }
        };

        if shared.die.load(Ordering::Acquire) {
            break;
        }
        if polled {
            idle.pause();
        } else {
            thread::park_timeout(empty_park);
        }
    }

    {
        let mut list = shared.lock();
        report_dangling(&list);
        list.clear();
        shared.reserved().clear();
        shared.entries.store(0, Ordering::Release);
    }
    while shared.deferred.pop().is_some() {}
    CURRENT_POLLER.with(|c| c.set(0));
    bal_debug!("poller exiting");
}
