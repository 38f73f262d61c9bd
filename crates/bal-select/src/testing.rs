//! Test doubles: a socket with scripted peek results, a multiplexer with
//! scripted readiness, and an event recorder.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bal_core::{AsyncSocket, BalError, BalResult, Descriptor, Event, PeekStatus, SocketFlags};

use crate::fdset::{ReadySets, SetKind};
use crate::mux::Multiplexer;

pub(crate) struct FakeSocket {
    sd: Descriptor,
    flags: SocketFlags,
    peek: Mutex<PeekStatus>,
    error: Mutex<Option<i32>>,
    nonblocking: AtomicBool,
    fail_nonblocking: AtomicBool,
}

impl FakeSocket {
    pub(crate) fn new(sd: Descriptor) -> Self {
        Self {
            sd,
            flags: SocketFlags::new(),
            peek: Mutex::new(PeekStatus::WouldBlock),
            error: Mutex::new(None),
            nonblocking: AtomicBool::new(false),
            fail_nonblocking: AtomicBool::new(false),
        }
    }

    pub(crate) fn set_peek(&self, status: PeekStatus) {
        *self.peek.lock().unwrap() = status;
    }

    pub(crate) fn set_error(&self, code: Option<i32>) {
        *self.error.lock().unwrap() = code;
    }

    pub(crate) fn fail_nonblocking(&self, fail: bool) {
        self.fail_nonblocking.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn is_nonblocking(&self) -> bool {
        self.nonblocking.load(Ordering::SeqCst)
    }
}

impl AsyncSocket for FakeSocket {
    fn descriptor(&self) -> Descriptor {
        self.sd
    }

    fn flags(&self) -> &SocketFlags {
        &self.flags
    }

    fn peek(&self) -> PeekStatus {
        *self.peek.lock().unwrap()
    }

    fn set_nonblocking(&self, nonblocking: bool) -> BalResult<()> {
        if self.fail_nonblocking.load(Ordering::SeqCst) {
            return Err(BalError::Os(9));
        }
        self.nonblocking.store(nonblocking, Ordering::SeqCst);
        Ok(())
    }

    fn take_error(&self) -> Option<i32> {
        self.error.lock().unwrap().take()
    }
}

#[derive(Default)]
struct Script {
    ready: ReadySets,
    fail: bool,
    paused: bool,
    polls: usize,
    last_interest: ReadySets,
    last_max: Descriptor,
}

/// Level-triggered scripted readiness: a descriptor stays ready in a set
/// until the test clears it.
#[derive(Clone)]
pub(crate) struct FakeMux {
    capacity: usize,
    script: Arc<Mutex<Script>>,
}

impl FakeMux {
    pub(crate) const MAX_SD: Descriptor = 1023;

    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            script: Arc::new(Mutex::new(Script::default())),
        }
    }

    fn set(&self, kind: SetKind, sd: Descriptor, on: bool) {
        let mut s = self.script.lock().unwrap();
        if on {
            s.ready.get_mut(kind).insert(sd);
        } else {
            s.ready.get_mut(kind).remove(sd);
        }
    }

    pub(crate) fn set_readable(&self, sd: Descriptor, on: bool) {
        self.set(SetKind::Read, sd, on);
    }

    pub(crate) fn set_writable(&self, sd: Descriptor, on: bool) {
        self.set(SetKind::Write, sd, on);
    }

    pub(crate) fn set_except(&self, sd: Descriptor, on: bool) {
        self.set(SetKind::Except, sd, on);
    }

    /// Make every poll fail.
    pub(crate) fn set_fail(&self, fail: bool) {
        self.script.lock().unwrap().fail = fail;
    }

    /// Report nothing ready while paused.
    pub(crate) fn pause(&self, paused: bool) {
        self.script.lock().unwrap().paused = paused;
    }

    /// Polls made while not paused.
    pub(crate) fn polls(&self) -> usize {
        self.script.lock().unwrap().polls
    }

    pub(crate) fn last_interest(&self) -> ReadySets {
        self.script.lock().unwrap().last_interest.clone()
    }

    pub(crate) fn last_max(&self) -> Descriptor {
        self.script.lock().unwrap().last_max
    }
}

impl Multiplexer for FakeMux {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn accepts(&self, sd: Descriptor) -> bool {
        (0..=Self::MAX_SD).contains(&sd)
    }

    fn poll(
        &mut self,
        interest: &ReadySets,
        max_sd: Descriptor,
        ready: &mut ReadySets,
    ) -> io::Result<usize> {
        ready.clear();
        let mut s = self.script.lock().unwrap();
        if s.fail {
            return Err(io::Error::from_raw_os_error(9));
        }
        if s.paused {
            return Ok(0);
        }
        s.polls += 1;
        s.last_interest = interest.clone();
        s.last_max = max_sd;

        let mut n = 0;
        for kind in SetKind::ORDER {
            for sd in interest.get(kind).iter() {
                if s.ready.get(kind).contains(sd) {
                    ready.get_mut(kind).insert(sd);
                    n += 1;
                }
            }
        }
        Ok(n)
    }
}

/// Records every (descriptor, event) a callback sees.
#[derive(Clone, Default)]
pub(crate) struct Recorder {
    events: Arc<Mutex<Vec<(Descriptor, Event)>>>,
}

impl Recorder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn callback(&self) -> impl Fn(&Arc<FakeSocket>, Event) + Clone + Send + Sync + 'static {
        let events = self.events.clone();
        move |s: &Arc<FakeSocket>, ev: Event| events.lock().unwrap().push((s.descriptor(), ev))
    }

    pub(crate) fn events(&self) -> Vec<(Descriptor, Event)> {
        self.events.lock().unwrap().clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub(crate) fn count(&self, ev: Event) -> usize {
        self.events.lock().unwrap().iter().filter(|(_, e)| *e == ev).count()
    }
}

/// Poll `cond` every millisecond until it holds or `timeout` passes.
pub(crate) fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    cond()
}
