//! # Watch list
//!
//! Registered sockets, one entry per descriptor, kept in registration
//! order. Entries live in an arena of slots; the list order is a chain
//! of `prev`/`next` slot indices. An [`EntryKey`] pairs a slot index with
//! the slot's generation, so a key to a removed entry never reaches a
//! later occupant of the same slot.
//!
//! The list carries one enumeration cursor. `reset_cursor()` points it at
//! the head; `advance()` yields the cursor's entry and moves on. Running
//! off the end yields `None` once and rewinds to the head. Removing the
//! entry under the cursor moves the cursor to its successor, so removal
//! during a traversal is safe.
//!
//! The list does no locking; the poller keeps it behind a mutex.

use std::sync::Arc;

use bal_core::{AsyncSocket, BalError, BalResult, Descriptor, Event, Interest};

/// Callback invoked on the poller thread.
pub type Callback<S> = Arc<dyn Fn(&Arc<S>, Event) + Send + Sync>;

/// One registered socket.
pub struct WatchEntry<S> {
    pub(crate) socket: Arc<S>,
    pub(crate) interest: Interest,
    pub(crate) callback: Callback<S>,
    /// A non-blocking connect was seen and its outcome not yet reported.
    pub(crate) connect_pending: bool,
    /// Unregistered from a callback; skipped until the cycle ends.
    pub(crate) muted: bool,
}

impl<S: AsyncSocket> WatchEntry<S> {
    pub fn new(socket: Arc<S>, interest: Interest, callback: Callback<S>) -> Self {
        Self {
            socket,
            interest,
            callback,
            connect_pending: false,
            muted: false,
        }
    }

    #[inline]
    pub fn descriptor(&self) -> Descriptor {
        self.socket.descriptor()
    }

    pub fn socket(&self) -> &Arc<S> {
        &self.socket
    }

    pub fn interest(&self) -> Interest {
        self.interest
    }

    pub fn connect_pending(&self) -> bool {
        self.connect_pending
    }

    /// Replace interest and callback in place.
    pub fn update(&mut self, socket: Arc<S>, interest: Interest, callback: Callback<S>) {
        self.socket = socket;
        self.interest = interest;
        self.callback = callback;
    }
}

impl<S: AsyncSocket> std::fmt::Debug for WatchEntry<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchEntry")
            .field("sd", &self.descriptor())
            .field("interest", &self.interest)
            .field("connect_pending", &self.connect_pending)
            .finish()
    }
}

/// Stable handle to an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryKey {
    index: u32,
    generation: u32,
}

struct Node<S> {
    entry: WatchEntry<S>,
    prev: Option<u32>,
    next: Option<u32>,
}

struct Slot<S> {
    generation: u32,
    node: Option<Node<S>>,
}

/// Bounded, ordered collection of watch entries keyed by descriptor.
pub struct WatchList<S> {
    slots: Vec<Slot<S>>,
    free: Vec<u32>,
    head: Option<u32>,
    tail: Option<u32>,
    cursor: Option<u32>,
    len: usize,
    capacity: usize,
}

impl<S: AsyncSocket> WatchList<S> {
    /// Empty list holding at most `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            cursor: None,
            len: 0,
            capacity,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len >= self.capacity
    }

    fn node(&self, index: u32) -> Option<&Node<S>> {
        self.slots.get(index as usize).and_then(|s| s.node.as_ref())
    }

    fn node_mut(&mut self, index: u32) -> Option<&mut Node<S>> {
        self.slots.get_mut(index as usize).and_then(|s| s.node.as_mut())
    }

    fn key_of(&self, index: u32) -> EntryKey {
        EntryKey {
            index,
            generation: self.slots[index as usize].generation,
        }
    }

    fn index_of(&self, sd: Descriptor) -> Option<u32> {
        let mut at = self.head;
        while let Some(i) = at {
            let node = self.node(i)?;
            if node.entry.descriptor() == sd {
                return Some(i);
            }
            at = node.next;
        }
        None
    }

    /// Append `entry` at the tail.
    ///
    /// Fails when its descriptor is already present or the list is full;
    /// the list is unchanged on failure.
    pub fn add(&mut self, entry: WatchEntry<S>) -> BalResult<EntryKey> {
        let sd = entry.descriptor();
        if self.index_of(sd).is_some() {
            return Err(BalError::AlreadyRegistered(sd));
        }
        if self.is_full() {
            return Err(BalError::CapacityExceeded { limit: self.capacity });
        }

        let node = Node {
            entry,
            prev: self.tail,
            next: None,
        };
        let index = match self.free.pop() {
            Some(i) => {
                self.slots[i as usize].node = Some(node);
                i
            }
            None => {
                self.slots.push(Slot { generation: 0, node: Some(node) });
                (self.slots.len() - 1) as u32
            }
        };

        match self.tail {
            Some(t) => {
                if let Some(tail) = self.node_mut(t) {
                    tail.next = Some(index);
                }
            }
            None => {
                self.head = Some(index);
                self.cursor = Some(index);
            }
        }
        self.tail = Some(index);
        self.len += 1;
        Ok(self.key_of(index))
    }

    /// Entry for `sd`, if registered.
    pub fn find(&self, sd: Descriptor) -> Option<&WatchEntry<S>> {
        self.index_of(sd).and_then(|i| self.node(i)).map(|n| &n.entry)
    }

    pub fn find_mut(&mut self, sd: Descriptor) -> Option<&mut WatchEntry<S>> {
        let i = self.index_of(sd)?;
        self.node_mut(i).map(|n| &mut n.entry)
    }

    pub fn contains(&self, sd: Descriptor) -> bool {
        self.index_of(sd).is_some()
    }

    pub fn get(&self, key: EntryKey) -> Option<&WatchEntry<S>> {
        let slot = self.slots.get(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        slot.node.as_ref().map(|n| &n.entry)
    }

    pub fn get_mut(&mut self, key: EntryKey) -> Option<&mut WatchEntry<S>> {
        let slot = self.slots.get_mut(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        slot.node.as_mut().map(|n| &mut n.entry)
    }

    fn unlink(&mut self, index: u32) -> Option<WatchEntry<S>> {
        let node = self.slots.get_mut(index as usize)?.node.take()?;
        let slot = &mut self.slots[index as usize];
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(index);

        match node.prev {
            Some(p) => {
                if let Some(prev) = self.node_mut(p) {
                    prev.next = node.next;
                }
            }
            None => self.head = node.next,
        }
        match node.next {
            Some(n) => {
                if let Some(next) = self.node_mut(n) {
                    next.prev = node.prev;
                }
            }
            None => self.tail = node.prev,
        }
        if self.cursor == Some(index) {
            self.cursor = node.next;
        }
        self.len -= 1;
        Some(node.entry)
    }

    /// Remove the entry for `sd`. Returns whether one existed.
    pub fn remove(&mut self, sd: Descriptor) -> bool {
        match self.index_of(sd) {
            Some(i) => self.unlink(i).is_some(),
            None => false,
        }
    }

    /// Remove by key, returning the entry. Stale keys yield `None`.
    pub fn remove_key(&mut self, key: EntryKey) -> Option<WatchEntry<S>> {
        self.get(key)?;
        self.unlink(key.index)
    }

    /// Drop every entry and reset head, tail and cursor.
    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            if slot.node.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
            }
        }
        self.free = (0..self.slots.len() as u32).rev().collect();
        self.head = None;
        self.tail = None;
        self.cursor = None;
        self.len = 0;
    }

    /// Point the cursor at the head.
    #[inline]
    pub fn reset_cursor(&mut self) {
        self.cursor = self.head;
    }

    /// Yield the entry under the cursor and move past it.
    ///
    /// At the end of the list returns `None` and rewinds to the head.
    pub fn advance(&mut self) -> Option<EntryKey> {
        match self.cursor {
            Some(i) => {
                self.cursor = self.node(i).and_then(|n| n.next);
                Some(self.key_of(i))
            }
            None => {
                self.cursor = self.head;
                None
            }
        }
    }

    /// Entries in list order. Independent of the cursor.
    pub fn iter(&self) -> Iter<'_, S> {
        Iter { list: self, at: self.head }
    }
}

impl<S: AsyncSocket> std::fmt::Debug for WatchList<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

pub struct Iter<'a, S> {
    list: &'a WatchList<S>,
    at: Option<u32>,
}

impl<'a, S: AsyncSocket> Iterator for Iter<'a, S> {
    type Item = &'a WatchEntry<S>;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.list.node(self.at?)?;
        self.at = node.next;
        Some(&node.entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeSocket;

    fn noop() -> Callback<FakeSocket> {
        Arc::new(|_, _| {})
    }

    fn entry(sd: Descriptor) -> WatchEntry<FakeSocket> {
        WatchEntry::new(Arc::new(FakeSocket::new(sd)), Interest::READ, noop())
    }

    fn order(list: &WatchList<FakeSocket>) -> Vec<Descriptor> {
        list.iter().map(|e| e.descriptor()).collect()
    }

    #[test]
    fn test_add_find_remove() {
        let mut list = WatchList::with_capacity(8);
        list.add(entry(3)).unwrap();
        list.add(entry(5)).unwrap();
        list.add(entry(7)).unwrap();
        assert_eq!(list.len(), 3);
        assert_eq!(order(&list), vec![3, 5, 7]);

        assert!(list.find(5).is_some());
        assert!(list.remove(5));
        assert!(!list.remove(5));
        assert!(list.find(5).is_none());
        assert_eq!(order(&list), vec![3, 7]);
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut list = WatchList::with_capacity(8);
        list.add(entry(4)).unwrap();
        assert_eq!(list.add(entry(4)).unwrap_err(), BalError::AlreadyRegistered(4));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_capacity_bound() {
        let mut list = WatchList::with_capacity(2);
        list.add(entry(1)).unwrap();
        list.add(entry(2)).unwrap();
        let err = list.add(entry(3)).unwrap_err();
        assert_eq!(err, BalError::CapacityExceeded { limit: 2 });
        assert_eq!(order(&list), vec![1, 2]);
    }

    #[test]
    fn test_find_mut_updates_in_place() {
        let mut list = WatchList::with_capacity(4);
        list.add(entry(9)).unwrap();
        list.find_mut(9).unwrap().interest = Interest::WRITE;
        assert_eq!(list.find(9).unwrap().interest(), Interest::WRITE);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_cursor_full_traversal_and_implicit_reset() {
        let mut list = WatchList::with_capacity(4);
        for sd in [10, 11, 12] {
            list.add(entry(sd)).unwrap();
        }
        list.reset_cursor();
        let mut seen = Vec::new();
        while let Some(k) = list.advance() {
            seen.push(list.get(k).unwrap().descriptor());
        }
        assert_eq!(seen, vec![10, 11, 12]);

        // past the end rewound to the head
        let k = list.advance().unwrap();
        assert_eq!(list.get(k).unwrap().descriptor(), 10);
    }

    #[test]
    fn test_remove_current_during_traversal() {
        let mut list = WatchList::with_capacity(8);
        for sd in [1, 2, 3, 4] {
            list.add(entry(sd)).unwrap();
        }
        list.reset_cursor();
        let mut seen = Vec::new();
        while let Some(k) = list.advance() {
            let sd = list.get(k).unwrap().descriptor();
            seen.push(sd);
            if sd % 2 == 0 {
                assert!(list.remove_key(k).is_some());
            }
        }
        assert_eq!(seen, vec![1, 2, 3, 4]);
        assert_eq!(order(&list), vec![1, 3]);
    }

    #[test]
    fn test_remove_under_cursor_moves_it() {
        let mut list = WatchList::with_capacity(8);
        for sd in [1, 2, 3] {
            list.add(entry(sd)).unwrap();
        }
        list.reset_cursor();
        list.advance(); // yields 1, cursor now on 2
        assert!(list.remove(2));
        let k = list.advance().unwrap();
        assert_eq!(list.get(k).unwrap().descriptor(), 3);
    }

    #[test]
    fn test_stale_key_after_reuse() {
        let mut list = WatchList::with_capacity(4);
        let k1 = list.add(entry(1)).unwrap();
        assert!(list.remove(1));
        let k2 = list.add(entry(2)).unwrap();
        assert!(list.get(k1).is_none());
        assert!(list.remove_key(k1).is_none());
        assert_eq!(list.get(k2).unwrap().descriptor(), 2);
    }

    #[test]
    fn test_clear() {
        let mut list = WatchList::with_capacity(4);
        let k = list.add(entry(1)).unwrap();
        list.add(entry(2)).unwrap();
        list.clear();
        assert!(list.is_empty());
        assert!(list.get(k).is_none());
        assert!(list.advance().is_none());

        list.add(entry(5)).unwrap();
        assert_eq!(order(&list), vec![5]);
        let k = list.advance().unwrap();
        assert_eq!(list.get(k).unwrap().descriptor(), 5);
    }

    #[test]
    fn test_add_to_empty_points_cursor_at_it() {
        let mut list = WatchList::with_capacity(4);
        list.reset_cursor();
        list.add(entry(8)).unwrap();
        let k = list.advance().unwrap();
        assert_eq!(list.get(k).unwrap().descriptor(), 8);
        assert!(list.advance().is_none());
    }
}
