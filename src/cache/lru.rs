use std::collections::HashMap;
use std::hash::Hash;

const NIL: usize = usize::MAX;

#[derive(Debug)]
struct Slot<K> {
    key: Option<K>,
    prev: usize,
    next: usize,
}

/// Recency list with O(1) insert, touch and removal.
///
/// The front is the most recently used key (rank 0); the back is the eviction candidate.
#[derive(Debug)]
pub(crate) struct LruList<K> {
    slots: Vec<Slot<K>>,
    free: Vec<usize>,
    index: HashMap<K, usize>,
    head: usize,
    tail: usize,
}

impl<K: Copy + Eq + Hash> Default for LruList<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Copy + Eq + Hash> LruList<K> {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
            head: NIL,
            tail: NIL,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.index.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub(crate) fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Insert `key` as most recent, or move it to the front if present.
    pub(crate) fn push_front(&mut self, key: K) {
        if let Some(&i) = self.index.get(&key) {
            self.unlink(i);
            self.link_front(i);
            return;
        }
        let slot = Slot {
            key: Some(key),
            prev: NIL,
            next: NIL,
        };
        let i = match self.free.pop() {
            Some(i) => {
                self.slots[i] = slot;
                i
            }
            None => {
                self.slots.push(slot);
                self.slots.len() - 1
            }
        };
        self.index.insert(key, i);
        self.link_front(i);
    }

    /// Append `key` as least recent. Used when rebuilding from a persisted order.
    pub(crate) fn push_back(&mut self, key: K) {
        self.push_front(key);
        if let Some(&i) = self.index.get(&key) {
            self.unlink(i);
            self.link_back(i);
        }
    }

    /// Mark `key` as most recently used. Returns `false` if absent.
    pub(crate) fn touch(&mut self, key: &K) -> bool {
        let Some(&i) = self.index.get(key) else {
            return false;
        };
        if self.head != i {
            self.unlink(i);
            self.link_front(i);
        }
        true
    }

    pub(crate) fn remove(&mut self, key: &K) -> bool {
        let Some(i) = self.index.remove(key) else {
            return false;
        };
        self.unlink(i);
        self.slots[i].key = None;
        self.free.push(i);
        true
    }

    /// Remove and return the least recently used key.
    pub(crate) fn pop_back(&mut self) -> Option<K> {
        let key = self.slots.get(self.tail)?.key?;
        self.remove(&key);
        Some(key)
    }

    /// Position from the front, 0 being the most recent.
    pub(crate) fn rank(&self, key: &K) -> Option<usize> {
        if !self.index.contains_key(key) {
            return None;
        }
        self.iter().position(|k| k == *key)
    }

    /// Keys from most to least recent.
    pub(crate) fn iter(&self) -> impl Iterator<Item = K> + '_ {
        let mut cursor = self.head;
        std::iter::from_fn(move || {
            let slot = self.slots.get(cursor)?;
            cursor = slot.next;
            slot.key
        })
    }

    pub(crate) fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.index.clear();
        self.head = NIL;
        self.tail = NIL;
    }

    fn unlink(&mut self, i: usize) {
        let (prev, next) = (self.slots[i].prev, self.slots[i].next);
        if prev == NIL {
            self.head = next;
        } else {
            self.slots[prev].next = next;
        }
        if next == NIL {
            self.tail = prev;
        } else {
            self.slots[next].prev = prev;
        }
        self.slots[i].prev = NIL;
        self.slots[i].next = NIL;
    }

    fn link_front(&mut self, i: usize) {
        self.slots[i].prev = NIL;
        self.slots[i].next = self.head;
        if self.head != NIL {
            self.slots[self.head].prev = i;
        }
        self.head = i;
        if self.tail == NIL {
            self.tail = i;
        }
    }

    fn link_back(&mut self, i: usize) {
        self.slots[i].next = NIL;
        self.slots[i].prev = self.tail;
        if self.tail != NIL {
            self.slots[self.tail].next = i;
        }
        self.tail = i;
        if self.head == NIL {
            self.head = i;
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/cache/lru.rs"]
mod tests;
