//! Bounded, recency-ordered cache from a query descriptor to a previously
//! computed result.
//!
//! Recency is maintained through a doubly-linked ordering over a slab of
//! slots plus a hash index, giving O(1) lookup, promotion and eviction. Both
//! a hit and a re-put of an existing key promote it to most-recently-used.
//! The cache itself knows nothing about invalidation; the access layer that
//! owns it clears it wholesale before any writing statement executes.

use std::collections::HashMap;
use std::hash::BuildHasherDefault;

use seahash::SeaHasher;

use crate::value::{Row, Value};

pub type CacheHasher = BuildHasherDefault<SeaHasher>;

/// Results of different shapes never collide: the same SQL text and
/// parameters asked for as a scalar and as a row set are distinct entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultShape {
    Scalar,
    Row,
    Rows,
}

/// What a cached query looked like: result shape, SQL text, parameter list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    pub shape: ResultShape,
    pub sql: String,
    pub params: Vec<Value>,
}

#[derive(Debug, Clone)]
pub enum CachedResult {
    Scalar(Value),
    Row(Option<Row>),
    Rows(Vec<Row>),
}

const NIL: usize = usize::MAX;

#[derive(Debug)]
struct Slot {
    key: QueryKey,
    value: CachedResult,
    prev: usize,
    next: usize,
}

#[derive(Debug)]
pub struct QueryCache {
    capacity: usize,
    index: HashMap<QueryKey, usize, CacheHasher>,
    slots: Vec<Option<Slot>>,
    free: Vec<usize>,
    head: usize,
    tail: usize,
}

impl QueryCache {
    /// A cache with room for `capacity` entries. Capacity 0 disables caching
    /// altogether: every put becomes a no-op.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            index: HashMap::default(),
            slots: Vec::new(),
            free: Vec::new(),
            head: NIL,
            tail: NIL,
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Shrinking immediately evicts from the least-recently-used end until
    /// the cache fits.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        while self.index.len() > self.capacity {
            self.evict_tail();
        }
    }

    pub fn contains(&self, key: &QueryKey) -> bool {
        self.index.contains_key(key)
    }

    /// A hit promotes the key to most-recently-used.
    pub fn get(&mut self, key: &QueryKey) -> Option<CachedResult> {
        let i = *self.index.get(key)?;
        self.detach(i);
        self.attach_front(i);
        Some(self.slot(i).value.clone())
    }

    /// Inserting over an existing key replaces its value and promotes it.
    pub fn put(&mut self, key: QueryKey, value: CachedResult) {
        if self.capacity == 0 {
            return;
        }
        if let Some(&i) = self.index.get(&key) {
            self.slot_mut(i).value = value;
            self.detach(i);
            self.attach_front(i);
            return;
        }
        if self.index.len() >= self.capacity {
            self.evict_tail();
        }
        let slot = Slot {
            key: key.clone(),
            value,
            prev: NIL,
            next: NIL,
        };
        let i = match self.free.pop() {
            Some(i) => {
                self.slots[i] = Some(slot);
                i
            }
            None => {
                self.slots.push(Some(slot));
                self.slots.len() - 1
            }
        };
        self.index.insert(key, i);
        self.attach_front(i);
    }

    pub fn remove(&mut self, key: &QueryKey) {
        if let Some(i) = self.index.remove(key) {
            self.detach(i);
            self.slots[i] = None;
            self.free.push(i);
        }
    }

    pub fn clear(&mut self) {
        self.index.clear();
        self.slots.clear();
        self.free.clear();
        self.head = NIL;
        self.tail = NIL;
    }

    fn slot(&self, i: usize) -> &Slot {
        self.slots[i].as_ref().expect("linked slot must be occupied")
    }
    fn slot_mut(&mut self, i: usize) -> &mut Slot {
        self.slots[i].as_mut().expect("linked slot must be occupied")
    }

    fn detach(&mut self, i: usize) {
        let (prev, next) = {
            let slot = self.slot(i);
            (slot.prev, slot.next)
        };
        if prev != NIL {
            self.slot_mut(prev).next = next;
        } else {
            self.head = next;
        }
        if next != NIL {
            self.slot_mut(next).prev = prev;
        } else {
            self.tail = prev;
        }
    }

    fn attach_front(&mut self, i: usize) {
        let old_head = self.head;
        {
            let slot = self.slot_mut(i);
            slot.prev = NIL;
            slot.next = old_head;
        }
        if old_head != NIL {
            self.slot_mut(old_head).prev = i;
        }
        self.head = i;
        if self.tail == NIL {
            self.tail = i;
        }
    }

    fn evict_tail(&mut self) {
        let i = self.tail;
        if i == NIL {
            return;
        }
        self.detach(i);
        let slot = self.slots[i].take().expect("tail slot must be occupied");
        self.index.remove(&slot.key);
        self.free.push(i);
    }
}
