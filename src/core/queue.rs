//! Admission control: the deferred-request queue and the active set.
//!
//! The queue keeps arrival order until `reorder()` is called, which stably
//! sorts it by descending priority. Equal priorities therefore keep FIFO
//! order within a drain pass.

use std::collections::{HashMap, VecDeque};

use uuid::Uuid;

use crate::domain::Priority;

/// An entry waiting in the priority queue
#[derive(Debug, Clone)]
pub struct QueuedItem<T> {
    pub id: Uuid,
    pub priority: Priority,
    pub item: T,
}

/// Requests admitted but deferred until a concurrency slot frees up
#[derive(Debug)]
pub struct PriorityQueue<T> {
    items: VecDeque<QueuedItem<T>>,
}

impl<T> Default for PriorityQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PriorityQueue<T> {
    pub fn new() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }

    /// Append in arrival order
    pub fn push(&mut self, id: Uuid, priority: Priority, item: T) {
        self.items.push_back(QueuedItem { id, priority, item });
    }

    /// Stable sort by descending priority
    pub fn reorder(&mut self) {
        self.items
            .make_contiguous()
            .sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    /// Take the item at the head of the queue
    pub fn pop_next(&mut self) -> Option<QueuedItem<T>> {
        self.items.pop_front()
    }

    /// Remove a specific entry, wherever it sits
    pub fn remove(&mut self, id: &Uuid) -> Option<QueuedItem<T>> {
        let position = self.items.iter().position(|queued| queued.id == *id)?;
        self.items.remove(position)
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.items.iter().any(|queued| queued.id == *id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Ids in current queue order
    pub fn ids(&self) -> Vec<Uuid> {
        self.items.iter().map(|queued| queued.id).collect()
    }
}

/// Requests currently executing, bounded by `max_concurrent`
#[derive(Debug)]
pub struct ActiveSet<T> {
    entries: HashMap<Uuid, T>,
    max_concurrent: usize,
}

impl<T> ActiveSet<T> {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            entries: HashMap::new(),
            max_concurrent,
        }
    }

    /// Whether another request may start executing
    pub fn has_capacity(&self) -> bool {
        self.entries.len() < self.max_concurrent
    }

    /// Track an executing request.
    ///
    /// Callers check `has_capacity()` first; the set itself does not refuse.
    pub fn insert(&mut self, id: Uuid, item: T) {
        debug_assert!(self.entries.len() < self.max_concurrent && !self.entries.contains_key(&id));
        self.entries.insert(id, item);
    }

    pub fn remove(&mut self, id: &Uuid) -> Option<T> {
        self.entries.remove(id)
    }

    pub fn get(&self, id: &Uuid) -> Option<&T> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.entries.values()
    }
}
