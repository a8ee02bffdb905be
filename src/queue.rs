//! Ordered FIFO container shared by every queue in the link.
//!
//! Inbound frame queues, inbound command queues, the sender's staging queue
//! and its retransmission window are all [`OrderedQueue`]s.  Items only ever
//! enter at the back and leave from the front; the window additionally needs
//! indexed, in-order iteration for go-back-N retransmission.

use std::collections::VecDeque;

/// A FIFO queue with indexed access, backed by a ring buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedQueue<T> {
    items: VecDeque<T>,
}

impl<T> Default for OrderedQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> OrderedQueue<T> {
    pub fn new() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
        }
    }

    /// Append an item at the back.
    pub fn push(&mut self, item: T) {
        self.items.push_back(item);
    }

    /// Remove and return the oldest item.
    pub fn pop(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    /// The oldest item, without removing it.
    pub fn front(&self) -> Option<&T> {
        self.items.front()
    }

    /// Item at `index`, counting from the oldest (index 0).
    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterate from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    /// Take every queued item, oldest first, leaving the queue empty.
    ///
    /// The returned queue owns the items, so the caller can release whatever
    /// lock guarded `self` before consuming them.
    pub fn take_all(&mut self) -> OrderedQueue<T> {
        OrderedQueue {
            items: std::mem::take(&mut self.items),
        }
    }
}

impl<T> IntoIterator for OrderedQueue<T> {
    type Item = T;
    type IntoIter = std::collections::vec_deque::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<T> Extend<T> for OrderedQueue<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        self.items.extend(iter);
    }
}

impl<T> FromIterator<T> for OrderedQueue<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}
