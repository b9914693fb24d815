//! Intrusive FIFO queue over external storage.
//!
//! A doubly-linked chain of caller-owned nodes, threaded from the newest
//! element to the oldest. The queue holds the handles of both ends; each node
//! embeds `prev`/`next` links via [`Linked`]. Enqueue and dequeue are O(1)
//! and never allocate.
//!
//! Iteration runs newest to oldest while dequeue removes the oldest, so a
//! queue holding 1, 2, 3, 4 (enqueued in that order) iterates as
//! `4, 3, 2, 1` and dequeues `1` first.
//!
//! # Example
//!
//! ```
//! use arbor_collections::{Arena, Key, Linked, Queue, Storage};
//!
//! #[derive(Debug)]
//! struct Job {
//!     id: u64,
//!     prev: u32,
//!     next: u32,
//! }
//!
//! impl Linked<u32> for Job {
//!     fn prev(&self) -> u32 { self.prev }
//!     fn next(&self) -> u32 { self.next }
//!     fn set_prev(&mut self, idx: u32) { self.prev = idx; }
//!     fn set_next(&mut self, idx: u32) { self.next = idx; }
//! }
//!
//! let mut storage: Arena<Job> = Arena::with_capacity(16);
//! let mut queue: Queue<u32> = Queue::new();
//!
//! let a = storage.try_insert(Job { id: 1, prev: u32::NONE, next: u32::NONE }).unwrap();
//! let b = storage.try_insert(Job { id: 2, prev: u32::NONE, next: u32::NONE }).unwrap();
//!
//! queue.enqueue(&mut storage, a);
//! queue.enqueue(&mut storage, b);
//!
//! // FIFO: the first enqueued comes out first
//! assert_eq!(queue.dequeue(&mut storage), Some(a));
//! assert_eq!(queue.dequeue(&mut storage), Some(b));
//! assert_eq!(queue.dequeue(&mut storage), None);
//! ```

use core::marker::PhantomData;

use crate::{Key, Storage};

/// Trait for types that can participate in a doubly-linked queue.
///
/// `next` points toward the oldest end, `prev` toward the newest. Fresh
/// nodes must have both links set to `Idx::NONE`.
pub trait Linked<Idx: Key> {
    /// Returns the handle one step toward the newest end, or `Idx::NONE`.
    fn prev(&self) -> Idx;

    /// Returns the handle one step toward the oldest end, or `Idx::NONE`.
    fn next(&self) -> Idx;

    /// Sets the newest-direction handle.
    fn set_prev(&mut self, idx: Idx);

    /// Sets the oldest-direction handle.
    fn set_next(&mut self, idx: Idx);
}

/// An intrusive FIFO queue over external storage.
///
/// `newest` and `oldest` are both `Idx::NONE` exactly when the queue is
/// empty.
#[derive(Debug, Clone)]
pub struct Queue<Idx: Key> {
    newest: Idx,
    oldest: Idx,
    len: usize,
}

impl<Idx: Key> Default for Queue<Idx> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Idx: Key> Queue<Idx> {
    /// Creates an empty queue.
    #[inline]
    pub const fn new() -> Self {
        Self {
            newest: Idx::NONE,
            oldest: Idx::NONE,
            len: 0,
        }
    }

    /// Returns the newest (most recently enqueued) handle, or `Idx::NONE`.
    #[inline]
    pub const fn newest(&self) -> Idx {
        self.newest
    }

    /// Returns the oldest (next to dequeue) handle, or `Idx::NONE`.
    #[inline]
    pub const fn oldest(&self) -> Idx {
        self.oldest
    }

    /// Returns the number of nodes in the queue.
    #[inline]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the queue is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.newest.is_none()
    }

    /// Enqueues a node at the newest end. O(1).
    ///
    /// The node must be unlinked (both links `Idx::NONE` and not already in
    /// a queue).
    pub fn enqueue<T, S>(&mut self, storage: &mut S, idx: Idx)
    where
        T: Linked<Idx>,
        S: Storage<T, Index = Idx>,
    {
        let old_newest = self.newest;
        {
            let node = storage.get_mut(idx).expect("dangling queue handle");
            debug_assert!(
                node.prev().is_none() && node.next().is_none() && old_newest != idx,
                "node is already linked"
            );
            node.set_prev(Idx::NONE);
            node.set_next(old_newest);
        }
        if old_newest.is_some() {
            storage
                .get_mut(old_newest)
                .expect("dangling queue handle")
                .set_prev(idx);
        } else {
            self.oldest = idx;
        }
        self.newest = idx;
        self.len += 1;
    }

    /// Dequeues the oldest node, returning its handle, or `None` if empty.
    /// O(1).
    ///
    /// The dequeued node's links are reset to `Idx::NONE`.
    pub fn dequeue<T, S>(&mut self, storage: &mut S) -> Option<Idx>
    where
        T: Linked<Idx>,
        S: Storage<T, Index = Idx>,
    {
        if self.oldest.is_none() {
            return None;
        }
        let idx = self.oldest;
        let prev = {
            let node = storage.get_mut(idx).expect("dangling queue handle");
            let prev = node.prev();
            node.set_prev(Idx::NONE);
            node.set_next(Idx::NONE);
            prev
        };
        if prev.is_some() {
            storage
                .get_mut(prev)
                .expect("dangling queue handle")
                .set_next(Idx::NONE);
            self.oldest = prev;
        } else {
            self.newest = Idx::NONE;
            self.oldest = Idx::NONE;
        }
        self.len -= 1;
        Some(idx)
    }

    /// Returns an iterator over `(handle, &node)` pairs from newest to
    /// oldest.
    pub fn iter<'a, T, S>(&self, storage: &'a S) -> Iter<'a, T, S, Idx>
    where
        T: Linked<Idx>,
        S: Storage<T, Index = Idx>,
    {
        Iter {
            storage,
            cur: self.newest,
            remaining: self.len,
            _marker: PhantomData,
        }
    }
}

/// Iterator over a queue, newest to oldest.
///
/// Created by [`Queue::iter`].
pub struct Iter<'a, T, S, Idx: Key> {
    storage: &'a S,
    cur: Idx,
    remaining: usize,
    _marker: PhantomData<T>,
}

impl<'a, T, S, Idx> Iterator for Iter<'a, T, S, Idx>
where
    T: Linked<Idx> + 'a,
    S: Storage<T, Index = Idx>,
    Idx: Key,
{
    type Item = (Idx, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        if self.cur.is_none() {
            return None;
        }
        let idx = self.cur;
        let node = self.storage.get(idx).expect("dangling queue handle");
        self.cur = node.next();
        self.remaining -= 1;
        Some((idx, node))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'a, T, S, Idx> ExactSizeIterator for Iter<'a, T, S, Idx>
where
    T: Linked<Idx> + 'a,
    S: Storage<T, Index = Idx>,
    Idx: Key,
{
}
