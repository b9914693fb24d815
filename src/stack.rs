//! Intrusive LIFO stack over external storage.
//!
//! A singly-linked chain of caller-owned nodes. The stack holds only the top
//! handle; each node embeds its own `next` link via [`Chained`]. Push and pop
//! are O(1) and never allocate.
//!
//! # Example
//!
//! ```
//! use arbor_collections::{Arena, Chained, Key, Stack, Storage};
//!
//! #[derive(Debug)]
//! struct Frame {
//!     value: u64,
//!     next: u32,
//! }
//!
//! impl Chained<u32> for Frame {
//!     fn next(&self) -> u32 { self.next }
//!     fn set_next(&mut self, idx: u32) { self.next = idx; }
//! }
//!
//! let mut storage: Arena<Frame> = Arena::with_capacity(16);
//! let mut stack: Stack<u32> = Stack::new();
//!
//! let a = storage.try_insert(Frame { value: 1, next: u32::NONE }).unwrap();
//! let b = storage.try_insert(Frame { value: 2, next: u32::NONE }).unwrap();
//!
//! stack.push(&mut storage, a);
//! stack.push(&mut storage, b);
//!
//! assert_eq!(stack.pop(&mut storage), Some(b));
//! assert_eq!(stack.pop(&mut storage), Some(a));
//! assert_eq!(stack.pop(&mut storage), None);
//! ```

use core::marker::PhantomData;

use crate::{Key, Storage};

/// Trait for types that can participate in a singly-linked stack.
///
/// Fresh nodes must have `next` set to `Idx::NONE`.
pub trait Chained<Idx: Key> {
    /// Returns the next-node handle, or `Idx::NONE`.
    fn next(&self) -> Idx;

    /// Sets the next-node handle.
    fn set_next(&mut self, idx: Idx);
}

/// An intrusive LIFO stack over external storage.
#[derive(Debug, Clone)]
pub struct Stack<Idx: Key> {
    top: Idx,
    len: usize,
}

impl<Idx: Key> Default for Stack<Idx> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Idx: Key> Stack<Idx> {
    /// Creates an empty stack.
    #[inline]
    pub const fn new() -> Self {
        Self {
            top: Idx::NONE,
            len: 0,
        }
    }

    /// Returns the top handle, or `Idx::NONE` if empty.
    #[inline]
    pub const fn top(&self) -> Idx {
        self.top
    }

    /// Returns the number of nodes on the stack.
    #[inline]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the stack is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.top.is_none()
    }

    /// Pushes a node onto the top of the stack. O(1).
    ///
    /// The node must be unlinked (`next == Idx::NONE` and not already on a
    /// stack).
    pub fn push<T, S>(&mut self, storage: &mut S, idx: Idx)
    where
        T: Chained<Idx>,
        S: Storage<T, Index = Idx>,
    {
        let top = self.top;
        let node = storage.get_mut(idx).expect("dangling stack handle");
        debug_assert!(node.next().is_none() && top != idx, "node is already linked");
        node.set_next(top);
        self.top = idx;
        self.len += 1;
    }

    /// Pops the top node, returning its handle, or `None` if empty. O(1).
    ///
    /// The popped node's `next` link is reset to `Idx::NONE`.
    pub fn pop<T, S>(&mut self, storage: &mut S) -> Option<Idx>
    where
        T: Chained<Idx>,
        S: Storage<T, Index = Idx>,
    {
        if self.top.is_none() {
            return None;
        }
        let idx = self.top;
        let node = storage.get_mut(idx).expect("dangling stack handle");
        self.top = node.next();
        node.set_next(Idx::NONE);
        self.len -= 1;
        Some(idx)
    }

    /// Returns an iterator over `(handle, &node)` pairs from top to bottom.
    pub fn iter<'a, T, S>(&self, storage: &'a S) -> Iter<'a, T, S, Idx>
    where
        T: Chained<Idx>,
        S: Storage<T, Index = Idx>,
    {
        Iter {
            storage,
            cur: self.top,
            remaining: self.len,
            _marker: PhantomData,
        }
    }
}

/// Iterator over a stack, top to bottom.
///
/// Created by [`Stack::iter`].
pub struct Iter<'a, T, S, Idx: Key> {
    storage: &'a S,
    cur: Idx,
    remaining: usize,
    _marker: PhantomData<T>,
}

impl<'a, T, S, Idx> Iterator for Iter<'a, T, S, Idx>
where
    T: Chained<Idx> + 'a,
    S: Storage<T, Index = Idx>,
    Idx: Key,
{
    type Item = (Idx, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        if self.cur.is_none() {
            return None;
        }
        let idx = self.cur;
        let node = self.storage.get(idx).expect("dangling stack handle");
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
    T: Chained<Idx> + 'a,
    S: Storage<T, Index = Idx>,
    Idx: Key,
{
}
