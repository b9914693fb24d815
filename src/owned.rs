//! Self-contained wrappers that bundle a container with its storage.
//!
//! The intrusive containers keep storage external so nodes can live in
//! caller-controlled memory and participate in several structures at once.
//! Most callers do not need that flexibility; the types here pair each
//! container with a private [`Arena`] and ready-made node types so the API
//! reads like an ordinary collection.
//!
//! # Example
//!
//! ```
//! use arbor_collections::OwnedTree;
//!
//! let mut tree: OwnedTree<i64, &str> = OwnedTree::with_capacity(16);
//!
//! tree.insert(2, "two").unwrap();
//! tree.insert(1, "one").unwrap();
//!
//! assert_eq!(tree.get(&1), Some(&"one"));
//! assert_eq!(tree.remove(&2), Some("two"));
//! assert_eq!(tree.len(), 1);
//! ```

use crate::queue::{self, Linked, Queue};
use crate::stack::{self, Chained, Stack};
use crate::storage::Full;
use crate::tree::{self, Color, RbTree, TreeLinked};
use crate::{Arena, Key, Storage};

// =============================================================================
// OwnedTree
// =============================================================================

/// Tree node bundling a key and a value, used by [`OwnedTree`].
pub struct TreeEntry<K, V, Idx: Key> {
    key: K,
    value: V,
    color: Color,
    parent: Idx,
    left: Idx,
    right: Idx,
}

impl<K, V, Idx: Key> TreeEntry<K, V, Idx> {
    fn new(key: K, value: V) -> Self {
        Self {
            key,
            value,
            color: Color::Red,
            parent: Idx::NONE,
            left: Idx::NONE,
            right: Idx::NONE,
        }
    }
}

impl<K: Ord, V, Idx: Key> TreeLinked<Idx> for TreeEntry<K, V, Idx> {
    type Key = K;

    fn key(&self) -> &K {
        &self.key
    }
    fn left(&self) -> Idx {
        self.left
    }
    fn right(&self) -> Idx {
        self.right
    }
    fn parent(&self) -> Idx {
        self.parent
    }
    fn color(&self) -> Color {
        self.color
    }
    fn set_left(&mut self, idx: Idx) {
        self.left = idx;
    }
    fn set_right(&mut self, idx: Idx) {
        self.right = idx;
    }
    fn set_parent(&mut self, idx: Idx) {
        self.parent = idx;
    }
    fn set_color(&mut self, color: Color) {
        self.color = color;
    }
}

/// Error returned by [`OwnedTree::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertError<K, V> {
    /// The backing storage is full; returns the rejected pair.
    Full(K, V),
    /// An equal key is already present; returns the rejected pair.
    Duplicate(K, V),
}

impl<K, V> InsertError<K, V> {
    /// Returns the key/value pair that could not be inserted.
    pub fn into_inner(self) -> (K, V) {
        match self {
            InsertError::Full(k, v) | InsertError::Duplicate(k, v) => (k, v),
        }
    }
}

impl<K, V> core::fmt::Display for InsertError<K, V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            InsertError::Full(..) => write!(f, "tree storage is full"),
            InsertError::Duplicate(..) => write!(f, "an equal key is already in the tree"),
        }
    }
}

impl<K: core::fmt::Debug, V: core::fmt::Debug> std::error::Error for InsertError<K, V> {}

/// An ordered map backed by [`RbTree`] with built-in storage.
///
/// Fixed capacity; keys are unique and kept in ascending order.
pub struct OwnedTree<K: Ord, V, Idx: Key = u32> {
    storage: Arena<TreeEntry<K, V, Idx>, Idx>,
    tree: RbTree<Idx>,
}

impl<K: Ord, V, Idx: Key> OwnedTree<K, V, Idx> {
    /// Creates a tree with capacity for `capacity` entries.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0 or does not fit the index type.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            storage: Arena::with_capacity(capacity),
            tree: RbTree::new(),
        }
    }

    /// Returns the number of entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// Returns `true` if the tree holds no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Returns the capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.storage.capacity()
    }

    /// Inserts a key/value pair, returning the entry's handle.
    ///
    /// # Errors
    ///
    /// [`InsertError::Full`] if storage is exhausted,
    /// [`InsertError::Duplicate`] if the key is already present. Both hand
    /// the pair back; the tree is unchanged.
    pub fn insert(&mut self, key: K, value: V) -> Result<Idx, InsertError<K, V>> {
        let idx = match self.storage.try_insert(TreeEntry::new(key, value)) {
            Ok(idx) => idx,
            Err(Full(entry)) => return Err(InsertError::Full(entry.key, entry.value)),
        };
        if self.tree.insert(&mut self.storage, idx).is_err() {
            let entry = self.storage.remove(idx).expect("entry was just inserted");
            return Err(InsertError::Duplicate(entry.key, entry.value));
        }
        Ok(idx)
    }

    /// Removes the entry matching `key`, returning its value.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let idx = self.tree.remove_key(&mut self.storage, key).ok()?;
        let entry = self.storage.remove(idx).expect("removed entry was live");
        Some(entry.value)
    }

    /// Returns a reference to the value matching `key`.
    pub fn get(&self, key: &K) -> Option<&V> {
        let idx = self.tree.find(&self.storage, key)?;
        self.storage.get(idx).map(|entry| &entry.value)
    }

    /// Returns a mutable reference to the value matching `key`.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let idx = self.tree.find(&self.storage, key)?;
        self.storage.get_mut(idx).map(|entry| &mut entry.value)
    }

    /// Returns `true` if `key` is present.
    #[inline]
    pub fn contains(&self, key: &K) -> bool {
        self.tree.contains(&self.storage, key)
    }

    /// Returns an iterator over `(&key, &value)` pairs in ascending key
    /// order.
    pub fn iter(&self) -> TreeIter<'_, K, V, Idx> {
        TreeIter {
            inner: self.tree.iter(&self.storage),
        }
    }
}

/// Ascending iterator over an [`OwnedTree`].
pub struct TreeIter<'a, K: Ord, V, Idx: Key> {
    inner: tree::Iter<'a, TreeEntry<K, V, Idx>, Arena<TreeEntry<K, V, Idx>, Idx>, Idx>,
}

impl<'a, K: Ord, V, Idx: Key> Iterator for TreeIter<'a, K, V, Idx> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, entry)| (&entry.key, &entry.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<'a, K: Ord, V, Idx: Key> ExactSizeIterator for TreeIter<'a, K, V, Idx> {}

// =============================================================================
// OwnedStack
// =============================================================================

/// Stack node bundling a value, used by [`OwnedStack`].
pub struct StackItem<T, Idx: Key> {
    value: T,
    next: Idx,
}

impl<T, Idx: Key> Chained<Idx> for StackItem<T, Idx> {
    fn next(&self) -> Idx {
        self.next
    }
    fn set_next(&mut self, idx: Idx) {
        self.next = idx;
    }
}

/// A LIFO stack backed by [`Stack`] with built-in storage.
pub struct OwnedStack<T, Idx: Key = u32> {
    storage: Arena<StackItem<T, Idx>, Idx>,
    stack: Stack<Idx>,
}

impl<T, Idx: Key> OwnedStack<T, Idx> {
    /// Creates a stack with capacity for `capacity` values.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0 or does not fit the index type.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            storage: Arena::with_capacity(capacity),
            stack: Stack::new(),
        }
    }

    /// Returns the number of values on the stack.
    #[inline]
    pub fn len(&self) -> usize {
        self.stack.len()
    }

    /// Returns `true` if the stack is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Pushes a value, returning its handle.
    ///
    /// # Errors
    ///
    /// [`Full`] with the value if storage is exhausted.
    pub fn push(&mut self, value: T) -> Result<Idx, Full<T>> {
        let idx = self
            .storage
            .try_insert(StackItem {
                value,
                next: Idx::NONE,
            })
            .map_err(|Full(item)| Full(item.value))?;
        self.stack.push(&mut self.storage, idx);
        Ok(idx)
    }

    /// Pops the most recently pushed value.
    pub fn pop(&mut self) -> Option<T> {
        let idx = self.stack.pop(&mut self.storage)?;
        let item = self.storage.remove(idx).expect("popped item was live");
        Some(item.value)
    }

    /// Returns a reference to the top value.
    pub fn peek(&self) -> Option<&T> {
        self.storage.get(self.stack.top()).map(|item| &item.value)
    }

    /// Returns an iterator over values from top to bottom.
    pub fn iter(&self) -> StackIter<'_, T, Idx> {
        StackIter {
            inner: self.stack.iter(&self.storage),
        }
    }
}

/// Top-to-bottom iterator over an [`OwnedStack`].
pub struct StackIter<'a, T, Idx: Key> {
    inner: stack::Iter<'a, StackItem<T, Idx>, Arena<StackItem<T, Idx>, Idx>, Idx>,
}

impl<'a, T, Idx: Key> Iterator for StackIter<'a, T, Idx> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, item)| &item.value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<'a, T, Idx: Key> ExactSizeIterator for StackIter<'a, T, Idx> {}

// =============================================================================
// OwnedQueue
// =============================================================================

/// Queue node bundling a value, used by [`OwnedQueue`].
pub struct QueueItem<T, Idx: Key> {
    value: T,
    prev: Idx,
    next: Idx,
}

impl<T, Idx: Key> Linked<Idx> for QueueItem<T, Idx> {
    fn prev(&self) -> Idx {
        self.prev
    }
    fn next(&self) -> Idx {
        self.next
    }
    fn set_prev(&mut self, idx: Idx) {
        self.prev = idx;
    }
    fn set_next(&mut self, idx: Idx) {
        self.next = idx;
    }
}

/// A FIFO queue backed by [`Queue`] with built-in storage.
pub struct OwnedQueue<T, Idx: Key = u32> {
    storage: Arena<QueueItem<T, Idx>, Idx>,
    queue: Queue<Idx>,
}

impl<T, Idx: Key> OwnedQueue<T, Idx> {
    /// Creates a queue with capacity for `capacity` values.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0 or does not fit the index type.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            storage: Arena::with_capacity(capacity),
            queue: Queue::new(),
        }
    }

    /// Returns the number of values in the queue.
    #[inline]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Returns `true` if the queue is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Enqueues a value, returning its handle.
    ///
    /// # Errors
    ///
    /// [`Full`] with the value if storage is exhausted.
    pub fn enqueue(&mut self, value: T) -> Result<Idx, Full<T>> {
        let idx = self
            .storage
            .try_insert(QueueItem {
                value,
                prev: Idx::NONE,
                next: Idx::NONE,
            })
            .map_err(|Full(item)| Full(item.value))?;
        self.queue.enqueue(&mut self.storage, idx);
        Ok(idx)
    }

    /// Dequeues the oldest value.
    pub fn dequeue(&mut self) -> Option<T> {
        let idx = self.queue.dequeue(&mut self.storage)?;
        let item = self.storage.remove(idx).expect("dequeued item was live");
        Some(item.value)
    }

    /// Returns a reference to the oldest (next to dequeue) value.
    pub fn peek(&self) -> Option<&T> {
        self.storage.get(self.queue.oldest()).map(|item| &item.value)
    }

    /// Returns an iterator over values from newest to oldest.
    pub fn iter(&self) -> QueueIter<'_, T, Idx> {
        QueueIter {
            inner: self.queue.iter(&self.storage),
        }
    }
}

/// Newest-to-oldest iterator over an [`OwnedQueue`].
pub struct QueueIter<'a, T, Idx: Key> {
    inner: queue::Iter<'a, QueueItem<T, Idx>, Arena<QueueItem<T, Idx>, Idx>, Idx>,
}

impl<'a, T, Idx: Key> Iterator for QueueIter<'a, T, Idx> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, item)| &item.value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<'a, T, Idx: Key> ExactSizeIterator for QueueIter<'a, T, Idx> {}
