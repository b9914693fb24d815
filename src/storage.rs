//! Storage trait for slab-like containers with stable indices.
//!
//! Storage owns node memory; the containers in this crate only coordinate
//! handles into it. An index stays valid until the value is explicitly
//! removed, which is what allows link fields to be plain integers with no
//! ownership or use-after-free concerns.
//!
//! # Storage Invariant
//!
//! A container instance must always be used with the same storage instance.
//! Passing a different storage is a logic error with unspecified (but
//! memory-safe) results. This is the caller's responsibility to enforce,
//! same discipline as the `slab` crate.

use crate::Key;

/// Slab-like storage with stable indices.
///
/// # Requirements
///
/// Implementations must provide:
/// - **Stable indices**: an index remains valid until explicitly removed
/// - **O(1)** insert, remove, get operations
/// - **Slot reuse**: removed slots can be reused by future inserts
///
/// # Implementations
///
/// - [`Arena<T>`] - fixed capacity, free-list slab (in this crate)
/// - `slab::Slab<T>` - growable (feature `slab`)
pub trait Storage<T> {
    /// Index type for this storage.
    type Index: Key;

    /// Error type for failed insertions.
    ///
    /// - [`Full<T>`] for fixed-capacity storage
    /// - `Infallible` for growable storage
    type Error;

    /// Inserts a value, returning its stable index.
    fn try_insert(&mut self, value: T) -> Result<Self::Index, Self::Error>;

    /// Removes and returns the value at `index`, if present.
    fn remove(&mut self, index: Self::Index) -> Option<T>;

    /// Returns a reference to the value at `index`, if present.
    fn get(&self, index: Self::Index) -> Option<&T>;

    /// Returns a mutable reference to the value at `index`, if present.
    fn get_mut(&mut self, index: Self::Index) -> Option<&mut T>;

    /// Returns the number of occupied slots.
    fn len(&self) -> usize;

    /// Returns `true` if no slots are occupied.
    #[inline]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Error returned when fixed-capacity storage is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Full<T>(pub T);

impl<T> Full<T> {
    /// Returns the value that could not be inserted.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> core::fmt::Display for Full<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "storage is full")
    }
}

impl<T: core::fmt::Debug> std::error::Error for Full<T> {}

// =============================================================================
// Arena - fixed capacity, free-list slot reuse
// =============================================================================

enum Slot<T, Idx> {
    Occupied(T),
    /// Vacant slot; holds the index of the next free slot (or `NONE`).
    Vacant(Idx),
}

/// Fixed-capacity storage with runtime-determined size.
///
/// Slots are allocated up front in one `Vec` and recycled through an
/// intrusive free list, so inserting never reallocates and indices are
/// stable for the lifetime of the value.
///
/// # Example
///
/// ```
/// use arbor_collections::{Arena, Storage};
///
/// let mut arena: Arena<u64> = Arena::with_capacity(1000);
///
/// let idx = arena.try_insert(42).unwrap();
/// assert_eq!(arena.get(idx), Some(&42));
/// assert_eq!(arena.remove(idx), Some(42));
/// ```
pub struct Arena<T, Idx: Key = u32> {
    slots: Vec<Slot<T, Idx>>,
    free_head: Idx,
    len: usize,
    capacity: usize,
}

impl<T, Idx: Key> Arena<T, Idx> {
    /// Creates an arena with exactly `capacity` slots.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0 or does not fit the index type (the
    /// sentinel `Idx::NONE` must stay unused).
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be > 0");
        assert!(
            capacity < Idx::NONE.as_usize(),
            "capacity exceeds index type maximum"
        );

        Self {
            slots: Vec::with_capacity(capacity),
            free_head: Idx::NONE,
            len: 0,
            capacity,
        }
    }

    /// Returns the capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns `true` if all slots are occupied.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.len == self.capacity
    }
}

impl<T, Idx: Key> Storage<T> for Arena<T, Idx> {
    type Index = Idx;
    type Error = Full<T>;

    #[inline]
    fn try_insert(&mut self, value: T) -> Result<Self::Index, Self::Error> {
        if self.free_head.is_some() {
            let idx = self.free_head;
            let slot = &mut self.slots[idx.as_usize()];
            match *slot {
                Slot::Vacant(next) => self.free_head = next,
                Slot::Occupied(_) => unreachable!("free list points at occupied slot"),
            }
            *slot = Slot::Occupied(value);
            self.len += 1;
            return Ok(idx);
        }

        if self.slots.len() == self.capacity {
            return Err(Full(value));
        }

        let idx = Idx::from_usize(self.slots.len());
        self.slots.push(Slot::Occupied(value));
        self.len += 1;
        Ok(idx)
    }

    #[inline]
    fn remove(&mut self, index: Self::Index) -> Option<T> {
        let i = index.as_usize();
        match self.slots.get(i) {
            Some(Slot::Occupied(_)) => {}
            _ => return None,
        }

        let slot = core::mem::replace(&mut self.slots[i], Slot::Vacant(self.free_head));
        self.free_head = index;
        self.len -= 1;
        match slot {
            Slot::Occupied(value) => Some(value),
            Slot::Vacant(_) => unreachable!(),
        }
    }

    #[inline]
    fn get(&self, index: Self::Index) -> Option<&T> {
        match self.slots.get(index.as_usize()) {
            Some(Slot::Occupied(value)) => Some(value),
            _ => None,
        }
    }

    #[inline]
    fn get_mut(&mut self, index: Self::Index) -> Option<&mut T> {
        match self.slots.get_mut(index.as_usize()) {
            Some(Slot::Occupied(value)) => Some(value),
            _ => None,
        }
    }

    #[inline]
    fn len(&self) -> usize {
        self.len
    }
}

// =============================================================================
// slab::Slab implementation
// =============================================================================

#[cfg(feature = "slab")]
impl<T> Storage<T> for slab::Slab<T> {
    type Index = usize;
    type Error = core::convert::Infallible;

    #[inline]
    fn try_insert(&mut self, value: T) -> Result<Self::Index, Self::Error> {
        Ok(self.insert(value))
    }

    #[inline]
    fn remove(&mut self, index: Self::Index) -> Option<T> {
        self.try_remove(index)
    }

    #[inline]
    fn get(&self, index: Self::Index) -> Option<&T> {
        self.get(index)
    }

    #[inline]
    fn get_mut(&mut self, index: Self::Index) -> Option<&mut T> {
        self.get_mut(index)
    }

    #[inline]
    fn len(&self) -> usize {
        self.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_is_empty() {
        let arena: Arena<u64> = Arena::with_capacity(16);
        assert!(arena.is_empty());
        assert!(!arena.is_full());
        assert_eq!(arena.len(), 0);
        assert_eq!(arena.capacity(), 16);
    }

    #[test]
    fn insert_get_remove() {
        let mut arena: Arena<u64> = Arena::with_capacity(16);

        let idx = arena.try_insert(42).unwrap();
        assert_eq!(arena.len(), 1);
        assert_eq!(arena.get(idx), Some(&42));

        assert_eq!(arena.remove(idx), Some(42));
        assert_eq!(arena.get(idx), None);
        assert_eq!(arena.len(), 0);
    }

    #[test]
    fn get_mut() {
        let mut arena: Arena<u64> = Arena::with_capacity(16);

        let idx = arena.try_insert(10).unwrap();
        *arena.get_mut(idx).unwrap() = 20;

        assert_eq!(arena.get(idx), Some(&20));
    }

    #[test]
    fn fill_to_capacity() {
        let mut arena: Arena<u64> = Arena::with_capacity(4);

        let keys: Vec<u32> = (0..4).map(|i| arena.try_insert(i).unwrap()).collect();
        assert!(arena.is_full());

        let err = arena.try_insert(4);
        assert_eq!(err.unwrap_err().into_inner(), 4);

        for (i, key) in keys.iter().enumerate() {
            assert_eq!(arena.get(*key), Some(&(i as u64)));
        }
    }

    #[test]
    fn slot_reuse() {
        let mut arena: Arena<u64> = Arena::with_capacity(4);

        let k0 = arena.try_insert(0).unwrap();
        let _k1 = arena.try_insert(1).unwrap();

        arena.remove(k0);

        // Next insert reuses k0's slot (LIFO free list)
        let k2 = arena.try_insert(2).unwrap();
        assert_eq!(k2, k0);
    }

    #[test]
    fn double_remove_returns_none() {
        let mut arena: Arena<u64> = Arena::with_capacity(16);

        let idx = arena.try_insert(42).unwrap();
        assert_eq!(arena.remove(idx), Some(42));
        assert_eq!(arena.remove(idx), None);
    }

    #[test]
    fn out_of_range_index() {
        let arena: Arena<u64> = Arena::with_capacity(16);
        assert_eq!(arena.get(100), None);
        assert_eq!(arena.get(u32::MAX), None);
    }

    #[test]
    fn u16_index() {
        let mut arena: Arena<u64, u16> = Arena::with_capacity(100);

        let idx = arena.try_insert(42).unwrap();
        assert_eq!(arena.get(idx), Some(&42));
    }

    #[cfg(feature = "slab")]
    mod slab_tests {
        use super::*;

        #[test]
        fn insert_get_remove() {
            let mut storage = slab::Slab::new();

            let idx = Storage::try_insert(&mut storage, 42u64).unwrap();
            assert_eq!(Storage::get(&storage, idx), Some(&42));
            assert_eq!(Storage::remove(&mut storage, idx), Some(42));
            assert_eq!(Storage::get(&storage, idx), None);
        }
    }
}
