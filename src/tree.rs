//! Intrusive red-black tree over external storage.
//!
//! The tree keeps caller-owned nodes in sorted key order with the classic
//! red-black balance guarantees: insert, removal, and lookup are O(log n)
//! worst case, and no operation allocates. Nodes live in user-provided
//! storage and embed their own link and color fields via the [`TreeLinked`]
//! trait; the tree itself stores only the root handle and a length.
//!
//! `Idx::NONE` plays the role of the shared nil leaf: it is treated as a
//! black node everywhere and is never dereferenced, so rotation and fixup
//! code needs no null special-casing beyond the sentinel test.
//!
//! # Membership and the unlinked state
//!
//! A node enters the tree through [`RbTree::insert`] and leaves through
//! [`RbTree::remove`], [`RbTree::remove_key`], or [`RbTree::replace`]. On
//! removal all three link fields are reset to `Idx::NONE`, so "is this node
//! currently a member" is observable from the node itself. Operating on a
//! node that is not a member reports [`TreeError::NotFound`] and leaves the
//! tree untouched.
//!
//! # Example
//!
//! ```
//! use arbor_collections::{Arena, Color, Key, RbTree, Storage, TreeLinked};
//!
//! #[derive(Debug)]
//! struct Order {
//!     price: i64,
//!     color: Color,
//!     parent: u32,
//!     left: u32,
//!     right: u32,
//! }
//!
//! impl Order {
//!     fn new(price: i64) -> Self {
//!         Self {
//!             price,
//!             color: Color::Red,
//!             parent: u32::NONE,
//!             left: u32::NONE,
//!             right: u32::NONE,
//!         }
//!     }
//! }
//!
//! impl TreeLinked<u32> for Order {
//!     type Key = i64;
//!     fn key(&self) -> &i64 { &self.price }
//!     fn left(&self) -> u32 { self.left }
//!     fn right(&self) -> u32 { self.right }
//!     fn parent(&self) -> u32 { self.parent }
//!     fn color(&self) -> Color { self.color }
//!     fn set_left(&mut self, idx: u32) { self.left = idx; }
//!     fn set_right(&mut self, idx: u32) { self.right = idx; }
//!     fn set_parent(&mut self, idx: u32) { self.parent = idx; }
//!     fn set_color(&mut self, color: Color) { self.color = color; }
//! }
//!
//! let mut storage: Arena<Order> = Arena::with_capacity(16);
//! let mut tree: RbTree<u32> = RbTree::new();
//!
//! let a = storage.try_insert(Order::new(100)).unwrap();
//! let b = storage.try_insert(Order::new(99)).unwrap();
//!
//! tree.insert(&mut storage, a).unwrap();
//! tree.insert(&mut storage, b).unwrap();
//!
//! assert_eq!(tree.len(), 2);
//! assert_eq!(tree.find(&storage, &99), Some(b));
//!
//! tree.remove(&mut storage, a).unwrap();
//! assert_eq!(tree.find(&storage, &100), None);
//! ```

use core::cmp::Ordering;
use core::marker::PhantomData;

use crate::{Key, Storage};

/// Node color.
///
/// Only two colors are ever stored; the transient "double black" state of
/// deletion lives in the fixup pass's locals and is never written to a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    /// Red node. Freshly inserted nodes start red.
    Red,
    /// Black node. The root and the nil sentinel are always black.
    Black,
}

impl Default for Color {
    fn default() -> Self {
        Color::Red
    }
}

/// Rotation / fixup direction.
///
/// The rebalance cases are mirror-symmetric; implementing them once over a
/// direction parameter keeps the left and right variants identical under
/// reflection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

impl Side {
    #[inline]
    fn flip(self) -> Self {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

/// Trait for types that can participate in a red-black tree.
///
/// Implementors embed a sort key, three link handles, and a color directly
/// in their struct. The tree never copies the key; comparisons go through
/// `key()` borrows.
///
/// Fresh nodes must have all links set to `Idx::NONE`; the color of an
/// unlinked node is not interpreted.
pub trait TreeLinked<Idx: Key> {
    /// Sort key type.
    type Key: Ord;

    /// Returns the node's sort key.
    fn key(&self) -> &Self::Key;

    /// Returns the left child handle, or `Idx::NONE`.
    fn left(&self) -> Idx;

    /// Returns the right child handle, or `Idx::NONE`.
    fn right(&self) -> Idx;

    /// Returns the parent handle, or `Idx::NONE` for the root.
    fn parent(&self) -> Idx;

    /// Returns the node's color.
    fn color(&self) -> Color;

    /// Sets the left child handle.
    fn set_left(&mut self, idx: Idx);

    /// Sets the right child handle.
    fn set_right(&mut self, idx: Idx);

    /// Sets the parent handle.
    fn set_parent(&mut self, idx: Idx);

    /// Sets the node's color.
    fn set_color(&mut self, color: Color);
}

/// Error returned by fallible tree operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeError {
    /// An equal key is already present; the tree and the node are unchanged.
    Duplicate,
    /// The key or node is not a member of the tree; the tree is unchanged.
    NotFound,
}

impl core::fmt::Display for TreeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            TreeError::Duplicate => write!(f, "an equal key is already in the tree"),
            TreeError::NotFound => write!(f, "key or node not in the tree"),
        }
    }
}

impl std::error::Error for TreeError {}

/// A red-black tree over external storage.
///
/// The tree tracks the root handle and the element count. Nodes live in
/// user-provided storage and embed their own links via [`TreeLinked`].
///
/// # Invariants
///
/// 1. The root is black.
/// 2. Every nil leaf (`Idx::NONE`) is black.
/// 3. A red node never has a red child.
/// 4. Every path from a node to a descendant nil leaf crosses the same
///    number of black nodes.
/// 5. In-order traversal yields strictly ascending keys; equal-key insertion
///    is rejected, never overwritten.
///
/// [`RbTree::check_invariants`] asserts all five; it is meant for tests and
/// debugging, not for hot paths.
#[derive(Debug, Clone)]
pub struct RbTree<Idx: Key> {
    root: Idx,
    len: usize,
}

impl<Idx: Key> Default for RbTree<Idx> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Idx: Key> RbTree<Idx> {
    /// Creates an empty tree.
    #[inline]
    pub const fn new() -> Self {
        Self {
            root: Idx::NONE,
            len: 0,
        }
    }

    /// Returns the root handle, or `Idx::NONE` if empty.
    #[inline]
    pub const fn root(&self) -> Idx {
        self.root
    }

    /// Returns the number of nodes in the tree.
    #[inline]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the tree is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    // -------------------------------------------------------------------------
    // Internal link plumbing
    // -------------------------------------------------------------------------

    #[inline]
    fn node<'a, T, S>(&self, storage: &'a S, idx: Idx) -> &'a T
    where
        T: TreeLinked<Idx>,
        S: Storage<T, Index = Idx>,
    {
        storage.get(idx).expect("dangling tree handle")
    }

    #[inline]
    fn node_mut<'a, T, S>(&self, storage: &'a mut S, idx: Idx) -> &'a mut T
    where
        T: TreeLinked<Idx>,
        S: Storage<T, Index = Idx>,
    {
        storage.get_mut(idx).expect("dangling tree handle")
    }

    #[inline]
    fn child<T, S>(&self, storage: &S, idx: Idx, side: Side) -> Idx
    where
        T: TreeLinked<Idx>,
        S: Storage<T, Index = Idx>,
    {
        let node = self.node(storage, idx);
        match side {
            Side::Left => node.left(),
            Side::Right => node.right(),
        }
    }

    #[inline]
    fn set_child<T, S>(&self, storage: &mut S, idx: Idx, side: Side, to: Idx)
    where
        T: TreeLinked<Idx>,
        S: Storage<T, Index = Idx>,
    {
        let node = self.node_mut(storage, idx);
        match side {
            Side::Left => node.set_left(to),
            Side::Right => node.set_right(to),
        }
    }

    /// Nil counts as black.
    #[inline]
    fn is_red<T, S>(&self, storage: &S, idx: Idx) -> bool
    where
        T: TreeLinked<Idx>,
        S: Storage<T, Index = Idx>,
    {
        idx.is_some() && self.node(storage, idx).color() == Color::Red
    }

    /// Which side of `parent` the child `idx` hangs on.
    #[inline]
    fn side_of<T, S>(&self, storage: &S, parent: Idx, idx: Idx) -> Side
    where
        T: TreeLinked<Idx>,
        S: Storage<T, Index = Idx>,
    {
        if self.node(storage, parent).left() == idx {
            Side::Left
        } else {
            Side::Right
        }
    }

    #[inline]
    fn min_from<T, S>(&self, storage: &S, mut idx: Idx) -> Idx
    where
        T: TreeLinked<Idx>,
        S: Storage<T, Index = Idx>,
    {
        loop {
            let left = self.node(storage, idx).left();
            if left.is_none() {
                return idx;
            }
            idx = left;
        }
    }

    /// A member node has at least one live link, or is the root.
    #[inline]
    fn is_member<T, S>(&self, storage: &S, idx: Idx) -> bool
    where
        T: TreeLinked<Idx>,
        S: Storage<T, Index = Idx>,
    {
        if self.root == idx {
            return true;
        }
        let node = self.node(storage, idx);
        node.parent().is_some() || node.left().is_some() || node.right().is_some()
    }

    #[inline]
    fn clear_links<T, S>(&self, storage: &mut S, idx: Idx)
    where
        T: TreeLinked<Idx>,
        S: Storage<T, Index = Idx>,
    {
        let node = self.node_mut(storage, idx);
        node.set_parent(Idx::NONE);
        node.set_left(Idx::NONE);
        node.set_right(Idx::NONE);
    }

    /// Rotates `x` down toward `side`; the child on the opposite side rises
    /// into `x`'s position. `rotate(x, Left)` is the textbook left rotation.
    ///
    /// Preserves in-order traversal order and may change the root.
    fn rotate<T, S>(&mut self, storage: &mut S, x: Idx, side: Side)
    where
        T: TreeLinked<Idx>,
        S: Storage<T, Index = Idx>,
    {
        let y = self.child(storage, x, side.flip());
        debug_assert!(y.is_some(), "rotation requires a child to rise");

        // Move y's inner subtree across to x
        let across = self.child(storage, y, side);
        self.set_child(storage, x, side.flip(), across);
        if across.is_some() {
            self.node_mut(storage, across).set_parent(x);
        }

        // Re-point x's parent at y
        let parent = self.node(storage, x).parent();
        self.node_mut(storage, y).set_parent(parent);
        if parent.is_none() {
            self.root = y;
        } else {
            let pside = self.side_of(storage, parent, x);
            self.set_child(storage, parent, pside, y);
        }

        self.set_child(storage, y, side, x);
        self.node_mut(storage, x).set_parent(y);
    }

    /// Replaces the subtree rooted at `u` with the subtree rooted at `v`
    /// (`v` may be `Idx::NONE`). Only parent links are touched.
    fn transplant<T, S>(&mut self, storage: &mut S, u: Idx, v: Idx)
    where
        T: TreeLinked<Idx>,
        S: Storage<T, Index = Idx>,
    {
        let parent = self.node(storage, u).parent();
        if parent.is_none() {
            self.root = v;
        } else {
            let side = self.side_of(storage, parent, u);
            self.set_child(storage, parent, side, v);
        }
        if v.is_some() {
            self.node_mut(storage, v).set_parent(parent);
        }
    }

    // -------------------------------------------------------------------------
    // Insert
    // -------------------------------------------------------------------------

    /// Inserts a node into the tree.
    ///
    /// The node's key must already be set and its links must be `Idx::NONE`
    /// (freshly created or previously removed).
    ///
    /// # Errors
    ///
    /// - [`TreeError::Duplicate`] if an equal key is already present. The
    ///   tree is unchanged and the node stays unlinked.
    /// - [`TreeError::NotFound`] if `idx` is not a live handle in storage.
    pub fn insert<T, S>(&mut self, storage: &mut S, idx: Idx) -> Result<(), TreeError>
    where
        T: TreeLinked<Idx>,
        S: Storage<T, Index = Idx>,
    {
        {
            let node = storage.get(idx).ok_or(TreeError::NotFound)?;
            debug_assert!(
                node.parent().is_none()
                    && node.left().is_none()
                    && node.right().is_none()
                    && self.root != idx,
                "node is already linked"
            );
        }

        // Walk down to the insertion point
        let mut cur = self.root;
        let mut parent = Idx::NONE;
        let mut side = Side::Left;
        while cur.is_some() {
            let ord = self
                .node(storage, idx)
                .key()
                .cmp(self.node(storage, cur).key());
            match ord {
                Ordering::Equal => return Err(TreeError::Duplicate),
                Ordering::Less => {
                    parent = cur;
                    side = Side::Left;
                    cur = self.node(storage, cur).left();
                }
                Ordering::Greater => {
                    parent = cur;
                    side = Side::Right;
                    cur = self.node(storage, cur).right();
                }
            }
        }

        {
            let node = self.node_mut(storage, idx);
            node.set_parent(parent);
            node.set_left(Idx::NONE);
            node.set_right(Idx::NONE);
            node.set_color(Color::Red);
        }

        if parent.is_none() {
            self.root = idx;
            self.node_mut(storage, idx).set_color(Color::Black);
        } else {
            self.set_child(storage, parent, side, idx);
            self.insert_fixup(storage, idx);
        }

        self.len += 1;
        Ok(())
    }

    /// Restores the red-black invariants after linking `x` as a red leaf.
    ///
    /// Cases are classified by the uncle's color and whether `x` is an inner
    /// or outer grandchild; at most two rotations are performed.
    fn insert_fixup<T, S>(&mut self, storage: &mut S, mut x: Idx)
    where
        T: TreeLinked<Idx>,
        S: Storage<T, Index = Idx>,
    {
        while x != self.root && self.is_red(storage, self.node(storage, x).parent()) {
            // Parent is red, so it cannot be the root and the grandparent exists.
            let parent = self.node(storage, x).parent();
            let grand = self.node(storage, parent).parent();
            let side = self.side_of(storage, grand, parent);
            let uncle = self.child(storage, grand, side.flip());

            if self.is_red(storage, uncle) {
                // Red uncle: recolor and continue from the grandparent
                self.node_mut(storage, parent).set_color(Color::Black);
                self.node_mut(storage, uncle).set_color(Color::Black);
                self.node_mut(storage, grand).set_color(Color::Red);
                x = grand;
            } else {
                if x == self.child(storage, parent, side.flip()) {
                    // Inner grandchild: rotate it outward first
                    x = parent;
                    self.rotate(storage, x, side);
                }
                let parent = self.node(storage, x).parent();
                let grand = self.node(storage, parent).parent();
                self.node_mut(storage, parent).set_color(Color::Black);
                self.node_mut(storage, grand).set_color(Color::Red);
                self.rotate(storage, grand, side.flip());
            }
        }

        let root = self.root;
        self.node_mut(storage, root).set_color(Color::Black);
    }

    // -------------------------------------------------------------------------
    // Lookup
    // -------------------------------------------------------------------------

    /// Binary search for an equal key. Never mutates the tree.
    pub fn find<T, S>(&self, storage: &S, key: &T::Key) -> Option<Idx>
    where
        T: TreeLinked<Idx>,
        S: Storage<T, Index = Idx>,
    {
        let mut cur = self.root;
        while cur.is_some() {
            let node = self.node(storage, cur);
            match key.cmp(node.key()) {
                Ordering::Equal => return Some(cur),
                Ordering::Less => cur = node.left(),
                Ordering::Greater => cur = node.right(),
            }
        }
        None
    }

    /// Returns `true` if an equal key is present.
    #[inline]
    pub fn contains<T, S>(&self, storage: &S, key: &T::Key) -> bool
    where
        T: TreeLinked<Idx>,
        S: Storage<T, Index = Idx>,
    {
        self.find(storage, key).is_some()
    }

    /// Returns the handle of the smallest key, or `None` if empty.
    pub fn first<T, S>(&self, storage: &S) -> Option<Idx>
    where
        T: TreeLinked<Idx>,
        S: Storage<T, Index = Idx>,
    {
        if self.root.is_none() {
            None
        } else {
            Some(self.min_from(storage, self.root))
        }
    }

    // -------------------------------------------------------------------------
    // Remove
    // -------------------------------------------------------------------------

    /// Removes a specific node from the tree.
    ///
    /// On success the node's link fields are reset to `Idx::NONE`; the node
    /// itself stays in storage under the caller's control.
    ///
    /// # Errors
    ///
    /// [`TreeError::NotFound`] if the node is not currently a member (all
    /// links unlinked, or a dead storage handle). The tree is unchanged.
    pub fn remove<T, S>(&mut self, storage: &mut S, idx: Idx) -> Result<(), TreeError>
    where
        T: TreeLinked<Idx>,
        S: Storage<T, Index = Idx>,
    {
        storage.get(idx).ok_or(TreeError::NotFound)?;
        if !self.is_member(storage, idx) {
            return Err(TreeError::NotFound);
        }
        self.unlink(storage, idx);
        Ok(())
    }

    /// Removes the node matching `key` and returns its handle.
    ///
    /// # Errors
    ///
    /// [`TreeError::NotFound`] if no equal key is present (including the
    /// empty tree). The tree is unchanged, so absent-key removal is
    /// idempotent.
    pub fn remove_key<T, S>(&mut self, storage: &mut S, key: &T::Key) -> Result<Idx, TreeError>
    where
        T: TreeLinked<Idx>,
        S: Storage<T, Index = Idx>,
    {
        let idx = self.find(storage, key).ok_or(TreeError::NotFound)?;
        self.unlink(storage, idx);
        Ok(idx)
    }

    /// Physically unlinks a member node, rebalancing if a black node left
    /// the tree.
    fn unlink<T, S>(&mut self, storage: &mut S, z: Idx)
    where
        T: TreeLinked<Idx>,
        S: Storage<T, Index = Idx>,
    {
        let (z_left, z_right, z_color) = {
            let node = self.node(storage, z);
            (node.left(), node.right(), node.color())
        };

        // y is the node physically removed from its old position; x the
        // subtree (possibly nil) that takes that place; xp its new parent.
        let removed_color;
        let x;
        let xp;

        if z_left.is_none() {
            removed_color = z_color;
            x = z_right;
            xp = self.node(storage, z).parent();
            self.transplant(storage, z, z_right);
        } else if z_right.is_none() {
            removed_color = z_color;
            x = z_left;
            xp = self.node(storage, z).parent();
            self.transplant(storage, z, z_left);
        } else {
            // Two children: splice in the in-order successor
            let y = self.min_from(storage, z_right);
            removed_color = self.node(storage, y).color();
            x = self.node(storage, y).right();
            if self.node(storage, y).parent() == z {
                xp = y;
            } else {
                xp = self.node(storage, y).parent();
                self.transplant(storage, y, x);
                let zr = self.node(storage, z).right();
                self.node_mut(storage, y).set_right(zr);
                self.node_mut(storage, zr).set_parent(y);
            }
            self.transplant(storage, z, y);
            self.node_mut(storage, y).set_left(z_left);
            self.node_mut(storage, z_left).set_parent(y);
            self.node_mut(storage, y).set_color(z_color);
        }

        if removed_color == Color::Black {
            self.remove_fixup(storage, x, xp);
        }

        self.len -= 1;
        self.clear_links(storage, z);
    }

    /// Restores the black-height invariant after a black node was removed.
    ///
    /// `x` carries the deficit ("double black") and may be nil, which is why
    /// its parent is tracked explicitly. Cases are classified by the sibling's
    /// color and the colors of the sibling's children, mirrored through
    /// [`Side`]; the loop terminates at the root or when a red node absorbs
    /// the deficit.
    fn remove_fixup<T, S>(&mut self, storage: &mut S, mut x: Idx, mut xp: Idx)
    where
        T: TreeLinked<Idx>,
        S: Storage<T, Index = Idx>,
    {
        while x != self.root && !self.is_red(storage, x) {
            let side = if self.child(storage, xp, Side::Left) == x {
                Side::Left
            } else {
                Side::Right
            };
            // The sibling is non-nil: the removed node was black, so this
            // subtree had black-height of at least one.
            let mut w = self.child(storage, xp, side.flip());

            if self.is_red(storage, w) {
                // Red sibling: rotate it up to get a black sibling
                self.node_mut(storage, w).set_color(Color::Black);
                self.node_mut(storage, xp).set_color(Color::Red);
                self.rotate(storage, xp, side);
                w = self.child(storage, xp, side.flip());
            }

            let w_near = self.child(storage, w, side);
            let w_far = self.child(storage, w, side.flip());
            if !self.is_red(storage, w_near) && !self.is_red(storage, w_far) {
                // Both of the sibling's children black: push the deficit up
                self.node_mut(storage, w).set_color(Color::Red);
                x = xp;
                xp = self.node(storage, x).parent();
            } else {
                if !self.is_red(storage, w_far) {
                    // Near child red, far child black: rotate the sibling
                    self.node_mut(storage, w_near).set_color(Color::Black);
                    self.node_mut(storage, w).set_color(Color::Red);
                    self.rotate(storage, w, side.flip());
                    w = self.child(storage, xp, side.flip());
                }
                // Far child red: one rotation absorbs the deficit
                let xp_color = self.node(storage, xp).color();
                self.node_mut(storage, w).set_color(xp_color);
                self.node_mut(storage, xp).set_color(Color::Black);
                let w_far = self.child(storage, w, side.flip());
                self.node_mut(storage, w_far).set_color(Color::Black);
                self.rotate(storage, xp, side);
                x = self.root;
            }
        }

        if x.is_some() {
            self.node_mut(storage, x).set_color(Color::Black);
        }
    }

    // -------------------------------------------------------------------------
    // Replace
    // -------------------------------------------------------------------------

    /// Substitutes `new` for `old` at the identical tree position.
    ///
    /// Color and link topology are copied over and `old`'s links are cleared,
    /// so the tree shape is untouched and no rebalancing happens. Only a
    /// key-preserving swap is allowed: `new`'s key must compare equal to
    /// `old`'s.
    ///
    /// # Errors
    ///
    /// - [`TreeError::NotFound`] if `old` is not currently a member.
    /// - [`TreeError::Duplicate`] if `new`'s key differs from `old`'s (a
    ///   replacement that changed the key could collide with another member
    ///   or break the ordering).
    pub fn replace<T, S>(&mut self, storage: &mut S, old: Idx, new: Idx) -> Result<(), TreeError>
    where
        T: TreeLinked<Idx>,
        S: Storage<T, Index = Idx>,
    {
        if old == new {
            return Ok(());
        }

        storage.get(old).ok_or(TreeError::NotFound)?;
        if !self.is_member(storage, old) {
            return Err(TreeError::NotFound);
        }
        {
            let node = storage.get(new).ok_or(TreeError::NotFound)?;
            debug_assert!(
                node.parent().is_none() && node.left().is_none() && node.right().is_none(),
                "replacement node is already linked"
            );
        }
        if self.node(storage, new).key() != self.node(storage, old).key() {
            return Err(TreeError::Duplicate);
        }

        let (parent, left, right, color) = {
            let node = self.node(storage, old);
            (node.parent(), node.left(), node.right(), node.color())
        };
        {
            let node = self.node_mut(storage, new);
            node.set_parent(parent);
            node.set_left(left);
            node.set_right(right);
            node.set_color(color);
        }

        if parent.is_none() {
            self.root = new;
        } else {
            let side = self.side_of(storage, parent, old);
            self.set_child(storage, parent, side, new);
        }
        if left.is_some() {
            self.node_mut(storage, left).set_parent(new);
        }
        if right.is_some() {
            self.node_mut(storage, right).set_parent(new);
        }

        self.clear_links(storage, old);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Iteration
    // -------------------------------------------------------------------------

    /// Returns an in-order iterator over `(handle, &node)` pairs.
    ///
    /// Walks the tree through parent pointers; no allocation.
    pub fn iter<'a, T, S>(&self, storage: &'a S) -> Iter<'a, T, S, Idx>
    where
        T: TreeLinked<Idx>,
        S: Storage<T, Index = Idx>,
    {
        let cur = if self.root.is_none() {
            Idx::NONE
        } else {
            self.min_from(storage, self.root)
        };
        Iter {
            storage,
            cur,
            remaining: self.len,
            _marker: PhantomData,
        }
    }

    // -------------------------------------------------------------------------
    // Consistency checking
    // -------------------------------------------------------------------------

    /// Asserts all red-black invariants plus parent-link and count
    /// consistency. Test and debugging facility; a failure here is a bug in
    /// the tree, not recoverable caller state.
    ///
    /// # Panics
    ///
    /// Panics if any invariant is violated.
    pub fn check_invariants<T, S>(&self, storage: &S)
    where
        T: TreeLinked<Idx>,
        S: Storage<T, Index = Idx>,
    {
        if self.root.is_some() {
            let root = self.node(storage, self.root);
            assert!(root.color() == Color::Black, "root must be black");
            assert!(root.parent().is_none(), "root must not have a parent");
        }
        let mut count = 0;
        self.check_subtree(storage, self.root, &mut count);
        assert_eq!(count, self.len, "len out of sync with traversal");
    }

    /// Returns the black-height of the subtree (nil counts as one).
    fn check_subtree<T, S>(&self, storage: &S, idx: Idx, count: &mut usize) -> usize
    where
        T: TreeLinked<Idx>,
        S: Storage<T, Index = Idx>,
    {
        if idx.is_none() {
            return 1;
        }
        *count += 1;

        let node = self.node(storage, idx);
        let left = node.left();
        let right = node.right();

        if left.is_some() {
            let child = self.node(storage, left);
            assert!(child.parent() == idx, "left child parent link broken");
            assert!(child.key() < node.key(), "left child must be smaller");
        }
        if right.is_some() {
            let child = self.node(storage, right);
            assert!(child.parent() == idx, "right child parent link broken");
            assert!(child.key() > node.key(), "right child must be bigger");
        }
        if node.color() == Color::Red {
            assert!(
                !self.is_red(storage, left) && !self.is_red(storage, right),
                "red node with red child"
            );
        }

        let lh = self.check_subtree(storage, left, count);
        let rh = self.check_subtree(storage, right, count);
        assert_eq!(lh, rh, "black-height mismatch");

        lh + (node.color() == Color::Black) as usize
    }
}

/// In-order iterator over a tree.
///
/// Created by [`RbTree::iter`]. Yields `(handle, &node)` in strictly
/// ascending key order.
pub struct Iter<'a, T, S, Idx: Key> {
    storage: &'a S,
    cur: Idx,
    remaining: usize,
    _marker: PhantomData<T>,
}

impl<'a, T, S, Idx> Iterator for Iter<'a, T, S, Idx>
where
    T: TreeLinked<Idx> + 'a,
    S: Storage<T, Index = Idx>,
    Idx: Key,
{
    type Item = (Idx, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        if self.cur.is_none() {
            return None;
        }
        let idx = self.cur;
        let node = self.storage.get(idx).expect("dangling tree handle");

        // In-order successor: leftmost of the right subtree, else the first
        // ancestor we are a left child of.
        let mut next = node.right();
        if next.is_some() {
            loop {
                let left = self.storage.get(next).expect("dangling tree handle").left();
                if left.is_none() {
                    break;
                }
                next = left;
            }
        } else {
            let mut cur = idx;
            loop {
                let parent = self.storage.get(cur).expect("dangling tree handle").parent();
                if parent.is_none() {
                    next = Idx::NONE;
                    break;
                }
                if self.storage.get(parent).expect("dangling tree handle").left() == cur {
                    next = parent;
                    break;
                }
                cur = parent;
            }
        }

        self.cur = next;
        self.remaining -= 1;
        Some((idx, node))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'a, T, S, Idx> ExactSizeIterator for Iter<'a, T, S, Idx>
where
    T: TreeLinked<Idx> + 'a,
    S: Storage<T, Index = Idx>,
    Idx: Key,
{
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Arena;

    #[derive(Debug)]
    struct Node {
        key: i64,
        color: Color,
        parent: u32,
        left: u32,
        right: u32,
    }

    impl Node {
        fn new(key: i64) -> Self {
            Self {
                key,
                color: Color::Red,
                parent: u32::NONE,
                left: u32::NONE,
                right: u32::NONE,
            }
        }

        fn is_unlinked(&self) -> bool {
            self.parent.is_none() && self.left.is_none() && self.right.is_none()
        }
    }

    impl TreeLinked<u32> for Node {
        type Key = i64;

        fn key(&self) -> &i64 {
            &self.key
        }
        fn left(&self) -> u32 {
            self.left
        }
        fn right(&self) -> u32 {
            self.right
        }
        fn parent(&self) -> u32 {
            self.parent
        }
        fn color(&self) -> Color {
            self.color
        }
        fn set_left(&mut self, idx: u32) {
            self.left = idx;
        }
        fn set_right(&mut self, idx: u32) {
            self.right = idx;
        }
        fn set_parent(&mut self, idx: u32) {
            self.parent = idx;
        }
        fn set_color(&mut self, color: Color) {
            self.color = color;
        }
    }

    fn setup(capacity: usize) -> (Arena<Node>, RbTree<u32>) {
        (Arena::with_capacity(capacity), RbTree::new())
    }

    fn add(storage: &mut Arena<Node>, tree: &mut RbTree<u32>, key: i64) -> u32 {
        let idx = storage.try_insert(Node::new(key)).unwrap();
        tree.insert(storage, idx).unwrap();
        tree.check_invariants(storage);
        idx
    }

    fn keys(storage: &Arena<Node>, tree: &RbTree<u32>) -> Vec<i64> {
        tree.iter(storage).map(|(_, node)| node.key).collect()
    }

    #[test]
    fn new_tree_is_empty() {
        let (storage, tree) = setup(16);
        assert!(tree.is_empty());
        assert_eq!(tree.len(), 0);
        assert!(tree.root().is_none());
        assert_eq!(tree.iter(&storage).count(), 0);
    }

    #[test]
    fn first_insert_becomes_black_root() {
        let (mut storage, mut tree) = setup(16);

        let idx = add(&mut storage, &mut tree, 5);

        assert_eq!(tree.root(), idx);
        assert_eq!(storage.get(idx).unwrap().color, Color::Black);
        assert!(storage.get(idx).unwrap().parent.is_none());
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn second_insert_is_red_child() {
        let (mut storage, mut tree) = setup(16);

        let root = add(&mut storage, &mut tree, 0);
        let right = add(&mut storage, &mut tree, 1);

        assert_eq!(storage.get(right).unwrap().color, Color::Red);
        assert_eq!(storage.get(root).unwrap().right, right);

        let left = add(&mut storage, &mut tree, -1);
        assert_eq!(storage.get(left).unwrap().color, Color::Red);
        assert_eq!(storage.get(root).unwrap().left, left);
    }

    #[test]
    fn duplicate_insert_rejected() {
        let (mut storage, mut tree) = setup(16);

        add(&mut storage, &mut tree, 5);

        let dup = storage.try_insert(Node::new(5)).unwrap();
        assert_eq!(tree.insert(&mut storage, dup), Err(TreeError::Duplicate));
        assert_eq!(tree.len(), 1);
        // The rejected node stays untouched and unlinked
        assert!(storage.get(dup).unwrap().is_unlinked());
        tree.check_invariants(&storage);
    }

    #[test]
    fn insert_ascending_stays_balanced() {
        let (mut storage, mut tree) = setup(128);
        for key in 0..100 {
            add(&mut storage, &mut tree, key);
        }
        assert_eq!(tree.len(), 100);
        assert_eq!(keys(&storage, &tree), (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn insert_descending_stays_balanced() {
        let (mut storage, mut tree) = setup(128);
        for key in (0..100).rev() {
            add(&mut storage, &mut tree, key);
        }
        assert_eq!(tree.len(), 100);
        assert_eq!(keys(&storage, &tree), (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn find_roundtrip() {
        let (mut storage, mut tree) = setup(32);

        let idx = add(&mut storage, &mut tree, 7);
        assert_eq!(tree.find(&storage, &7), Some(idx));
        assert!(tree.contains(&storage, &7));
        assert_eq!(tree.find(&storage, &8), None);

        tree.remove(&mut storage, idx).unwrap();
        assert_eq!(tree.find(&storage, &7), None);
    }

    #[test]
    fn remove_key_returns_handle() {
        let (mut storage, mut tree) = setup(32);

        let a = add(&mut storage, &mut tree, 1);
        let b = add(&mut storage, &mut tree, 2);

        assert_eq!(tree.remove_key(&mut storage, &1), Ok(a));
        tree.check_invariants(&storage);
        assert_eq!(tree.len(), 1);
        assert!(storage.get(a).unwrap().is_unlinked());
        assert_eq!(tree.find(&storage, &2), Some(b));
    }

    #[test]
    fn remove_absent_key_is_idempotent() {
        let (mut storage, mut tree) = setup(32);

        assert_eq!(tree.remove_key(&mut storage, &9), Err(TreeError::NotFound));

        add(&mut storage, &mut tree, 1);
        assert_eq!(tree.remove_key(&mut storage, &9), Err(TreeError::NotFound));
        assert_eq!(tree.remove_key(&mut storage, &9), Err(TreeError::NotFound));
        assert_eq!(tree.len(), 1);
        tree.check_invariants(&storage);
    }

    #[test]
    fn remove_node_twice_reports_not_found() {
        let (mut storage, mut tree) = setup(32);

        let a = add(&mut storage, &mut tree, 1);
        add(&mut storage, &mut tree, 2);

        assert_eq!(tree.remove(&mut storage, a), Ok(()));
        assert_eq!(tree.remove(&mut storage, a), Err(TreeError::NotFound));
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn remove_dead_handle_reports_not_found() {
        let (mut storage, mut tree) = setup(32);
        add(&mut storage, &mut tree, 1);
        assert_eq!(tree.remove(&mut storage, 999), Err(TreeError::NotFound));
    }

    #[test]
    fn remove_last_node_resets_tree() {
        let (mut storage, mut tree) = setup(16);

        let idx = add(&mut storage, &mut tree, 5);
        tree.remove(&mut storage, idx).unwrap();

        assert!(tree.is_empty());
        assert_eq!(tree.len(), 0);
        assert!(tree.root().is_none());
        assert!(storage.get(idx).unwrap().is_unlinked());
    }

    #[test]
    fn remove_interior_nodes() {
        let (mut storage, mut tree) = setup(64);

        let handles: Vec<u32> = (0..32).map(|k| add(&mut storage, &mut tree, k)).collect();

        // Remove every other node, checking invariants as we go
        for (i, &idx) in handles.iter().enumerate() {
            if i % 2 == 0 {
                tree.remove(&mut storage, idx).unwrap();
                tree.check_invariants(&storage);
            }
        }

        let expected: Vec<i64> = (0..32).filter(|k| k % 2 == 1).collect();
        assert_eq!(keys(&storage, &tree), expected);
    }

    #[test]
    fn replace_same_key_preserves_structure() {
        let (mut storage, mut tree) = setup(32);

        for key in 0..10 {
            add(&mut storage, &mut tree, key);
        }
        let old = tree.find(&storage, &5).unwrap();
        let new = storage.try_insert(Node::new(5)).unwrap();

        assert_eq!(tree.replace(&mut storage, old, new), Ok(()));
        tree.check_invariants(&storage);
        assert_eq!(tree.len(), 10);
        assert_eq!(tree.find(&storage, &5), Some(new));
        assert!(storage.get(old).unwrap().is_unlinked());
    }

    #[test]
    fn replace_root() {
        let (mut storage, mut tree) = setup(16);

        let old = add(&mut storage, &mut tree, 1);
        let new = storage.try_insert(Node::new(1)).unwrap();

        assert_eq!(tree.replace(&mut storage, old, new), Ok(()));
        assert_eq!(tree.root(), new);
        assert_eq!(storage.get(new).unwrap().color, Color::Black);
        tree.check_invariants(&storage);
    }

    #[test]
    fn replace_with_different_key_rejected() {
        let (mut storage, mut tree) = setup(32);

        let old = add(&mut storage, &mut tree, 5);
        let other = storage.try_insert(Node::new(6)).unwrap();

        assert_eq!(
            tree.replace(&mut storage, old, other),
            Err(TreeError::Duplicate)
        );
        assert_eq!(tree.find(&storage, &5), Some(old));
        assert!(storage.get(other).unwrap().is_unlinked());
        tree.check_invariants(&storage);
    }

    #[test]
    fn replace_non_member_rejected() {
        let (mut storage, mut tree) = setup(32);

        add(&mut storage, &mut tree, 1);
        let stray = storage.try_insert(Node::new(2)).unwrap();
        let new = storage.try_insert(Node::new(2)).unwrap();

        assert_eq!(
            tree.replace(&mut storage, stray, new),
            Err(TreeError::NotFound)
        );
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn inorder_iteration_sorted() {
        let (mut storage, mut tree) = setup(64);

        for key in [5, 1, 9, -3, 7, 0, 12, 4] {
            add(&mut storage, &mut tree, key);
        }

        assert_eq!(keys(&storage, &tree), vec![-3, 0, 1, 4, 5, 7, 9, 12]);

        let iter = tree.iter(&storage);
        assert_eq!(iter.len(), 8);
    }

    #[test]
    fn first_returns_minimum() {
        let (mut storage, mut tree) = setup(32);

        assert_eq!(tree.first(&storage), None);
        add(&mut storage, &mut tree, 5);
        let min = add(&mut storage, &mut tree, -2);
        add(&mut storage, &mut tree, 9);

        assert_eq!(tree.first(&storage), Some(min));
    }

    #[test]
    fn permutation_cycles_reset_to_pristine() {
        use rand::rngs::SmallRng;
        use rand::seq::SliceRandom;
        use rand::SeedableRng;

        let mut rng = SmallRng::seed_from_u64(7);
        let (mut storage, mut tree) = setup(256);

        for _ in 0..8 {
            let mut order: Vec<i64> = (0..200).collect();
            order.shuffle(&mut rng);

            let handles: Vec<(i64, u32)> = order
                .iter()
                .map(|&k| (k, add(&mut storage, &mut tree, k)))
                .collect();
            assert_eq!(tree.len(), 200);

            let mut removal = handles;
            removal.shuffle(&mut rng);
            for (_, idx) in removal {
                tree.remove(&mut storage, idx).unwrap();
                tree.check_invariants(&storage);
            }

            // Same state as a freshly constructed tree
            assert!(tree.is_empty());
            assert_eq!(tree.len(), 0);
            assert!(tree.root().is_none());

            for i in 0..storage.capacity() as u32 {
                if let Some(node) = storage.get(i) {
                    assert!(node.is_unlinked());
                    storage.remove(i);
                }
            }
        }
    }

    #[test]
    fn stress_random_operations() {
        use rand::rngs::SmallRng;
        use rand::Rng;
        use rand::SeedableRng;
        use std::collections::BTreeMap;

        let mut rng = SmallRng::seed_from_u64(42);
        let (mut storage, mut tree) = setup(512);
        let mut model: BTreeMap<i64, u32> = BTreeMap::new();

        for step in 0..5_000 {
            let op = rng.random_range(0..100);
            let key = rng.random_range(-100..100i64);

            if op < 50 {
                let idx = storage.try_insert(Node::new(key)).unwrap();
                let result = tree.insert(&mut storage, idx);
                if model.contains_key(&key) {
                    assert_eq!(result, Err(TreeError::Duplicate));
                    storage.remove(idx);
                } else {
                    assert_eq!(result, Ok(()));
                    model.insert(key, idx);
                }
            } else if op < 75 {
                let result = tree.remove_key(&mut storage, &key);
                match model.remove(&key) {
                    Some(idx) => {
                        assert_eq!(result, Ok(idx));
                        storage.remove(idx);
                    }
                    None => assert_eq!(result, Err(TreeError::NotFound)),
                }
            } else if op < 95 {
                assert_eq!(tree.find(&storage, &key), model.get(&key).copied());
            } else {
                let picked = model.iter().next().map(|(&k, &i)| (k, i));
                if let Some((key, old)) = picked {
                    let new = storage.try_insert(Node::new(key)).unwrap();
                    assert_eq!(tree.replace(&mut storage, old, new), Ok(()));
                    storage.remove(old);
                    model.insert(key, new);
                }
            }

            assert_eq!(tree.len(), model.len());
            if step % 64 == 0 {
                tree.check_invariants(&storage);
            }
        }

        tree.check_invariants(&storage);
        let tree_keys: Vec<i64> = tree.iter(&storage).map(|(_, n)| n.key).collect();
        let model_keys: Vec<i64> = model.keys().copied().collect();
        assert_eq!(tree_keys, model_keys);
    }

    #[test]
    #[ignore]
    fn bench_tree_latency() {
        use hdrhistogram::Histogram;
        use rand::rngs::SmallRng;
        use rand::seq::SliceRandom;
        use rand::SeedableRng;
        use std::time::Instant;

        const N: usize = 100_000;

        let mut rng = SmallRng::seed_from_u64(1);
        let mut keys: Vec<i64> = (0..N as i64).collect();
        keys.shuffle(&mut rng);

        let mut storage: Arena<Node> = Arena::with_capacity(N);
        let mut tree: RbTree<u32> = RbTree::new();

        let mut insert_hist = Histogram::<u64>::new(3).unwrap();
        let mut find_hist = Histogram::<u64>::new(3).unwrap();
        let mut remove_hist = Histogram::<u64>::new(3).unwrap();

        let mut handles = Vec::with_capacity(N);
        for &key in &keys {
            let idx = storage.try_insert(Node::new(key)).unwrap();
            let start = Instant::now();
            tree.insert(&mut storage, idx).unwrap();
            insert_hist
                .record(start.elapsed().as_nanos() as u64)
                .unwrap();
            handles.push(idx);
        }

        for &key in &keys {
            let start = Instant::now();
            let found = std::hint::black_box(tree.find(&storage, &key));
            find_hist.record(start.elapsed().as_nanos() as u64).unwrap();
            assert!(found.is_some());
        }

        handles.shuffle(&mut rng);
        for idx in handles {
            let start = Instant::now();
            tree.remove(&mut storage, idx).unwrap();
            remove_hist
                .record(start.elapsed().as_nanos() as u64)
                .unwrap();
        }

        for (name, hist) in [
            ("insert", &insert_hist),
            ("find", &find_hist),
            ("remove", &remove_hist),
        ] {
            println!(
                "{:8} | p50: {:4} ns | p90: {:4} ns | p99: {:4} ns | p999: {:5} ns",
                name,
                hist.value_at_quantile(0.50),
                hist.value_at_quantile(0.90),
                hist.value_at_quantile(0.99),
                hist.value_at_quantile(0.999),
            );
        }
    }
}
