//! Intrusive collections over external storage.
//!
//! This crate provides a red-black ordered tree, a LIFO stack, and a FIFO
//! queue that never own their nodes. The key insight: separate storage from
//! structure.
//!
//! # Design Philosophy
//!
//! Traditional collections own their data:
//!
//! ```text
//! BTreeMap<K,V>  - owns values, allocates on insert
//! Vec<T>         - owns values, indices unstable on removal
//! LinkedList<T>  - owns nodes, pointer chasing, hidden allocation
//! ```
//!
//! This crate inverts the model:
//!
//! ```text
//! Storage (Arena)     - owns nodes, provides stable integer handles
//! RbTree/Stack/Queue  - coordinate handles, don't own data
//! ```
//!
//! Nodes embed their own link fields (left/right/parent/color for the tree,
//! next for the stack, prev/next for the queue) through small accessor
//! traits. The containers only read and write those fields:
//!
//! - **No allocation on any operation**: pre-allocate storage at startup
//! - **Stable handles**: a handle stays valid until the caller removes the
//!   node from storage
//! - **Node identity**: removal and replacement address a specific node, not
//!   just a key
//! - **Shared storage**: nodes with multiple link sets can sit in several
//!   structures at once
//!
//! # Quick Start
//!
//! Most callers want the owned wrappers, which bundle a container with its
//! storage:
//!
//! ```
//! use arbor_collections::OwnedTree;
//!
//! let mut tree: OwnedTree<i64, &str> = OwnedTree::with_capacity(1000);
//!
//! tree.insert(2, "two").unwrap();
//! tree.insert(1, "one").unwrap();
//!
//! assert_eq!(tree.get(&1), Some(&"one"));
//! assert_eq!(tree.remove(&2), Some("two"));
//! ```
//!
//! The intrusive layer is there when nodes must live in caller-controlled
//! memory:
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
//! # impl TreeLinked<u32> for Order {
//! #     type Key = i64;
//! #     fn key(&self) -> &i64 { &self.price }
//! #     fn left(&self) -> u32 { self.left }
//! #     fn right(&self) -> u32 { self.right }
//! #     fn parent(&self) -> u32 { self.parent }
//! #     fn color(&self) -> Color { self.color }
//! #     fn set_left(&mut self, idx: u32) { self.left = idx; }
//! #     fn set_right(&mut self, idx: u32) { self.right = idx; }
//! #     fn set_parent(&mut self, idx: u32) { self.parent = idx; }
//! #     fn set_color(&mut self, color: Color) { self.color = color; }
//! # }
//!
//! let mut storage: Arena<Order> = Arena::with_capacity(1000);
//! let mut book: RbTree<u32> = RbTree::new();
//!
//! let idx = storage.try_insert(Order {
//!     price: 100,
//!     color: Color::Red,
//!     parent: u32::NONE,
//!     left: u32::NONE,
//!     right: u32::NONE,
//! }).unwrap();
//!
//! book.insert(&mut storage, idx).unwrap();
//! assert_eq!(book.find(&storage, &100), Some(idx));
//! ```
//!
//! # Critical Invariant: Same Storage Instance
//!
//! All operations on a container must use the same storage instance. This is
//! the caller's responsibility (same discipline as the `slab` crate).
//! Passing a different storage is a logic error with unspecified (but
//! memory-safe) results.
//!
//! # Error Reporting
//!
//! Fallible operations return `Result`; misuse that the containers can
//! detect (operating on a node that is not a member, duplicate keys) comes
//! back as an `Err`, never a panic. Internal invariant breaks are
//! `debug_assert!`ed. On removal a node's link fields are reset to
//! `Idx::NONE`, so "is this node in a container" stays observable from the
//! node itself.
//!
//! # Data Structures
//!
//! | Structure | Use Case | Key Operations |
//! |-----------|----------|----------------|
//! | [`RbTree`] | Ordered indexes, order books | O(log n) insert/remove/find |
//! | [`Stack`] | Free lists, undo chains | O(1) push/pop |
//! | [`Queue`] | Work queues, FIFO buffers | O(1) enqueue/dequeue |
//!
//! # Feature Flags
//!
//! - `slab` - Enable [`Storage`] impl for `slab::Slab`

#![warn(missing_docs)]

pub mod key;
pub mod owned;
pub mod queue;
pub mod stack;
pub mod storage;
pub mod tree;

pub use key::Key;
pub use owned::{InsertError, OwnedQueue, OwnedStack, OwnedTree};
pub use queue::{Linked, Queue};
pub use stack::{Chained, Stack};
pub use storage::{Arena, Full, Storage};
pub use tree::{Color, RbTree, TreeError, TreeLinked};
