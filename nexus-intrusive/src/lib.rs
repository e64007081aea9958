//! Intrusive balanced trees and heaps over external storage.
//!
//! Containers in this crate never own their elements. Each element lives in a
//! [`Storage`] slot wrapped in a node type that embeds a [`Link`] (two child
//! keys and a parent key). A container is just a root key plus a length; all
//! of its structure lives in the embedded links, so linking, unlinking and
//! rebalancing never allocate and never move values.
//!
//! ```text
//! Storage (BoxedStorage / Slab) - owns nodes, hands out stable keys
//! AvlTree / RbTree / WbTree     - ordered sets threaded through node links
//! Heap                          - complete binary tree threaded through links
//! List                          - sorted list produced by `flatten`
//! ```
//!
//! Benefits:
//! - **Stable keys**: an element keeps its key while it moves between
//!   containers, and other keys stay valid when it is erased
//! - **Zero allocation on hot path**: pre-allocate storage at startup
//! - **Caller-owned lifetime**: `erase` unlinks, `remove` also frees the slot
//! - **Shared storage**: several containers can draw from one pool
//!
//! # Quick Start
//!
//! ```
//! use nexus_intrusive::{AvlTree, BoxedAvlStorage};
//!
//! let mut storage: BoxedAvlStorage<u64> = BoxedAvlStorage::with_capacity(1000);
//! let mut tree: AvlTree<u64, BoxedAvlStorage<u64>> = AvlTree::new();
//!
//! let (key, inserted) = tree.try_insert(&mut storage, 42).unwrap();
//! assert!(inserted);
//! assert_eq!(tree.find(&storage, &42), Some(key));
//!
//! // Unlink but keep the value in storage.
//! tree.erase(&mut storage, key);
//! assert!(tree.is_empty());
//!
//! // Link it again, no allocation.
//! assert_eq!(tree.insert(&mut storage, key), (key, true));
//! ```
//!
//! # Critical Invariant: Same Storage Instance
//!
//! All operations on a container must use the same storage instance. This is
//! the caller's responsibility (same discipline as the `slab` crate). Keys
//! read from links are accessed without an occupancy check, so passing a
//! different storage is undefined behavior.
//!
//! An element is in at most one container at a time. While it is linked the
//! container owns its [`Link`]; the caller owns the slot.
//!
//! # Storage Traits
//!
//! ```text
//! Storage<T>           - base trait: get, remove, len
//!     │
//!     ├── BoundedStorage<T>   - fixed capacity, try_insert -> Result
//!     │
//!     └── UnboundedStorage<T> - growable, insert -> Key (infallible)
//! ```
//!
//! Containers offer `try_insert` / `try_push_value` over bounded storage
//! (returning [`Full`] with the rejected value) and `insert_value` /
//! `push_value` over unbounded storage.
//!
//! # Data Structures
//!
//! | Structure | Balance | Extra Operations |
//! |-----------|---------|------------------|
//! | [`AvlTree`] | height difference ≤ 1 | tightest height bound |
//! | [`RbTree`] | colour rules | fewest rotations on erase |
//! | [`WbTree`] | subtree sizes | `select`, `rank`, `nth_vacant_key` |
//! | [`Heap`] | complete tree | O(log n) removal of any node |
//!
//! Every container has a `check_invariants` method returning
//! [`InvariantError`] describing the first violated rule.
//!
//! # Feature Flags
//!
//! - `slab` - Enable [`Storage`] impl for `slab::Slab`

#![warn(missing_docs)]

pub mod avl;
pub mod compare;
pub mod error;
pub mod heap;
pub mod key;
pub mod link;
pub mod list;
pub mod rb;
pub mod storage;
pub mod wb;

pub use avl::{AvlNode, AvlTree, BoxedAvlStorage};
pub use compare::{Compare, Greater, HeapCompare, Keyed, Less, Natural, Reverse};
pub use error::InvariantError;
pub use heap::{BoxedHeapStorage, Heap, HeapNode, MaxHeap, MinHeap};
pub use key::Key;
pub use link::{Iter, Keys, Link, Node};
pub use list::{List, ListIter, ListKeys};
pub use rb::{BoxedRbStorage, RbNode, RbTree};
pub use storage::{BoundedStorage, BoxedStorage, Full, Storage, UnboundedStorage};
pub use wb::{BoxedWbStorage, WbNode, WbTree};

#[cfg(feature = "slab")]
pub use avl::SlabAvlStorage;
#[cfg(feature = "slab")]
pub use heap::SlabHeapStorage;
#[cfg(feature = "slab")]
pub use rb::SlabRbStorage;
#[cfg(feature = "slab")]
pub use wb::SlabWbStorage;
