//! Open-addressing hash tables with caller-visible slots.
//!
//! Two engines, each with a map and a set on top:
//!
//! ```text
//! RawSwissTable          - 16-wide control-byte groups, SSE2 when available
//!   SwissMap / SwissSet
//! RawDeterministicTable  - Robin-Hood buckets + dense element array
//!   DeterministicMap / DeterministicSet
//! ```
//!
//! | Engine | Load | Iteration | Slot stable until |
//! |--------|------|-----------|-------------------|
//! | swiss | 7/8 | slot order | growth |
//! | deterministic | 3/4 | insertion order until an erase | erase |
//!
//! Both engines keep everything in a single allocation obtained from an
//! [`Allocator`]. An allocator may return more bytes than requested and the
//! tables grow their capacity into the surplus.
//!
//! # Quick Start
//!
//! ```
//! use nexus_table::{DeterministicMap, SwissMap};
//!
//! let mut fast: SwissMap<u64, &str> = SwissMap::new();
//! let (slot, inserted) = fast.insert(7, "seven");
//! assert!(inserted);
//! assert_eq!(fast.get_slot(slot), Some((&7, &"seven")));
//!
//! let mut ordered: DeterministicMap<&str, u32> = DeterministicMap::new();
//! ordered.insert("b", 2);
//! ordered.insert("a", 1);
//! assert_eq!(ordered.keys().copied().collect::<Vec<_>>(), ["b", "a"]);
//! ```
//!
//! # Insert Semantics
//!
//! `insert` is insert-if-absent: when the key exists the map is unchanged and
//! the existing slot is returned with `false`. `insert_or_assign` overwrites
//! and `try_insert_with` only builds the value when the key is new.
//!
//! # Errors
//!
//! Growth in `insert`/`reserve` panics on capacity overflow and calls
//! [`std::alloc::handle_alloc_error`] if the allocator fails. `try_reserve`
//! reports both as [`TryReserveError`]. The deterministic engine panics with
//! a length error once `I::max_len()` elements are stored.
//!
//! # Feature Flags
//!
//! - `simd` (default) - SSE2 group matching on x86/x86_64

#![warn(missing_docs)]

pub mod alloc;
pub mod deterministic;
pub mod error;
pub mod group;
pub mod index;
pub mod map;
pub mod set;
pub mod swiss;

pub use alloc::{AllocError, Allocation, Allocator, Global};
pub use deterministic::RawDeterministicTable;
pub use error::TryReserveError;
pub use index::Index;
pub use map::{DeterministicMap, Slot, SwissMap};
pub use set::{DeterministicSet, SwissSet};
pub use swiss::RawSwissTable;
