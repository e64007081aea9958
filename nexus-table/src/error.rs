//! Error types.

use std::alloc::Layout;
use std::fmt;

/// Error returned by `try_reserve`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TryReserveError {
    /// The requested capacity exceeds what the table (or its index type) can
    /// address.
    CapacityOverflow,
    /// The allocator failed.
    AllocError {
        /// The layout that was requested.
        layout: Layout,
    },
}

impl fmt::Display for TryReserveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CapacityOverflow => f.write_str("capacity overflow"),
            Self::AllocError { layout } => write!(
                f,
                "memory allocation of {} bytes (align {}) failed",
                layout.size(),
                layout.align()
            ),
        }
    }
}

impl std::error::Error for TryReserveError {}

/// Turns a fallible growth result into the infallible-path behavior:
/// panic on overflow, `handle_alloc_error` on allocator failure.
#[inline]
pub(crate) fn infallible(result: Result<(), TryReserveError>) {
    match result {
        Ok(()) => {}
        Err(TryReserveError::CapacityOverflow) => panic!("capacity overflow"),
        Err(TryReserveError::AllocError { layout }) => std::alloc::handle_alloc_error(layout),
    }
}
