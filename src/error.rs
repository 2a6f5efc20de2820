//! Error taxonomy for the hierarchy constructor and bidirectional search.
//!
//! `NoPath` is deliberately not a variant here: an unreachable target is a
//! normal outcome of a shortest-path query, not a failure, and is
//! represented by callers as an empty path with cost `-1.0` (see
//! [`crate::query::shortest_path`]).

use thiserror::Error;

/// Errors surfaced by graph construction, contraction, and querying.
#[derive(Debug, Error)]
pub enum ChError {
    /// The caller supplied a malformed request: an unknown vertex id, a
    /// negative or non-finite weight, or a removal of an edge that does
    /// not exist.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A [`crate::heap::MinHeap`] operation that requires at least one
    /// element (`peek`, `pop`, `replace_top`) was called on an empty heap.
    #[error("operation attempted on an empty heap")]
    EmptyHeap,

    /// An internal invariant was violated (negative shortcut weight, a
    /// dangling shortcut reference, an order assigned twice). This
    /// indicates a bug in the constructor or search, not bad input, and is
    /// not expected to be recoverable by a caller.
    #[error("invariant violation: {0}")]
    CorruptState(String),
}

/// Convenience alias used throughout the crate.
pub type ChResult<T> = Result<T, ChError>;
