//! Result shapes for bulk operations that keep going after individual failures.

/// An operation that completed for everything it could.
/// The `Vec<E>` holds the failures of the parts that were skipped.
pub type PartialSuccess<T, E> = ( T, Vec<E> );
