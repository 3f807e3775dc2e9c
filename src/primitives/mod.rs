//! Low-level primitives for building the index.
//!
//! Includes word arrays and their algorithms, positioned file I/O, and a
//! bounded page cache.

/// Word arrays and the sort, search, merge and transform algorithms over them.
///
/// Arrays live on the heap or in memory-mapped files, whole or paged.
pub mod array;

/// I/O abstractions and utilities.
///
/// Interfaces for positioned reads and writes of word files.
pub mod io;

/// Bounded page cache for reading word files without mapping them.
pub mod pool;
