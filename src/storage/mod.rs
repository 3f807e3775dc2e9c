//! On-disk structures built from word arrays.

/// Static B-tree layout over sorted records.
///
/// Written once in bulk, then queried through a resident or a pooled reader.
pub mod btree;
