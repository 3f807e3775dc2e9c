//! Disk-resident reverse index.
//!
//! Builds a word-to-documents index from journal shards and answers lookups
//! against it through static B-trees over word arrays.

#![warn(missing_docs)]

pub mod admin;
pub mod index;
pub mod primitives;
pub mod storage;
pub mod types;
