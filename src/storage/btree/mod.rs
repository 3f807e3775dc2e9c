#![forbid(unsafe_code)]

//! Static, write-once B-trees over word arrays.
//!
//! A tree is a three-word header, an optional stack of index layers, and a
//! data block of fixed-size records sorted by their first word:
//!
//! ```text
//! [header][pad][layer n-1 .. layer 0][data]
//! ```
//!
//! Each index layer is padded to whole blocks of `page_size` words. Entry
//! `i` of layer `L` holds the largest key under it, so a lookup bisects one
//! block per layer. Padding is `u64::MAX`.

mod context;
mod header;
mod pointer;
mod pooled;
mod reader;
mod writer;

pub use context::{BTreeBlockSize, BTreeContext};
pub use header::BTreeHeader;
pub use pooled::PooledBTreeReader;
pub use reader::BTreeReader;
pub use writer::BTreeWriter;

#[cfg(test)]
mod tests;
