use std::sync::Arc;

use super::pointer::{self, BlockSource, Filter};
use super::{BTreeContext, BTreeHeader};
use crate::primitives::array::{LongArray, LongQueryBuffer, LongRange, LongRead};
use crate::types::Result;

/// Reads a tree held in a resident (heap or mapped) word array.
#[derive(Clone, Debug)]
pub struct BTreeReader {
    file: Arc<LongArray>,
    ctx: BTreeContext,
    header: BTreeHeader,
}

impl BTreeReader {
    /// Opens the tree whose header sits at `offset` in `file`.
    pub fn new(file: Arc<LongArray>, ctx: BTreeContext, offset: u64) -> Result<Self> {
        let header = BTreeHeader::read(file.as_ref(), &ctx, offset)?;
        Ok(Self { file, ctx, header })
    }

    /// The tree's header.
    pub fn header(&self) -> &BTreeHeader {
        &self.header
    }

    /// Number of records.
    pub fn num_entries(&self) -> u64 {
        self.header.num_entries
    }

    /// The data block, as a zero-based view.
    pub fn data(&self) -> LongRange<'_, LongArray> {
        self.file.range(self.header.data_offset, self.header.data_end(&self.ctx))
    }

    /// The index layers, top layer first.
    pub fn index(&self) -> LongRange<'_, LongArray> {
        self.file.range(self.header.index_offset, self.header.data_offset)
    }

    /// Copies data words starting at data-relative offset `pos` into `buf`.
    pub fn read_data(&self, pos: u64, buf: &mut [u64]) {
        let data = self.data();
        for (i, slot) in buf.iter_mut().enumerate() {
            *slot = data.get(pos + i as u64);
        }
    }

    /// Word offset of `key`'s record within the data block, or
    /// `-1 - insertion_point` when absent.
    pub fn find_entry(&self, key: u64) -> Result<i64> {
        pointer::find_entry(self, key)
    }

    /// For ascending `keys`, the word at `value_offset` of each matching
    /// record, 0 where absent.
    pub fn query_data(&self, keys: &[u64], value_offset: u64) -> Result<Vec<u64>> {
        pointer::query_data(self, keys, value_offset)
    }

    /// Keeps only the buffer values that are keys of this tree.
    pub fn retain_entries(&self, buffer: &mut LongQueryBuffer) -> Result<()> {
        pointer::filter_entries(self, buffer, Filter::Retain)
    }

    /// Drops the buffer values that are keys of this tree.
    pub fn reject_entries(&self, buffer: &mut LongQueryBuffer) -> Result<()> {
        pointer::filter_entries(self, buffer, Filter::Reject)
    }
}

impl BlockSource for BTreeReader {
    type Block<'a> = LongRange<'a, LongArray>;

    fn context(&self) -> &BTreeContext {
        &self.ctx
    }

    fn header(&self) -> &BTreeHeader {
        &self.header
    }

    fn index_block(&self, start: u64, len: u64) -> Result<Self::Block<'_>> {
        Ok(self.file.range(start, start + len))
    }

    fn data_block(&self, start: u64, len: u64) -> Result<Self::Block<'_>> {
        Ok(self.file.range(start, start + len))
    }
}
