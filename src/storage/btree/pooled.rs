use std::sync::Arc;

use super::pointer::{self, BlockSource, Filter};
use super::{BTreeContext, BTreeHeader};
use crate::primitives::array::{LongQueryBuffer, LongRead};
use crate::primitives::pool::{BufferPool, PinnedBlock};
use crate::types::Result;

/// Reads a tree through buffer pools instead of a resident array.
///
/// Index blocks and leaf blocks may come from separate pools so that a
/// small, hot index pool is not flushed by scans over the data.
pub struct PooledBTreeReader {
    index_pool: Arc<BufferPool>,
    data_pool: Arc<BufferPool>,
    ctx: BTreeContext,
    header: BTreeHeader,
}

impl PooledBTreeReader {
    /// Opens the tree at `offset`, reading index blocks from `index_pool`
    /// and leaf blocks from `data_pool`. Both pools must cover the same file.
    pub fn new(
        index_pool: Arc<BufferPool>,
        data_pool: Arc<BufferPool>,
        ctx: BTreeContext,
        offset: u64,
    ) -> Result<Self> {
        let block = index_pool.read_block(offset, BTreeHeader::SIZE_WORDS)?;
        let words = [block.get(0), block.get(1), block.get(2)];
        drop(block);
        let header = BTreeHeader::decode(words, &ctx, offset, data_pool.file_words())?;
        Ok(Self {
            index_pool,
            data_pool,
            ctx,
            header,
        })
    }

    /// Opens the tree at `offset` with one pool serving every read.
    pub fn open(pool: Arc<BufferPool>, ctx: BTreeContext, offset: u64) -> Result<Self> {
        Self::new(Arc::clone(&pool), pool, ctx, offset)
    }

    /// The tree's header.
    pub fn header(&self) -> &BTreeHeader {
        &self.header
    }

    /// Number of records.
    pub fn num_entries(&self) -> u64 {
        self.header.num_entries
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

impl BlockSource for PooledBTreeReader {
    type Block<'a> = PinnedBlock;

    fn context(&self) -> &BTreeContext {
        &self.ctx
    }

    fn header(&self) -> &BTreeHeader {
        &self.header
    }

    fn index_block(&self, start: u64, len: u64) -> Result<Self::Block<'_>> {
        self.index_pool.read_block(start, len)
    }

    fn data_block(&self, start: u64, len: u64) -> Result<Self::Block<'_>> {
        self.data_pool.read_block(start, len)
    }
}
