use super::{BTreeContext, BTreeHeader};
use crate::primitives::array::{decode_search_miss, encode_search_miss, LongArraySearch, LongQueryBuffer, LongRead};
use crate::types::Result;

/// Where a reader gets its blocks from. Offsets are absolute word positions.
pub(crate) trait BlockSource {
    type Block<'a>: LongRead
    where
        Self: 'a;

    fn context(&self) -> &BTreeContext;

    fn header(&self) -> &BTreeHeader;

    fn index_block(&self, start: u64, len: u64) -> Result<Self::Block<'_>>;

    fn data_block(&self, start: u64, len: u64) -> Result<Self::Block<'_>>;
}

/// Descent state for one lookup, reused across ascending keys.
struct BTreePointer<'s, S: BlockSource> {
    source: &'s S,
    layer_offsets: Vec<u64>,
    layer: u32,
    pointer_offset: u64,
    max_value_in_block: u64,
}

impl<'s, S: BlockSource> BTreePointer<'s, S> {
    fn new(source: &'s S) -> Self {
        let header = source.header();
        Self {
            source,
            layer_offsets: header.layer_offsets(source.context()),
            layer: header.layers,
            pointer_offset: 0,
            max_value_in_block: u64::MAX,
        }
    }

    fn reset(&mut self) {
        self.layer = self.source.header().layers;
        self.pointer_offset = 0;
        self.max_value_in_block = u64::MAX;
    }

    /// Descends to the leaf block that would hold `key`. Returns false when
    /// `key` is larger than every key in the tree.
    fn walk_to_data(&mut self, key: u64) -> Result<bool> {
        let ctx = *self.source.context();
        let num_entries = self.source.header().num_entries;
        let page_size = ctx.page_size();
        while self.layer > 0 {
            let layer = self.layer - 1;
            let span = ctx.layer_span(layer);
            let first_entry = self.pointer_offset / span;
            let real = (ctx.layer_entries(num_entries, layer) - first_entry).min(page_size);
            let block = self
                .source
                .index_block(self.layer_offsets[layer as usize] + first_entry, page_size)?;
            let child = block.binary_search_upper_bound(key, 0, real);
            if child >= real {
                return Ok(false);
            }
            self.max_value_in_block = block.get(child);
            self.pointer_offset += child * span;
            self.layer = layer;
        }
        Ok(true)
    }

    /// Absolute start and length in words of the current leaf block.
    fn data_range(&self) -> (u64, u64) {
        let ctx = self.source.context();
        let header = self.source.header();
        let records = if header.layers == 0 {
            header.num_entries
        } else {
            header
                .num_entries
                .saturating_sub(self.pointer_offset)
                .min(ctx.page_size())
        };
        (
            header.data_offset + self.pointer_offset * ctx.entry_size(),
            records * ctx.entry_size(),
        )
    }

    /// Word offset of the current leaf block relative to the data block.
    fn data_base(&self) -> u64 {
        self.pointer_offset * self.source.context().entry_size()
    }
}

/// Data-relative offset of `key`'s record, or an encoded miss.
pub(crate) fn find_entry<S: BlockSource>(source: &S, key: u64) -> Result<i64> {
    let entry_size = source.context().entry_size();
    let mut pointer = BTreePointer::new(source);
    if !pointer.walk_to_data(key)? {
        return Ok(encode_search_miss(source.header().num_entries * entry_size));
    }
    let (start, len) = pointer.data_range();
    let block = source.data_block(start, len)?;
    let base = pointer.data_base();
    let found = block.binary_search_n(entry_size, key, 0, len);
    Ok(if found >= 0 {
        (base + found as u64) as i64
    } else {
        encode_search_miss(base + decode_search_miss(found))
    })
}

/// Looks up ascending `keys`, returning the word at `value_offset` of each
/// matching record, or 0 where the key is absent.
pub(crate) fn query_data<S: BlockSource>(source: &S, keys: &[u64], value_offset: u64) -> Result<Vec<u64>> {
    let entry_size = source.context().entry_size();
    debug_assert!(value_offset < entry_size);
    let mut values = vec![0u64; keys.len()];
    let mut pointer = BTreePointer::new(source);
    let mut block: Option<(S::Block<'_>, u64)> = None;
    for (slot, &key) in values.iter_mut().zip(keys) {
        if block.is_none() || key > pointer.max_value_in_block {
            pointer.reset();
            if !pointer.walk_to_data(key)? {
                break;
            }
            let (start, len) = pointer.data_range();
            block = Some((source.data_block(start, len)?, len));
        }
        if let Some((data, len)) = &block {
            let found = data.binary_search_n(entry_size, key, 0, *len);
            if found >= 0 {
                *slot = data.get(found as u64 + value_offset);
            }
        }
    }
    Ok(values)
}

/// Whether a filter keeps or drops the buffer values found in the tree.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum Filter {
    Retain,
    Reject,
}

/// Filters the ascending values of `buffer` against the tree's keys.
pub(crate) fn filter_entries<S: BlockSource>(source: &S, buffer: &mut LongQueryBuffer, filter: Filter) -> Result<()> {
    let entry_size = source.context().entry_size();
    let mut pointer = BTreePointer::new(source);
    while buffer.has_more() {
        let key = buffer.current_value();
        pointer.reset();
        if !pointer.walk_to_data(key)? {
            match filter {
                Filter::Retain => buffer.reject_remaining(),
                Filter::Reject => buffer.retain_remaining(),
            }
            break;
        }
        let (start, len) = pointer.data_range();
        let block = source.data_block(start, len)?;
        let found = block.binary_search_n(entry_size, key, 0, len);
        let pos = if found >= 0 {
            found as u64
        } else {
            decode_search_miss(found)
        };
        let boundary = pointer.max_value_in_block;
        match filter {
            Filter::Retain => block.retain_n(buffer, entry_size, boundary, pos, len),
            Filter::Reject => block.reject_n(buffer, entry_size, boundary, pos, len),
        }
        // values left at or under the boundary lie past the block's last key
        while buffer.has_more() && buffer.current_value() <= boundary {
            match filter {
                Filter::Retain => buffer.reject_and_advance(),
                Filter::Reject => buffer.retain_and_advance(),
            };
        }
    }
    buffer.finalize_filtering();
    Ok(())
}
