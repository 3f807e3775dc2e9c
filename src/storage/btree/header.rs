use super::BTreeContext;
use crate::primitives::array::{LongRead, LongWrite};
use crate::types::{IndexError, Result};

/// Layout of a written tree, persisted in its first three words:
/// `[(layers << 32) | num_entries][index_offset][data_offset]`.
///
/// Offsets are absolute word positions within the containing array.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BTreeHeader {
    /// Number of index layers above the data block.
    pub layers: u32,
    /// Number of records in the data block.
    pub num_entries: u64,
    /// First word of the topmost index layer.
    pub index_offset: u64,
    /// First word of the data block.
    pub data_offset: u64,
}

impl BTreeHeader {
    /// Header size in words.
    pub const SIZE_WORDS: u64 = 3;

    /// Computes the layout of a tree of `num_entries` records written at `offset`.
    pub fn plan(ctx: &BTreeContext, offset: u64, num_entries: u64) -> Result<Self> {
        if num_entries > u64::from(u32::MAX) {
            return Err(IndexError::Invalid("btree entry count exceeds 32 bits"));
        }
        let layers = ctx.num_index_layers(num_entries);
        if layers > ctx.max_layers() {
            return Err(IndexError::Invalid("btree needs more index layers than allowed"));
        }
        let after_header = offset + Self::SIZE_WORDS;
        let index_offset = if layers == 0 {
            after_header
        } else {
            after_header.next_multiple_of(ctx.page_size())
        };
        let index_size: u64 = (0..layers)
            .map(|layer| ctx.index_layer_size(num_entries, layer))
            .sum();
        Ok(Self {
            layers,
            num_entries,
            index_offset,
            data_offset: index_offset + index_size,
        })
    }

    /// Reads and validates the header stored at `offset`.
    pub fn read<A: LongRead + ?Sized>(array: &A, ctx: &BTreeContext, offset: u64) -> Result<Self> {
        if offset + Self::SIZE_WORDS > array.len() {
            return Err(IndexError::Corruption("btree header past end of array"));
        }
        let words = [array.get(offset), array.get(offset + 1), array.get(offset + 2)];
        Self::decode(words, ctx, offset, array.len())
    }

    /// Validates raw header words against `ctx` and the containing array length.
    pub fn decode(words: [u64; 3], ctx: &BTreeContext, offset: u64, available: u64) -> Result<Self> {
        let header = Self {
            layers: (words[0] >> 32) as u32,
            num_entries: words[0] & u64::from(u32::MAX),
            index_offset: words[1],
            data_offset: words[2],
        };
        let expected = Self::plan(ctx, offset, header.num_entries)
            .map_err(|_| IndexError::Corruption("btree header does not match context"))?;
        if expected != header {
            return Err(IndexError::Corruption("btree header layout mismatch"));
        }
        if header.data_end(ctx) > available {
            return Err(IndexError::Corruption("btree data extends past end of array"));
        }
        Ok(header)
    }

    /// Stores the header at `offset`.
    pub fn write<A: LongWrite + ?Sized>(&self, array: &mut A, offset: u64) {
        array.set(offset, (u64::from(self.layers) << 32) | self.num_entries);
        array.set(offset + 1, self.index_offset);
        array.set(offset + 2, self.data_offset);
    }

    /// One past the last word of the data block.
    pub fn data_end(&self, ctx: &BTreeContext) -> u64 {
        self.data_offset + self.num_entries * ctx.entry_size()
    }

    /// Absolute start of each index layer, indexed by layer number. Layers
    /// are stored top first, so layer `layers - 1` starts at `index_offset`.
    pub fn layer_offsets(&self, ctx: &BTreeContext) -> Vec<u64> {
        let mut offsets = vec![0; self.layers as usize];
        let mut next = self.index_offset;
        for layer in (0..self.layers).rev() {
            offsets[layer as usize] = next;
            next += ctx.index_layer_size(self.num_entries, layer);
        }
        offsets
    }
}
