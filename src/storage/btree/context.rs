use crate::types::{IndexError, Result};

/// Supported block widths, in words, for index blocks and leaf blocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BTreeBlockSize {
    /// 16 words.
    Bs16,
    /// 32 words.
    Bs32,
    /// 64 words.
    Bs64,
    /// 128 words.
    Bs128,
    /// 256 words.
    Bs256,
    /// 512 words.
    Bs512,
    /// 1024 words.
    Bs1024,
    /// 2048 words.
    Bs2048,
    /// 4096 words.
    Bs4096,
}

impl BTreeBlockSize {
    /// Log2 of the block width.
    pub const fn bits(self) -> u32 {
        match self {
            BTreeBlockSize::Bs16 => 4,
            BTreeBlockSize::Bs32 => 5,
            BTreeBlockSize::Bs64 => 6,
            BTreeBlockSize::Bs128 => 7,
            BTreeBlockSize::Bs256 => 8,
            BTreeBlockSize::Bs512 => 9,
            BTreeBlockSize::Bs1024 => 10,
            BTreeBlockSize::Bs2048 => 11,
            BTreeBlockSize::Bs4096 => 12,
        }
    }

    /// Parses a block width in words.
    pub fn from_words(words: u64) -> Result<Self> {
        Ok(match words {
            16 => BTreeBlockSize::Bs16,
            32 => BTreeBlockSize::Bs32,
            64 => BTreeBlockSize::Bs64,
            128 => BTreeBlockSize::Bs128,
            256 => BTreeBlockSize::Bs256,
            512 => BTreeBlockSize::Bs512,
            1024 => BTreeBlockSize::Bs1024,
            2048 => BTreeBlockSize::Bs2048,
            4096 => BTreeBlockSize::Bs4096,
            _ => return Err(IndexError::Invalid("unsupported btree block size")),
        })
    }
}

/// Shape parameters shared by a tree's writer and its readers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BTreeContext {
    max_layers: u32,
    entry_size: u64,
    block_size_bits: u32,
}

impl BTreeContext {
    /// Creates a context for records of `entry_size` words.
    pub const fn new(max_layers: u32, entry_size: u64, block_size: BTreeBlockSize) -> Self {
        assert!(entry_size > 0, "btree entries need at least one word");
        Self {
            max_layers,
            entry_size,
            block_size_bits: block_size.bits(),
        }
    }

    /// Words per record; the first word is the key.
    pub fn entry_size(&self) -> u64 {
        self.entry_size
    }

    /// Index block width in words, and leaf block width in records.
    pub fn page_size(&self) -> u64 {
        1 << self.block_size_bits
    }

    /// Deepest index the writer will build.
    pub fn max_layers(&self) -> u32 {
        self.max_layers
    }

    /// Index layers needed for `num_entries` records: none when the data
    /// fits a single block, otherwise `ceil(log_page_size(num_entries))`.
    pub fn num_index_layers(&self, num_entries: u64) -> u32 {
        let page_size = self.page_size();
        if num_entries.saturating_mul(self.entry_size) <= page_size {
            return 0;
        }
        let mut layers = 0;
        let mut span = 1u64;
        while span < num_entries {
            span = span.saturating_mul(page_size);
            layers += 1;
        }
        layers
    }

    /// Records covered by one entry of index layer `layer`.
    pub(crate) fn layer_span(&self, layer: u32) -> u64 {
        self.page_size().saturating_pow(layer + 1)
    }

    /// Real (unpadded) entries in index layer `layer`.
    pub(crate) fn layer_entries(&self, num_entries: u64, layer: u32) -> u64 {
        num_entries.div_ceil(self.layer_span(layer))
    }

    /// Size in words of index layer `layer`, padded to whole blocks.
    pub fn index_layer_size(&self, num_entries: u64, layer: u32) -> u64 {
        let page_size = self.page_size();
        self.layer_entries(num_entries, layer).div_ceil(page_size) * page_size
    }

    /// Total words a tree of `num_entries` records occupies when written at offset 0.
    pub fn calculate_size(&self, num_entries: u64) -> Result<u64> {
        let header = super::BTreeHeader::plan(self, 0, num_entries)?;
        Ok(header.data_end(self))
    }
}
