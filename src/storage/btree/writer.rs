use tracing::error;

use super::{BTreeContext, BTreeHeader};
use crate::primitives::array::{LongArraySearch, LongArrayTransform, LongRangeMut, LongRead, LongWrite};
use crate::types::{IndexError, Result};

/// Sentinel stamped over the data block before the fill callback runs.
const DOG_EAR: u64 = 0x5EA1_ED0D_06EA_12ED;

/// Sampled positions stamped with [`DOG_EAR`].
struct DogEar {
    positions: Vec<u64>,
}

impl DogEar {
    fn stamp<A: LongWrite + ?Sized>(slice: &mut A) -> Self {
        let len = slice.len();
        let stride = (len / 16).max(1);
        let mut positions: Vec<u64> = (0..len).step_by(stride as usize).collect();
        if len > 0 && positions.last() != Some(&(len - 1)) {
            positions.push(len - 1);
        }
        for &pos in &positions {
            slice.set(pos, DOG_EAR);
        }
        Self { positions }
    }

    fn untouched<A: LongArraySearch + ?Sized>(&self, slice: &A) -> Option<u64> {
        self.positions.iter().copied().find(|&pos| slice.get(pos) == DOG_EAR)
    }
}

/// Builds a static B-tree inside a word array.
pub struct BTreeWriter<'a, A: LongWrite + ?Sized> {
    map: &'a mut A,
    ctx: BTreeContext,
    verify: bool,
}

impl<'a, A: LongWrite + ?Sized> BTreeWriter<'a, A> {
    /// Creates a writer over `map`. Data block checks are on in debug builds.
    pub fn new(map: &'a mut A, ctx: BTreeContext) -> Self {
        Self {
            map,
            ctx,
            verify: cfg!(debug_assertions),
        }
    }

    /// Turns the post-fill data block checks on or off.
    pub fn with_verification(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Writes a tree of `num_entries` records at `offset`.
    ///
    /// `fill` receives the data block as a zero-based view and must store the
    /// records sorted ascending by key. The index layers are derived from it
    /// afterwards. Returns the words written from `offset` to the end of the
    /// data block.
    pub fn write<F>(&mut self, offset: u64, num_entries: u64, fill: F) -> Result<u64>
    where
        F: FnOnce(&mut LongRangeMut<'_, A>) -> Result<()>,
    {
        let header = BTreeHeader::plan(&self.ctx, offset, num_entries)?;
        let data_end = header.data_end(&self.ctx);
        if data_end > self.map.len() {
            return Err(IndexError::Invalid("btree does not fit in the target array"));
        }
        header.write(&mut *self.map, offset);

        {
            let mut slice = self.map.range_mut(header.data_offset, data_end);
            let dog_ear = self.verify.then(|| DogEar::stamp(&mut slice));
            fill(&mut slice)?;
            if let Some(dog_ear) = dog_ear {
                if let Some(pos) = dog_ear.untouched(&slice) {
                    error!(position = pos, header = ?header, "btree.write.dog_ear");
                    return Err(IndexError::Corruption("btree data block was not fully written"));
                }
                if !slice.is_sorted_n(self.ctx.entry_size(), 0, slice.len()) {
                    error!(header = ?header, "btree.write.unsorted");
                    return Err(IndexError::Corruption("btree data block is not sorted"));
                }
            }
        }

        self.write_index(&header);
        Ok(data_end - offset)
    }

    fn write_index(&mut self, header: &BTreeHeader) {
        let ctx = self.ctx;
        let entry_size = ctx.entry_size();
        for (layer, &layer_start) in header.layer_offsets(&ctx).iter().enumerate() {
            let layer = layer as u32;
            let span = ctx.layer_span(layer);
            let entries = ctx.layer_entries(header.num_entries, layer);
            for i in 0..entries {
                let last = ((i + 1).saturating_mul(span)).min(header.num_entries) - 1;
                let key = self.map.get(header.data_offset + last * entry_size);
                self.map.set(layer_start + i, key);
            }
            let layer_end = layer_start + ctx.index_layer_size(header.num_entries, layer);
            self.map.fill(layer_start + entries, layer_end, u64::MAX);
        }
    }
}
