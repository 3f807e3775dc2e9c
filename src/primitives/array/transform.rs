#![forbid(unsafe_code)]

use super::{LongRead, LongWrite};
use crate::types::Result;

/// Sequential visits over a word range.
pub trait LongArrayFold: LongRead {
    /// Calls `f(index, value)` for each word in `[start, end)`.
    fn for_each<F>(&self, start: u64, end: u64, mut f: F)
    where
        F: FnMut(u64, u64),
    {
        for index in start..end {
            f(index, self.get(index));
        }
    }

    /// Folds `f(acc, index, value)` over `[start, end)`.
    fn fold<B, F>(&self, zero: B, start: u64, end: u64, mut f: F) -> B
    where
        F: FnMut(B, u64, u64) -> B,
    {
        let mut acc = zero;
        for index in start..end {
            acc = f(acc, index, self.get(index));
        }
        acc
    }
}

impl<T: LongRead + ?Sized> LongArrayFold for T {}

/// In-place rewrites of a word range.
pub trait LongArrayTransform: LongWrite {
    /// Sets every word in `[start, end)` to `value`.
    fn fill(&mut self, start: u64, end: u64, value: u64) {
        if let Some(slice) = self.as_mut_slice(start, end) {
            slice.fill(value);
            return;
        }
        for index in start..end {
            self.set(index, value);
        }
    }

    /// Replaces each word with `f(index, value)`.
    fn transform_each<F>(&mut self, start: u64, end: u64, mut f: F)
    where
        F: FnMut(u64, u64) -> u64,
    {
        for index in start..end {
            let value = self.get(index);
            self.set(index, f(index, value));
        }
    }

    /// Fallible form of [`LongArrayTransform::transform_each`]; stops at the first error.
    fn try_transform_each<F>(&mut self, start: u64, end: u64, mut f: F) -> Result<()>
    where
        F: FnMut(u64, u64) -> Result<u64>,
    {
        for index in start..end {
            let value = self.get(index);
            self.set(index, f(index, value)?);
        }
        Ok(())
    }

    /// Copies `len` words from `src[src_start..]` into `self[dst_start..]`.
    fn copy_from<S>(&mut self, src: &S, src_start: u64, dst_start: u64, len: u64)
    where
        S: LongRead + ?Sized,
    {
        if let (Some(from), Some(to)) = (
            src.as_slice(src_start, src_start + len),
            self.as_mut_slice(dst_start, dst_start + len),
        ) {
            to.copy_from_slice(from);
            return;
        }
        for i in 0..len {
            self.set(dst_start + i, src.get(src_start + i));
        }
    }
}

impl<T: LongWrite + ?Sized> LongArrayTransform for T {}

/// Rewrites per-term counts into running end offsets: after the transform,
/// word `i` holds the sum of counts `0..=i`.
#[derive(Debug, Default)]
pub struct CountToOffset {
    offset: u64,
}

impl CountToOffset {
    /// Applies the transform to one count.
    pub fn apply(&mut self, _index: u64, count: u64) -> u64 {
        self.offset += count;
        self.offset
    }
}
