#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};

use tracing::debug;

use super::{ArrayOptions, LongArray, LongArrayTransform, LongRead, LongWrite};
use crate::types::Result;

/// Spans of at most this many records are insertion sorted.
pub const QUICKSORT_CUTOFF: u64 = 8;

/// Where and how large spans are sorted.
#[derive(Clone, Debug)]
pub struct SortingContext {
    temp_dir: PathBuf,
    memory_sort_limit: u64,
}

impl SortingContext {
    /// Creates a context spilling into `temp_dir` once a span exceeds
    /// `memory_sort_limit` words.
    pub fn new(temp_dir: impl Into<PathBuf>, memory_sort_limit: u64) -> Self {
        Self {
            temp_dir: temp_dir.into(),
            memory_sort_limit: memory_sort_limit.max(1),
        }
    }

    /// Directory receiving merge sort scratch files.
    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Largest span, in words, sorted entirely in memory.
    pub fn memory_sort_limit(&self) -> u64 {
        self.memory_sort_limit
    }
}

/// In-place sorting over word sequences.
///
/// Records of `sz` words are ordered by their first word and moved as a
/// unit. Ranges passed to the `_n` variants must hold a whole number of
/// records.
pub trait LongArraySort: LongWrite {
    /// Swaps two words.
    fn swap(&mut self, a: u64, b: u64) {
        let tmp = self.get(a);
        self.set(a, self.get(b));
        self.set(b, tmp);
    }

    /// Swaps the `sz`-word records starting at `a` and `b`.
    fn swap_n(&mut self, sz: u64, a: u64, b: u64) {
        for i in 0..sz {
            self.swap(a + i, b + i);
        }
    }

    /// Sorts `[start, end)`.
    fn sort(&mut self, start: u64, end: u64) {
        self.quick_sort_n(1, start, end)
    }

    /// Insertion sort over `[start, end)`.
    fn insertion_sort(&mut self, start: u64, end: u64) {
        self.insertion_sort_n(1, start, end)
    }

    /// Insertion sort over the records in `[start, end)`.
    fn insertion_sort_n(&mut self, sz: u64, start: u64, end: u64) {
        let mut i = start + sz;
        while i < end {
            let mut j = i;
            while j > start && self.get(j - sz) > self.get(j) {
                self.swap_n(sz, j - sz, j);
                j -= sz;
            }
            i += sz;
        }
    }

    /// Quicksort over `[start, end)`.
    fn quick_sort(&mut self, start: u64, end: u64) {
        self.quick_sort_n(1, start, end)
    }

    /// Quicksort over the records in `[start, end)`.
    fn quick_sort_n(&mut self, sz: u64, start: u64, end: u64) {
        if end < start + 2 * sz {
            return;
        }
        let mut low = start;
        let mut high = end - sz;
        loop {
            if (high - low) / sz < QUICKSORT_CUTOFF {
                self.insertion_sort_n(sz, low, high + sz);
                return;
            }
            let split = partition_n(self, sz, low, high);
            // recurse into the smaller side to bound stack depth
            if split - low < high - split {
                self.quick_sort_n(sz, low, split + sz);
                low = split + sz;
            } else {
                self.quick_sort_n(sz, split + sz, high + sz);
                high = split;
            }
        }
    }

    /// Merge sort over `[start, end)`.
    fn merge_sort(&mut self, start: u64, end: u64, ctx: &SortingContext) -> Result<()> {
        self.merge_sort_n(1, start, end, ctx)
    }

    /// Bottom-up merge sort over the records in `[start, end)`.
    ///
    /// Runs of up to `memory_sort_limit` words are quicksorted first. The
    /// scratch buffer lives on the heap when the span fits the memory limit
    /// and in a temporary file under `temp_dir` otherwise.
    fn merge_sort_n(&mut self, sz: u64, start: u64, end: u64, ctx: &SortingContext) -> Result<()> {
        let len = end - start;
        if len <= sz {
            return Ok(());
        }
        let run = (ctx.memory_sort_limit() / sz).max(QUICKSORT_CUTOFF) * sz;
        let mut run_start = start;
        while run_start < end {
            let run_end = (run_start + run).min(end);
            self.quick_sort_n(sz, run_start, run_end);
            run_start = run_end;
        }
        if run >= len {
            return Ok(());
        }

        let spill = if len > ctx.memory_sort_limit() {
            Some(
                tempfile::Builder::new()
                    .prefix("sort-")
                    .suffix(".dat")
                    .tempfile_in(ctx.temp_dir())?,
            )
        } else {
            None
        };
        let mut scratch = match &spill {
            Some(file) => {
                debug!(words = len, path = %file.path().display(), "array.sort.spill");
                LongArray::map_for_writing(file.path(), len, &ArrayOptions::default())?
            }
            None => LongArray::allocate(len, &ArrayOptions::default())?,
        };

        let mut width = run;
        while width < len {
            let mut left = start;
            while left < end {
                let mid = (left + width).min(end);
                let right = (left + 2 * width).min(end);
                merge_runs(self, &mut scratch, sz, left, mid, right, left - start);
                left = right;
            }
            self.copy_from(&scratch, 0, start, len);
            width *= 2;
        }
        drop(scratch);
        drop(spill);
        Ok(())
    }

    /// Sorts a span that may be too large for memory.
    fn sort_large_span(&mut self, ctx: &SortingContext, start: u64, end: u64) -> Result<()> {
        self.sort_large_span_n(ctx, 1, start, end)
    }

    /// Quicksorts spans under the context's memory limit, merge sorts the rest.
    fn sort_large_span_n(&mut self, ctx: &SortingContext, sz: u64, start: u64, end: u64) -> Result<()> {
        if end - start < ctx.memory_sort_limit() {
            self.quick_sort_n(sz, start, end);
            Ok(())
        } else {
            self.merge_sort_n(sz, start, end, ctx)
        }
    }
}

impl<T: LongWrite + ?Sized> LongArraySort for T {}

/// Hoare partition of the records in `[low, high]` (inclusive) around the
/// middle record's key. Returns `split` with `low <= split < high`; every key
/// in `[low, split]` is at most every key in `[split + sz, high]`.
fn partition_n<A: LongArraySort + ?Sized>(array: &mut A, sz: u64, low: u64, high: u64) -> u64 {
    let pivot = array.get(low + ((high - low) / (2 * sz)) * sz);
    let mut i = low;
    let mut j = high;
    loop {
        while array.get(i) < pivot {
            i += sz;
        }
        while array.get(j) > pivot {
            j -= sz;
        }
        if i >= j {
            return j;
        }
        array.swap_n(sz, i, j);
        i += sz;
        j -= sz;
    }
}

/// Merges the sorted record runs `[left, mid)` and `[mid, right)` of `src`
/// into `dst` starting at `dst_start`.
fn merge_runs<S, D>(src: &S, dst: &mut D, sz: u64, left: u64, mid: u64, right: u64, dst_start: u64)
where
    S: LongRead + ?Sized,
    D: LongWrite + ?Sized,
{
    let mut a = left;
    let mut b = mid;
    let mut out = dst_start;
    while a < mid || b < right {
        let take_left = b >= right || (a < mid && src.get(a) <= src.get(b));
        let from = if take_left { a } else { b };
        for i in 0..sz {
            dst.set(out + i, src.get(from + i));
        }
        out += sz;
        if take_left {
            a += sz;
        } else {
            b += sz;
        }
    }
}
