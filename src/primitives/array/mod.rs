
//! Word arrays backed by heap memory or memory-mapped files.
//!
//! Algorithms are written once against the [`LongRead`] / [`LongWrite`]
//! capability traits and apply equally to a [`LongArray`], to a range view
//! of one, or to a plain `[u64]`. A [`LongArray`] picks its backend when it
//! is created: a single heap buffer or mapping when the requested size fits
//! under [`ArrayOptions::max_single_words`], otherwise a sequence of
//! fixed-size pages. Nothing outside this module observes the difference.

mod buffer;
mod map;
mod merge;
mod search;
mod sort;
mod transform;

use std::{
    fs::{File, OpenOptions},
    io::{BufWriter, Write},
    path::Path,
};

use crate::primitives::io::FileIo;
use crate::types::{words_to_bytes, words_to_usize, IndexError, Result, WORD_BYTES};

use self::map::MappedWords;

pub use buffer::LongQueryBuffer;
pub use merge::{count_distinct_elements, count_distinct_elements_n, merge_arrays, merge_arrays_n};
pub use search::{decode_search_miss, encode_search_miss, LongArraySearch, LINEAR_SEARCH_CUTOFF};
pub use sort::{LongArraySort, SortingContext, QUICKSORT_CUTOFF};
pub use transform::{CountToOffset, LongArrayFold, LongArrayTransform};

/// Brings every array capability trait into scope.
pub mod prelude {
    pub use super::{
        LongArrayFold, LongArraySearch, LongArraySort, LongArrayTransform, LongRead, LongWrite,
    };
}

/// Mapped pages must start on a multiple of this many words (64 KiB), the
/// coarsest mapping granularity of supported platforms.
pub const MAP_GRANULE_WORDS: u64 = 8192;

/// Read access to a fixed-length sequence of words.
pub trait LongRead {
    /// Number of words.
    fn len(&self) -> u64;

    /// Returns the word at `index`. Panics when `index >= len()`.
    fn get(&self, index: u64) -> u64;

    /// Returns true when the sequence holds no words.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Contiguous view of `[start, end)` when the storage holds it in one piece.
    fn as_slice(&self, _start: u64, _end: u64) -> Option<&[u64]> {
        None
    }

    /// Zero-copy view of `[start, end)`.
    fn range(&self, start: u64, end: u64) -> LongRange<'_, Self> {
        LongRange::new(self, start, end)
    }
}

/// Write access to a fixed-length sequence of words.
pub trait LongWrite: LongRead {
    /// Stores `value` at `index`. Panics when `index >= len()`.
    fn set(&mut self, index: u64, value: u64);

    /// Contiguous mutable view of `[start, end)` when the storage holds it in one piece.
    fn as_mut_slice(&mut self, _start: u64, _end: u64) -> Option<&mut [u64]> {
        None
    }

    /// Zero-copy mutable view of `[start, end)`.
    fn range_mut(&mut self, start: u64, end: u64) -> LongRangeMut<'_, Self> {
        LongRangeMut::new(self, start, end)
    }
}

fn check_range(start: u64, end: u64, len: u64) {
    assert!(
        start <= end && end <= len,
        "range {start}..{end} out of bounds for length {len}"
    );
}

impl LongRead for [u64] {
    fn len(&self) -> u64 {
        <[u64]>::len(self) as u64
    }

    fn get(&self, index: u64) -> u64 {
        self[index as usize]
    }

    fn as_slice(&self, start: u64, end: u64) -> Option<&[u64]> {
        Some(&self[start as usize..end as usize])
    }
}

impl LongWrite for [u64] {
    fn set(&mut self, index: u64, value: u64) {
        self[index as usize] = value;
    }

    fn as_mut_slice(&mut self, start: u64, end: u64) -> Option<&mut [u64]> {
        Some(&mut self[start as usize..end as usize])
    }
}

/// Read-only view of a subrange of another array.
pub struct LongRange<'a, A: LongRead + ?Sized> {
    inner: &'a A,
    start: u64,
    end: u64,
}

impl<'a, A: LongRead + ?Sized> LongRange<'a, A> {
    /// Creates a view of `inner[start..end]`.
    pub fn new(inner: &'a A, start: u64, end: u64) -> Self {
        check_range(start, end, inner.len());
        Self { inner, start, end }
    }

    /// Offset of the view's first word within the parent.
    pub fn base(&self) -> u64 {
        self.start
    }
}

impl<A: LongRead + ?Sized> LongRead for LongRange<'_, A> {
    fn len(&self) -> u64 {
        self.end - self.start
    }

    fn get(&self, index: u64) -> u64 {
        assert!(index < self.len(), "index {index} out of bounds for range view");
        self.inner.get(self.start + index)
    }

    fn as_slice(&self, start: u64, end: u64) -> Option<&[u64]> {
        check_range(start, end, self.len());
        self.inner.as_slice(self.start + start, self.start + end)
    }
}

/// Mutable view of a subrange of another array.
pub struct LongRangeMut<'a, A: LongWrite + ?Sized> {
    inner: &'a mut A,
    start: u64,
    end: u64,
}

impl<'a, A: LongWrite + ?Sized> LongRangeMut<'a, A> {
    /// Creates a mutable view of `inner[start..end]`.
    pub fn new(inner: &'a mut A, start: u64, end: u64) -> Self {
        check_range(start, end, inner.len());
        Self { inner, start, end }
    }
}

impl<A: LongWrite + ?Sized> LongRead for LongRangeMut<'_, A> {
    fn len(&self) -> u64 {
        self.end - self.start
    }

    fn get(&self, index: u64) -> u64 {
        assert!(index < self.len(), "index {index} out of bounds for range view");
        self.inner.get(self.start + index)
    }

    fn as_slice(&self, start: u64, end: u64) -> Option<&[u64]> {
        check_range(start, end, self.len());
        self.inner.as_slice(self.start + start, self.start + end)
    }
}

impl<A: LongWrite + ?Sized> LongWrite for LongRangeMut<'_, A> {
    fn set(&mut self, index: u64, value: u64) {
        assert!(index < self.len(), "index {index} out of bounds for range view");
        self.inner.set(self.start + index, value);
    }

    fn as_mut_slice(&mut self, start: u64, end: u64) -> Option<&mut [u64]> {
        check_range(start, end, self.len());
        self.inner.as_mut_slice(self.start + start, self.start + end)
    }
}

/// Sizing knobs for [`LongArray`] backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArrayOptions {
    /// Largest array, in words, kept in a single buffer or mapping.
    pub max_single_words: u64,
    /// Page size, in words, for arrays above `max_single_words`. Must be a
    /// power of two and a multiple of [`MAP_GRANULE_WORDS`].
    pub page_words: u64,
}

impl Default for ArrayOptions {
    fn default() -> Self {
        Self {
            max_single_words: 1 << 28,
            page_words: 1 << 27,
        }
    }
}

impl ArrayOptions {
    /// Sets the single-region ceiling.
    pub fn with_max_single_words(mut self, words: u64) -> Self {
        self.max_single_words = words;
        self
    }

    /// Sets the page size used by paged arrays.
    pub fn with_page_words(mut self, words: u64) -> Self {
        self.page_words = words;
        self
    }

    /// Checks the page size constraints.
    pub fn validate(&self) -> Result<()> {
        if !self.page_words.is_power_of_two() || self.page_words % MAP_GRANULE_WORDS != 0 {
            return Err(IndexError::Invalid(
                "page_words must be a power of two multiple of the map granule",
            ));
        }
        if self.max_single_words == 0 {
            return Err(IndexError::Invalid("max_single_words must be positive"));
        }
        Ok(())
    }

    fn is_paged(&self, len: u64) -> bool {
        len > self.max_single_words
    }
}

enum Region {
    Heap(Box<[u64]>),
    Mapped(MappedWords),
}

impl Region {
    fn words(&self) -> &[u64] {
        match self {
            Region::Heap(words) => words,
            Region::Mapped(map) => map.words(),
        }
    }

    fn words_mut(&mut self) -> &mut [u64] {
        match self {
            Region::Heap(words) => words,
            Region::Mapped(map) => map.words_mut(),
        }
    }

    fn heap(words: u64) -> Result<Self> {
        Ok(Region::Heap(vec![0u64; words_to_usize(words)?].into_boxed_slice()))
    }

    fn map(file: &File, byte_offset: u64, words: u64, writable: bool) -> Result<Self> {
        if words == 0 {
            return Self::heap(0);
        }
        let map = if writable {
            MappedWords::read_write(file, byte_offset, words)?
        } else {
            MappedWords::read_only(file, byte_offset, words)?
        };
        Ok(Region::Mapped(map))
    }
}

enum Storage {
    Single(Region),
    Paged {
        shift: u32,
        mask: u64,
        pages: Vec<Region>,
    },
}

/// An owned, fixed-length array of words.
pub struct LongArray {
    storage: Storage,
    len: u64,
}

impl std::fmt::Debug for LongArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LongArray")
            .field("len", &self.len)
            .field("pages", &self.page_count())
            .field("mapped", &self.is_mapped())
            .finish()
    }
}

impl LongArray {
    /// Allocates a zeroed heap array of `len` words.
    pub fn allocate(len: u64, options: &ArrayOptions) -> Result<Self> {
        if !options.is_paged(len) {
            return Ok(Self {
                storage: Storage::Single(Region::heap(len)?),
                len,
            });
        }
        options.validate()?;
        let pages = page_spans(len, options.page_words)
            .map(|(_, words)| Region::heap(words))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::paged(pages, len, options.page_words))
    }

    /// Wraps an existing vector.
    pub fn from_vec(words: Vec<u64>) -> Self {
        let len = words.len() as u64;
        Self {
            storage: Storage::Single(Region::Heap(words.into_boxed_slice())),
            len,
        }
    }

    /// Maps an existing file read-only. The file length must be a multiple of eight.
    pub fn map_read_only(path: impl AsRef<Path>, options: &ArrayOptions) -> Result<Self> {
        let file = OpenOptions::new().read(true).open(path)?;
        let len = file_words(&file)?;
        Self::map_file(&file, len, options, false)
    }

    /// Maps an existing file for reading and writing.
    pub fn map_read_write(path: impl AsRef<Path>, options: &ArrayOptions) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file_words(&file)?;
        Self::map_file(&file, len, options, true)
    }

    /// Creates (or truncates) `path` to `len` zeroed words and maps it for writing.
    pub fn map_for_writing(path: impl AsRef<Path>, len: u64, options: &ArrayOptions) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(words_to_bytes(len)?)?;
        Self::map_file(&file, len, options, true)
    }

    fn map_file(file: &File, len: u64, options: &ArrayOptions, writable: bool) -> Result<Self> {
        if !options.is_paged(len) {
            return Ok(Self {
                storage: Storage::Single(Region::map(file, 0, len, writable)?),
                len,
            });
        }
        options.validate()?;
        let pages = page_spans(len, options.page_words)
            .map(|(start, words)| Region::map(file, start * WORD_BYTES, words, writable))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::paged(pages, len, options.page_words))
    }

    fn paged(pages: Vec<Region>, len: u64, page_words: u64) -> Self {
        Self {
            storage: Storage::Paged {
                shift: page_words.trailing_zeros(),
                mask: page_words - 1,
                pages,
            },
            len,
        }
    }

    /// Number of backing regions.
    pub fn page_count(&self) -> usize {
        match &self.storage {
            Storage::Single(_) => 1,
            Storage::Paged { pages, .. } => pages.len(),
        }
    }

    /// True when any region is a file mapping.
    pub fn is_mapped(&self) -> bool {
        self.regions().any(|region| matches!(region, Region::Mapped(_)))
    }

    fn regions(&self) -> impl Iterator<Item = &Region> {
        let slice: &[Region] = match &self.storage {
            Storage::Single(region) => std::slice::from_ref(region),
            Storage::Paged { pages, .. } => pages,
        };
        slice.iter()
    }

    fn regions_mut(&mut self) -> impl Iterator<Item = &mut [u64]> {
        let slice: &mut [Region] = match &mut self.storage {
            Storage::Single(region) => std::slice::from_mut(region),
            Storage::Paged { pages, .. } => pages,
        };
        slice.iter_mut().map(Region::words_mut)
    }

    /// Flushes mapped regions to their files. A no-op for heap storage.
    pub fn force(&self) -> Result<()> {
        for region in self.regions() {
            if let Region::Mapped(map) = region {
                map.flush()?;
            }
        }
        Ok(())
    }

    /// Hints the OS that mapped regions will be accessed randomly.
    pub fn advise_random(&self) -> Result<()> {
        for region in self.regions() {
            if let Region::Mapped(map) = region {
                map.advise_random()?;
            }
        }
        Ok(())
    }

    /// True unless some region is a read-only mapping.
    pub fn is_writable(&self) -> bool {
        self.regions().all(|region| match region {
            Region::Heap(_) => true,
            Region::Mapped(map) => map.is_writable(),
        })
    }

    /// Runs `f` over each contiguous piece of `[start, end)`, passing the
    /// piece's absolute start offset.
    fn for_each_chunk_mut<F>(&mut self, start: u64, end: u64, mut f: F) -> Result<()>
    where
        F: FnMut(u64, &mut [u64]) -> Result<()>,
    {
        check_range(start, end, self.len);
        let mut base = 0u64;
        for words in self.regions_mut() {
            let region_end = base + words.len() as u64;
            let lo = start.max(base);
            let hi = end.min(region_end);
            if lo < hi {
                f(lo, &mut words[(lo - base) as usize..(hi - base) as usize])?;
            }
            base = region_end;
            if base >= end {
                break;
            }
        }
        Ok(())
    }

    fn for_each_chunk<F>(&self, start: u64, end: u64, mut f: F) -> Result<()>
    where
        F: FnMut(u64, &[u64]) -> Result<()>,
    {
        check_range(start, end, self.len);
        let mut base = 0u64;
        for region in self.regions() {
            let words = region.words();
            let region_end = base + words.len() as u64;
            let lo = start.max(base);
            let hi = end.min(region_end);
            if lo < hi {
                f(lo, &words[(lo - base) as usize..(hi - base) as usize])?;
            }
            base = region_end;
            if base >= end {
                break;
            }
        }
        Ok(())
    }

    /// Fills `[dst_start, dst_end)` with words read from `src` starting at
    /// word offset `src_offset`.
    pub fn transfer_from(
        &mut self,
        src: &dyn FileIo,
        src_offset: u64,
        dst_start: u64,
        dst_end: u64,
    ) -> Result<()> {
        self.for_each_chunk_mut(dst_start, dst_end, |chunk_start, chunk| {
            src.read_words_at(src_offset + (chunk_start - dst_start), chunk)
        })
    }

    /// Writes every word of the array to `path`, replacing its contents.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        let mut out = BufWriter::new(file);
        self.for_each_chunk(0, self.len, |_, chunk| {
            out.write_all(bytemuck::cast_slice(chunk))?;
            Ok(())
        })?;
        out.flush()?;
        Ok(())
    }

    /// Splits the array into disjoint mutable slices, one per span.
    ///
    /// Spans must be ascending and non-overlapping. Spans that straddle a
    /// page boundary cannot be handed out as one slice; they are returned
    /// separately for the caller to process through the array itself once
    /// the slices are released. Empty spans are skipped.
    pub fn split_spans_mut(&mut self, spans: &[(u64, u64)]) -> (Vec<&mut [u64]>, Vec<(u64, u64)>) {
        let len = self.len;
        let mut slices = Vec::with_capacity(spans.len());
        let mut straddling = Vec::new();
        let mut regions = self.regions_mut();
        let mut rest: &mut [u64] = &mut [];
        let mut rest_base = 0u64;
        let mut region_end = 0u64;
        let mut previous_end = 0u64;
        for &(start, end) in spans {
            check_range(start, end, len);
            assert!(start >= previous_end, "spans must be ascending and disjoint");
            previous_end = end;
            if start == end {
                continue;
            }
            while start >= region_end {
                let Some(words) = regions.next() else {
                    break;
                };
                rest_base = region_end;
                region_end += words.len() as u64;
                rest = words;
            }
            if end > region_end {
                straddling.push((start, end));
                continue;
            }
            let tail = std::mem::take(&mut rest);
            let (_, tail) = tail.split_at_mut((start - rest_base) as usize);
            let (piece, tail) = tail.split_at_mut((end - start) as usize);
            slices.push(piece);
            rest = tail;
            rest_base = end;
        }
        (slices, straddling)
    }
}

fn file_words(file: &File) -> Result<u64> {
    let bytes = file.metadata()?.len();
    if bytes % WORD_BYTES != 0 {
        return Err(IndexError::Corruption("file length is not a whole number of words"));
    }
    Ok(bytes / WORD_BYTES)
}

/// Yields `(first_word, words)` for each page of a paged array.
fn page_spans(len: u64, page_words: u64) -> impl Iterator<Item = (u64, u64)> {
    (0..len.div_ceil(page_words)).map(move |page| {
        let start = page * page_words;
        (start, page_words.min(len - start))
    })
}

impl LongRead for LongArray {
    fn len(&self) -> u64 {
        self.len
    }

    #[inline]
    fn get(&self, index: u64) -> u64 {
        assert!(index < self.len, "index {index} out of bounds for length {}", self.len);
        match &self.storage {
            Storage::Single(region) => region.words()[index as usize],
            Storage::Paged { shift, mask, pages } => {
                pages[(index >> shift) as usize].words()[(index & mask) as usize]
            }
        }
    }

    fn as_slice(&self, start: u64, end: u64) -> Option<&[u64]> {
        check_range(start, end, self.len);
        match &self.storage {
            Storage::Single(region) => Some(&region.words()[start as usize..end as usize]),
            Storage::Paged { shift, mask, pages } => {
                if start == end {
                    return Some(&[]);
                }
                let page = start >> shift;
                if (end - 1) >> shift != page {
                    return None;
                }
                let lo = (start & mask) as usize;
                Some(&pages[page as usize].words()[lo..lo + (end - start) as usize])
            }
        }
    }
}

impl LongWrite for LongArray {
    #[inline]
    fn set(&mut self, index: u64, value: u64) {
        assert!(index < self.len, "index {index} out of bounds for length {}", self.len);
        match &mut self.storage {
            Storage::Single(region) => region.words_mut()[index as usize] = value,
            Storage::Paged { shift, mask, pages } => {
                pages[(index >> *shift) as usize].words_mut()[(index & *mask) as usize] = value
            }
        }
    }

    fn as_mut_slice(&mut self, start: u64, end: u64) -> Option<&mut [u64]> {
        check_range(start, end, self.len);
        match &mut self.storage {
            Storage::Single(region) => Some(&mut region.words_mut()[start as usize..end as usize]),
            Storage::Paged { shift, mask, pages } => {
                if start == end {
                    return Some(&mut []);
                }
                let page = start >> *shift;
                if (end - 1) >> *shift != page {
                    return None;
                }
                let lo = (start & *mask) as usize;
                Some(&mut pages[page as usize].words_mut()[lo..lo + (end - start) as usize])
            }
        }
    }
}
