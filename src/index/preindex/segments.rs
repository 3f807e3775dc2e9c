use std::{
    fs,
    path::{Path, PathBuf},
};

use rustc_hash::FxHashMap;
use tracing::debug;

use super::create_temp_file;
use crate::index::context::ConstructionContext;
use crate::index::journal::IndexJournal;
use crate::primitives::array::{
    count_distinct_elements, merge_arrays, ArrayOptions, CountToOffset, LongArray, LongArrayFold, LongArraySort,
    LongRead, LongWrite,
};
use crate::types::{IndexError, Result};

/// A word and its span of postings in the documents array.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WordSegment {
    /// Word identifier.
    pub word_id: u64,
    /// First posting, in words.
    pub start: u64,
    /// One past the last posting, in words.
    pub end: u64,
}

impl WordSegment {
    /// Number of postings.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    /// True when the span holds no postings.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Sorted distinct word ids and their posting counts, as two parallel files.
pub struct PreindexSegments {
    word_ids: LongArray,
    counts: LongArray,
    word_ids_file: PathBuf,
    counts_file: PathBuf,
}

impl PreindexSegments {
    /// Tallies the indexed terms of `journal` into new temporary files.
    ///
    /// Only terms with non-zero metadata count. A term repeated within a
    /// document counts once per occurrence.
    pub fn construct(journal: &dyn IndexJournal, ctx: &ConstructionContext) -> Result<Self> {
        let mut tally: FxHashMap<u64, u64> = FxHashMap::default();
        let mut cursor = journal.open_cursor()?;
        while cursor.next_document()? {
            for term in cursor.terms() {
                if term.metadata != 0 {
                    *tally.entry(term.term_id).or_insert(0) += 1;
                }
            }
        }
        drop(cursor);

        let word_ids_file = create_temp_file(ctx.work_dir(), "segment_words")?;
        let counts_file = create_temp_file(ctx.work_dir(), "segment_counts")?;
        let len = tally.len() as u64;
        let options = ctx.array_options();

        let mut word_ids = LongArray::map_for_writing(&word_ids_file, len, options)?;
        for (i, &word_id) in tally.keys().enumerate() {
            word_ids.set(i as u64, word_id);
        }
        word_ids.sort(0, len);

        let mut counts = LongArray::map_for_writing(&counts_file, len, options)?;
        for i in 0..len {
            let count = tally
                .get(&word_ids.get(i))
                .copied()
                .ok_or_else(|| IndexError::Invariant(format!("word {} lost while sorting", word_ids.get(i))))?;
            counts.set(i, count);
        }
        debug!(words = len, "preindex.segments.constructed");

        Ok(Self {
            word_ids,
            counts,
            word_ids_file,
            counts_file,
        })
    }

    /// Creates zero-count segments over the union of two segment sets' words.
    pub(crate) fn merged(ctx: &ConstructionContext, left: &Self, right: &Self) -> Result<Self> {
        let (l, r) = (left.word_ids.len(), right.word_ids.len());
        let len = count_distinct_elements(&left.word_ids, 0..l, &right.word_ids, 0..r);

        let word_ids_file = create_temp_file(ctx.work_dir(), "segment_words")?;
        let counts_file = create_temp_file(ctx.work_dir(), "segment_counts")?;
        let options = ctx.array_options();

        let mut word_ids = LongArray::map_for_writing(&word_ids_file, len, options)?;
        merge_arrays(&mut word_ids, 0, &left.word_ids, 0..l, &right.word_ids, 0..r);
        let counts = LongArray::map_for_writing(&counts_file, len, options)?;

        Ok(Self {
            word_ids,
            counts,
            word_ids_file,
            counts_file,
        })
    }

    /// Reopens segments written earlier.
    pub fn open(word_ids_file: PathBuf, counts_file: PathBuf, options: &ArrayOptions) -> Result<Self> {
        let word_ids = LongArray::map_read_write(&word_ids_file, options)?;
        let counts = LongArray::map_read_write(&counts_file, options)?;
        if word_ids.len() != counts.len() {
            return Err(IndexError::Corruption("segment word and count files differ in length"));
        }
        Ok(Self {
            word_ids,
            counts,
            word_ids_file,
            counts_file,
        })
    }

    /// Number of distinct words.
    pub fn len(&self) -> u64 {
        self.word_ids.len()
    }

    /// True when no word has postings.
    pub fn is_empty(&self) -> bool {
        self.word_ids.is_empty()
    }

    /// Sorted word ids.
    pub fn word_ids(&self) -> &LongArray {
        &self.word_ids
    }

    /// Posting counts, parallel to [`PreindexSegments::word_ids`].
    pub fn counts(&self) -> &LongArray {
        &self.counts
    }

    /// Sum of all counts, the length of the documents array.
    pub fn total_size(&self) -> u64 {
        self.counts.fold(0u64, 0, self.counts.len(), |acc, _, count| acc + count)
    }

    /// Word segments in ascending word order with consecutive spans.
    pub fn iter(&self) -> SegmentIter<'_> {
        SegmentIter {
            segments: self,
            index: 0,
            offsets: CountToOffset::default(),
        }
    }

    /// Cursor assigning consecutive spans while the counts are written.
    pub(crate) fn construction_cursor(&mut self) -> SegmentConstructionCursor<'_> {
        SegmentConstructionCursor {
            segments: self,
            index: 0,
            start: 0,
        }
    }

    /// Backing files: word ids, then counts.
    pub fn files(&self) -> (&Path, &Path) {
        (&self.word_ids_file, &self.counts_file)
    }

    /// Flushes both files.
    pub fn force(&self) -> Result<()> {
        self.word_ids.force()?;
        self.counts.force()
    }

    /// Unmaps and removes both files.
    pub fn delete(self) -> Result<()> {
        let Self {
            word_ids,
            counts,
            word_ids_file,
            counts_file,
        } = self;
        drop(word_ids);
        drop(counts);
        fs::remove_file(word_ids_file)?;
        fs::remove_file(counts_file)?;
        Ok(())
    }

    pub(crate) fn into_files(self) -> Result<(PathBuf, PathBuf)> {
        self.force()?;
        Ok((self.word_ids_file, self.counts_file))
    }
}

/// Iterator over [`WordSegment`]s.
pub struct SegmentIter<'a> {
    segments: &'a PreindexSegments,
    index: u64,
    offsets: CountToOffset,
}

impl Iterator for SegmentIter<'_> {
    type Item = WordSegment;

    fn next(&mut self) -> Option<WordSegment> {
        if self.index >= self.segments.len() {
            return None;
        }
        let count = self.segments.counts.get(self.index);
        let end = self.offsets.apply(self.index, count);
        let segment = WordSegment {
            word_id: self.segments.word_ids.get(self.index),
            start: end - count,
            end,
        };
        self.index += 1;
        Some(segment)
    }
}

/// Walks the words of segments under construction, recording each word's
/// posting count as its span is filled.
pub(crate) struct SegmentConstructionCursor<'a> {
    segments: &'a mut PreindexSegments,
    index: u64,
    start: u64,
}

impl SegmentConstructionCursor<'_> {
    /// Word whose span is filled next.
    pub fn word_id(&self) -> u64 {
        self.segments.word_ids.get(self.index)
    }

    /// Start of the next span.
    pub fn start(&self) -> u64 {
        self.start
    }

    /// True while words remain without a span.
    pub fn can_put_more(&self) -> bool {
        self.index < self.segments.len()
    }

    /// Records `size` postings for the current word and moves to the next.
    /// Returns [`SegmentConstructionCursor::can_put_more`].
    pub fn put_next(&mut self, size: u64) -> bool {
        self.segments.counts.set(self.index, size);
        self.start += size;
        self.index += 1;
        self.can_put_more()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::journal::{InMemoryJournal, JournalTerm};
    use tempfile::tempdir;

    fn context(dir: &Path) -> ConstructionContext {
        ConstructionContext::with_threads(dir, 2).unwrap()
    }

    #[test]
    fn counts_only_flagged_terms() -> Result<()> {
        let dir = tempdir()?;
        let ctx = context(dir.path());
        let mut journal = InMemoryJournal::default();
        journal.push(1, vec![JournalTerm::new(30, 1), JournalTerm::new(10, 1), JournalTerm::new(20, 0)]);
        journal.push(2, vec![JournalTerm::new(10, 4), JournalTerm::new(10, 4)]);
        journal.push(3, vec![JournalTerm::new(5, 2)]);

        let segments = PreindexSegments::construct(&journal, &ctx)?;
        let found: Vec<_> = segments.iter().collect();
        assert_eq!(
            found,
            vec![
                WordSegment { word_id: 5, start: 0, end: 1 },
                WordSegment { word_id: 10, start: 1, end: 4 },
                WordSegment { word_id: 30, start: 4, end: 5 },
            ]
        );
        assert_eq!(segments.total_size(), 5);
        Ok(())
    }

    #[test]
    fn empty_journal_has_no_segments() -> Result<()> {
        let dir = tempdir()?;
        let segments = PreindexSegments::construct(&InMemoryJournal::default(), &context(dir.path()))?;
        assert!(segments.is_empty());
        assert_eq!(segments.iter().count(), 0);
        segments.delete()?;
        Ok(())
    }

    #[test]
    fn construction_cursor_assigns_consecutive_spans() -> Result<()> {
        let dir = tempdir()?;
        let ctx = context(dir.path());
        let mut a = InMemoryJournal::default();
        a.push(1, vec![JournalTerm::new(1, 1), JournalTerm::new(3, 1)]);
        let mut b = InMemoryJournal::default();
        b.push(2, vec![JournalTerm::new(2, 1), JournalTerm::new(3, 1)]);
        let left = PreindexSegments::construct(&a, &ctx)?;
        let right = PreindexSegments::construct(&b, &ctx)?;

        let mut merged = PreindexSegments::merged(&ctx, &left, &right)?;
        assert_eq!(merged.len(), 3);
        {
            let mut cursor = merged.construction_cursor();
            assert_eq!(cursor.word_id(), 1);
            assert!(cursor.put_next(4));
            assert_eq!(cursor.start(), 4);
            assert_eq!(cursor.word_id(), 2);
            assert!(cursor.put_next(1));
            assert!(!cursor.put_next(2));
        }
        let spans: Vec<_> = merged.iter().map(|s| (s.word_id, s.start, s.end)).collect();
        assert_eq!(spans, vec![(1, 0, 4), (2, 4, 5), (3, 5, 7)]);
        Ok(())
    }
}
