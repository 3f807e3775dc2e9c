use std::{
    fs,
    path::{Path, PathBuf},
};

use rayon::prelude::*;
use rustc_hash::FxHashMap;
use tracing::{debug, error};

use super::create_temp_file;
use super::segments::PreindexSegments;
use crate::index::context::ConstructionContext;
use crate::index::journal::IndexJournal;
use crate::index::rewriter::DocIdRewriter;
use crate::primitives::array::{ArrayOptions, LongArray, LongArraySort, LongRead, LongWrite};
use crate::types::{IndexError, Result};

/// Next free slot and end of one word's span during the scatter pass.
struct SpanCursor {
    next: u64,
    end: u64,
}

impl SpanCursor {
    /// Returns the slot to fill, then advances.
    fn claim(&mut self) -> Option<u64> {
        if self.next >= self.end {
            return None;
        }
        let slot = self.next;
        self.next += 1;
        Some(slot)
    }
}

/// Rewritten document ids grouped into per-word spans, each span sorted.
pub struct PreindexDocuments {
    documents: LongArray,
    file: PathBuf,
}

impl PreindexDocuments {
    /// Scatters the postings of `journal` into the spans laid out by
    /// `segments`, then sorts every span.
    pub fn construct(
        journal: &dyn IndexJournal,
        rewriter: &dyn DocIdRewriter,
        segments: &PreindexSegments,
        ctx: &ConstructionContext,
    ) -> Result<Self> {
        let file = create_temp_file(ctx.work_dir(), "docs")?;
        let total = segments.total_size();
        let mut documents = LongArray::map_for_writing(&file, total, ctx.array_options())?;

        let mut cursors: FxHashMap<u64, SpanCursor> = segments
            .iter()
            .map(|segment| {
                (
                    segment.word_id,
                    SpanCursor {
                        next: segment.start,
                        end: segment.end,
                    },
                )
            })
            .collect();

        let mut journal_cursor = journal.open_cursor()?;
        while journal_cursor.next_document()? {
            let doc_id = rewriter.rewrite(journal_cursor.document_id());
            for term in journal_cursor.terms() {
                if term.metadata == 0 {
                    continue;
                }
                let slot = cursors.get_mut(&term.term_id).and_then(SpanCursor::claim);
                let Some(slot) = slot else {
                    error!(word = term.term_id, "preindex.documents.overflow");
                    return Err(IndexError::Invariant(format!(
                        "journal yielded more postings for word {} than were counted",
                        term.term_id
                    )));
                };
                documents.set(slot, doc_id);
            }
        }
        drop(journal_cursor);

        if let Some((word, _)) = cursors.iter().find(|(_, cursor)| cursor.next != cursor.end) {
            error!(word = *word, "preindex.documents.underflow");
            return Err(IndexError::Invariant(format!(
                "journal yielded fewer postings for word {word} than were counted"
            )));
        }

        let spans: Vec<(u64, u64)> = segments.iter().map(|s| (s.start, s.end)).collect();
        sort_spans(&mut documents, &spans, ctx)?;
        debug!(postings = total, spans = spans.len(), "preindex.documents.constructed");

        Ok(Self { documents, file })
    }

    /// Reopens a documents file written earlier.
    pub fn open(file: PathBuf, options: &ArrayOptions) -> Result<Self> {
        let documents = LongArray::map_read_write(&file, options)?;
        Ok(Self { documents, file })
    }

    /// Number of postings.
    pub fn len(&self) -> u64 {
        self.documents.len()
    }

    /// True when there are no postings.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// The postings.
    pub fn array(&self) -> &LongArray {
        &self.documents
    }

    /// Backing file.
    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Flushes the file.
    pub fn force(&self) -> Result<()> {
        self.documents.force()
    }

    /// Unmaps and removes the file.
    pub fn delete(self) -> Result<()> {
        let Self { documents, file } = self;
        drop(documents);
        fs::remove_file(file)?;
        Ok(())
    }

    pub(crate) fn into_file(self) -> Result<PathBuf> {
        self.force()?;
        Ok(self.file)
    }
}

/// Sorts each span of `documents` independently. Spans longer than the
/// parallel threshold are sorted on the worker pool.
fn sort_spans(documents: &mut LongArray, spans: &[(u64, u64)], ctx: &ConstructionContext) -> Result<()> {
    let threshold = ctx.parallel_sort_threshold();
    let sorting = ctx.sorting();
    let straddling = {
        let (slices, straddling) = documents.split_spans_mut(spans);
        let (large, small): (Vec<&mut [u64]>, Vec<&mut [u64]>) =
            slices.into_iter().partition(|slice| slice.len() as u64 > threshold);
        for slice in small {
            let len = slice.len() as u64;
            LongArraySort::quick_sort(slice, 0, len);
        }
        if !large.is_empty() {
            debug!(spans = large.len(), "preindex.documents.parallel_sort");
            ctx.pool().install(|| {
                large.into_par_iter().try_for_each(|slice| {
                    let len = slice.len() as u64;
                    LongArraySort::sort_large_span(slice, sorting, 0, len)
                })
            })?;
        }
        straddling
    };
    for (start, end) in straddling {
        documents.sort_large_span(sorting, start, end)?;
    }
    Ok(())
}
